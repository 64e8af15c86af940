use std::path::{Path, PathBuf};

use defschema_core::{FieldKind, validate_cache};
use defschema_db::{
    CacheOutcome, CacheStore, LibraryConfig, MANIFEST_FILE, Manifest, SchemaLibrary, read_cache,
    write_cache,
};
use defschema_extract::{ExtractionConfig, ModuleManifest, TypeInfo};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn def_base() -> TypeInfo {
    TypeInfo::class("Verse.Def").field("defName", "System.String")
}

fn graphic_data() -> TypeInfo {
    TypeInfo::class("Verse.GraphicData").field("texPath", "System.String")
}

fn write_core(dir: &Path) -> PathBuf {
    let path = dir.join("Core.json");
    ModuleManifest::new("Core")
        .with_type(def_base())
        .with_type(graphic_data())
        .with_type(
            TypeInfo::class("Verse.ThingDef")
                .with_base("Verse.Def")
                .field("graphicData", "Verse.GraphicData")
                .field("stackLimit", "System.Int32"),
        )
        .save(&path)
        .unwrap();
    path
}

fn write_spell_addon(dir: &Path) -> PathBuf {
    let path = dir.join("Spells.json");
    ModuleManifest::new("Spells")
        .with_import(def_base())
        .with_import(graphic_data())
        .with_type(
            TypeInfo::class("Magic.SpellDef")
                .with_base("Verse.Def")
                .field("power", "System.Single")
                .field("graphic", "Verse.GraphicData"),
        )
        .save(&path)
        .unwrap();
    path
}

fn write_rune_addon(dir: &Path) -> PathBuf {
    let path = dir.join("Runes.json");
    ModuleManifest::new("Runes")
        .with_import(def_base())
        .with_type(
            TypeInfo::class("Runes.RuneDef")
                .with_base("Verse.Def")
                .field("level", "System.Int32"),
        )
        .save(&path)
        .unwrap();
    path
}

fn tags(library: &SchemaLibrary) -> Vec<String> {
    library
        .query()
        .root_tags()
        .into_iter()
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Library assembly
// ---------------------------------------------------------------------------

#[test]
fn test_base_and_addon_merge() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_core(dir.path());
    let addon = write_spell_addon(dir.path());
    let store = CacheStore::new(dir.path().join("cache"));

    let mut library = SchemaLibrary::open(&core, store, ExtractionConfig::default());
    let report = library.add_module(&addon).unwrap();

    let tags = tags(&library);
    assert!(tags.contains(&"ThingDef".to_string()));
    assert!(tags.contains(&"Magic.SpellDef".to_string()));
    assert_eq!(report.definitions_added, 1);
    assert!(report.schemas_deduplicated >= 1);

    let cache = library.cache();
    let graphic_schemas = cache
        .schemas
        .iter()
        .filter(|s| s.full_name == "Verse.GraphicData")
        .count();
    assert_eq!(graphic_schemas, 1);

    let spell = cache.definition("Magic.SpellDef").unwrap();
    let graphic = spell.field("graphic").unwrap();
    assert_eq!(graphic.kind, FieldKind::NestedSimple);
    assert_eq!(
        cache.schema(graphic.schema_id).unwrap().full_name,
        "Verse.GraphicData"
    );
    assert!(validate_cache(cache).is_empty());
}

#[test]
fn test_adding_a_module_twice_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_core(dir.path());
    let addon = write_spell_addon(dir.path());
    let store = CacheStore::new(dir.path().join("cache"));

    let mut library = SchemaLibrary::open(&core, store, ExtractionConfig::default());
    assert!(library.add_module(&addon).is_some());
    let definitions = library.cache().definitions.len();

    assert!(library.add_module(&addon).is_none());
    assert!(library.load_base(&core).is_none());
    assert_eq!(library.cache().definitions.len(), definitions);
    assert!(library.contains_module(&addon));
}

#[test]
fn test_second_open_hits_persisted_caches() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_core(dir.path());
    let addon = write_spell_addon(dir.path());
    let cache_dir = dir.path().join("cache");

    let mut first = SchemaLibrary::open(
        &core,
        CacheStore::new(&cache_dir),
        ExtractionConfig::default(),
    );
    first.add_module(&addon);
    assert!(
        first
            .manifest()
            .modules
            .values()
            .all(|e| e.outcome == CacheOutcome::Extracted)
    );
    assert!(cache_dir.join("CoreCache.json.gz").exists());
    assert!(cache_dir.join("SpellsCache.json.gz").exists());

    let mut second = SchemaLibrary::open(
        &core,
        CacheStore::new(&cache_dir),
        ExtractionConfig::default(),
    );
    second.add_module(&addon);
    assert!(
        second
            .manifest()
            .modules
            .values()
            .all(|e| e.outcome == CacheOutcome::Hit)
    );
    assert_eq!(second.cache(), first.cache());

    let mut forced = SchemaLibrary::new(CacheStore::new(&cache_dir), ExtractionConfig::default())
        .with_force(true);
    forced.load_base(&core);
    assert!(
        forced
            .manifest()
            .modules
            .values()
            .all(|e| e.outcome == CacheOutcome::Extracted)
    );
}

#[test]
fn test_changed_module_is_extracted_again() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_core(dir.path());
    let cache_dir = dir.path().join("cache");

    SchemaLibrary::open(
        &core,
        CacheStore::new(&cache_dir),
        ExtractionConfig::default(),
    );

    ModuleManifest::new("Core")
        .with_type(def_base())
        .with_type(TypeInfo::class("Verse.SoundDef").with_base("Verse.Def"))
        .save(&core)
        .unwrap();

    let library = SchemaLibrary::open(
        &core,
        CacheStore::new(&cache_dir),
        ExtractionConfig::default(),
    );
    let entry = library.manifest().modules.values().next().unwrap();
    assert_eq!(entry.outcome, CacheOutcome::Extracted);
    assert!(library.cache().definition("SoundDef").is_some());
    assert!(library.cache().definition("ThingDef").is_none());
}

#[test]
fn test_unloadable_addon_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_core(dir.path());
    let missing = dir.path().join("Missing.json");
    let store = CacheStore::new(dir.path().join("cache"));

    let mut library = SchemaLibrary::open(&core, store, ExtractionConfig::default());
    let before = library.cache().clone();
    let report = library.add_module(&missing).unwrap();

    assert_eq!(report.definitions_added, 0);
    assert_eq!(library.cache(), &before);
    assert!(!library.contains_module(&missing));
    assert_eq!(library.manifest().len(), 2);
}

#[test]
fn test_addons_without_base_keep_catalog_and_casts() {
    let dir = tempfile::tempdir().unwrap();
    let stat_def = TypeInfo::class("Verse.StatDef").with_base("Verse.Def");
    let stats = dir.path().join("Stats.json");
    ModuleManifest::new("Stats")
        .with_import(def_base())
        .with_import(stat_def)
        .with_type(
            TypeInfo::class("Stats.SpeedDefOf")
                .with_attribute("RimWorld.DefOf")
                .static_field("Speed", "Verse.StatDef"),
        )
        .with_type(TypeInfo::class("Stats.Wrap").field("stat", "Verse.StatDef"))
        .save(&stats)
        .unwrap();
    let runes = write_rune_addon(dir.path());
    let store = CacheStore::new(dir.path().join("cache"));

    let mut library = SchemaLibrary::open(
        dir.path().join("Missing.json"),
        store,
        ExtractionConfig::default(),
    );
    assert!(library.cache().is_empty());
    library.add_module(&stats).unwrap();
    library.add_module(&runes).unwrap();

    let cache = library.cache();
    assert!(cache.definition("Runes.RuneDef").is_some());
    assert_eq!(cache.enumerated_value_catalog["Verse.StatDef"], vec!["Speed"]);
    assert_eq!(cache.cast_target("Stats.Wrap"), "Verse.StatDef");
}

#[test]
fn test_from_config_extracts_addons_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_core(dir.path());
    let spells = write_spell_addon(dir.path());
    let runes = write_rune_addon(dir.path());

    let mut config = LibraryConfig::new(&core);
    config.addons = vec![spells.clone(), runes.clone(), spells.clone()];
    config.cache_dir = dir.path().join("cache");
    config.jobs = 2;

    let library = SchemaLibrary::from_config(&config, false);
    let tags = tags(&library);
    assert!(tags.contains(&"ThingDef".to_string()));
    assert!(tags.contains(&"Magic.SpellDef".to_string()));
    assert!(tags.contains(&"Runes.RuneDef".to_string()));

    let spell_defs = library
        .cache()
        .definitions
        .iter()
        .filter(|d| d.tag_name == "Magic.SpellDef")
        .count();
    assert_eq!(spell_defs, 1);

    let manifest = library.manifest();
    assert_eq!(manifest.len(), 3);
    assert!(manifest.load_order[1].ends_with("Spells.json"));
    assert!(manifest.load_order[2].ends_with("Runes.json"));
}

// ---------------------------------------------------------------------------
// Manifest and cache files
// ---------------------------------------------------------------------------

#[test]
fn test_save_manifest_and_export_cache() {
    let dir = tempfile::tempdir().unwrap();
    let core = write_core(dir.path());
    let cache_dir = dir.path().join("cache");

    let library = SchemaLibrary::open(
        &core,
        CacheStore::new(&cache_dir),
        ExtractionConfig::default(),
    );
    let path = library.save_manifest().unwrap();
    assert_eq!(path, cache_dir.join(MANIFEST_FILE));

    let manifest = Manifest::load(&path).unwrap();
    assert_eq!(&manifest, library.manifest());
    assert!(manifest.changed_since(library.manifest()).is_empty());

    let export = dir.path().join("merged.json");
    write_cache(&export, library.cache()).unwrap();
    assert_eq!(&read_cache(&export).unwrap(), library.cache());

    let persisted = read_cache(cache_dir.join("CoreCache.json.gz")).unwrap();
    assert_eq!(&persisted, library.cache());
}
