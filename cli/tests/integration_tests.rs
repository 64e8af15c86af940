use std::fs;
use std::path::PathBuf;
use std::process::Output;

/// Helper to create a temp directory that is cleaned up on drop.
struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "defschema_cli_test_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        Self { path }
    }

    fn path(&self) -> &PathBuf {
        &self.path
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn defschema(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_defschema"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run defschema")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn path_str(path: &PathBuf) -> &str {
    path.to_str().expect("temp path is not UTF-8")
}

/// Base module: a definition hierarchy with one nested type.
fn write_core_module(dir: &TempDir) -> PathBuf {
    let json = serde_json::json!({
        "module": "Core",
        "types": [
            { "full_name": "Verse.Def",
              "members": [ { "name": "defName", "type": "System.String" } ] },
            { "full_name": "Verse.GraphicData",
              "members": [ { "name": "texPath", "type": "System.String" } ] },
            { "full_name": "Verse.ThingDef", "base": "Verse.Def",
              "members": [
                  { "name": "graphicData", "type": "Verse.GraphicData" },
                  { "name": "tags", "type": { "list": "System.String" } }
              ] }
        ]
    });
    let path = dir.join("Core.json");
    fs::write(&path, serde_json::to_string_pretty(&json).unwrap())
        .expect("failed to write module");
    path
}

/// Add-on module importing the base definition type.
fn write_addon_module(dir: &TempDir) -> PathBuf {
    let json = serde_json::json!({
        "module": "Spells",
        "imports": [
            { "full_name": "Verse.Def",
              "members": [ { "name": "defName", "type": "System.String" } ] }
        ],
        "types": [
            { "full_name": "Magic.SpellDef", "base": "Verse.Def",
              "members": [ { "name": "power", "type": "System.Single" } ] }
        ]
    });
    let path = dir.join("Spells.json");
    fs::write(&path, serde_json::to_string_pretty(&json).unwrap())
        .expect("failed to write module");
    path
}

/// Runs `extract` for the base module only and returns the output path.
fn extract_core(dir: &TempDir) -> PathBuf {
    let core = write_core_module(dir);
    let out = dir.join("core-cache.json");
    let cache_dir = dir.join("cache");
    let output = defschema(&[
        "extract",
        "--module",
        path_str(&core),
        "--cache-dir",
        path_str(&cache_dir),
        "--output",
        path_str(&out),
    ]);
    assert!(output.status.success(), "extract failed: {}", stderr(&output));
    out
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

#[test]
fn extract_writes_merged_cache_and_manifest() {
    let dir = TempDir::new("extract_merged");
    let core = write_core_module(&dir);
    let addon = write_addon_module(&dir);
    let cache_dir = dir.join("cache");
    let out = dir.join("library.json.gz");

    let output = defschema(&[
        "extract",
        "--module",
        path_str(&core),
        "--addon",
        path_str(&addon),
        "--cache-dir",
        path_str(&cache_dir),
        "--output",
        path_str(&out),
    ]);
    assert!(output.status.success(), "extract failed: {}", stderr(&output));
    assert!(stdout(&output).contains("from 2 module(s)"));
    assert!(out.exists());
    assert!(cache_dir.join("modules.json").exists());
    assert!(cache_dir.join("CoreCache.json.gz").exists());
    assert!(cache_dir.join("SpellsCache.json.gz").exists());

    let query = defschema(&["query", "--cache", path_str(&out)]);
    assert!(query.status.success());
    let tags = stdout(&query);
    assert!(tags.lines().any(|l| l == "ThingDef"));
    assert!(tags.lines().any(|l| l == "Magic.SpellDef"));
}

#[test]
fn extract_reads_library_config() {
    let dir = TempDir::new("extract_config");
    write_core_module(&dir);
    write_addon_module(&dir);
    let config = dir.join("library.yml");
    fs::write(
        &config,
        "base_module: Core.json\naddons: [Spells.json]\ncache_dir: cache\njobs: 2\n",
    )
    .unwrap();
    let out = dir.join("out.json");

    let output = defschema(&[
        "extract",
        "--config",
        path_str(&config),
        "--output",
        path_str(&out),
    ]);
    assert!(output.status.success(), "extract failed: {}", stderr(&output));
    assert!(dir.path().join("cache").join("modules.json").exists());
}

#[test]
fn extract_fails_for_missing_base_module() {
    let dir = TempDir::new("extract_missing");
    let output = defschema(&[
        "extract",
        "--module",
        path_str(&dir.join("Nope.json")),
        "--cache-dir",
        path_str(&dir.join("cache")),
        "--output",
        path_str(&dir.join("out.json")),
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load base module"));
}

#[test]
fn extract_requires_a_module_source() {
    let dir = TempDir::new("extract_no_source");
    let output = defschema(&["extract", "--output", path_str(&dir.join("out.json"))]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--module or --config"));
}

// ---------------------------------------------------------------------------
// outline / query / inspect
// ---------------------------------------------------------------------------

#[test]
fn outline_prints_definitions_table() {
    let dir = TempDir::new("outline");
    let out = extract_core(&dir);

    let output = defschema(&["outline", "--cache", path_str(&out)]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("ThingDef : Def\n"));
    assert!(text.contains("  -- graphicData : Verse.GraphicData\n"));

    let markdown = defschema(&["outline", "--cache", path_str(&out), "--format", "markdown"]);
    assert!(stdout(&markdown).contains("## ThingDef"));
}

#[test]
fn query_lists_children_at_path() {
    let dir = TempDir::new("query");
    let out = extract_core(&dir);

    let output = defschema(&["query", "--cache", path_str(&out), "ThingDef"]);
    assert!(output.status.success());
    let names = stdout(&output);
    assert!(names.lines().any(|l| l == "defName"));
    assert!(names.lines().any(|l| l == "graphicData"));

    let nested = defschema(&["query", "--cache", path_str(&out), "ThingDef/graphicData"]);
    assert_eq!(stdout(&nested).trim(), "texPath");
}

#[test]
fn inspect_from_module_and_cache_agree() {
    let dir = TempDir::new("inspect");
    let core = write_core_module(&dir);
    let out = extract_core(&dir);

    let live = defschema(&["inspect", "--module", path_str(&core), "Verse.ThingDef"]);
    assert!(live.status.success(), "inspect failed: {}", stderr(&live));
    let text = stdout(&live);
    assert!(text.starts_with("Verse.ThingDef\n"));
    assert!(text.contains("  -- graphicData : Verse.GraphicData\n"));
    assert!(text.contains("    -- texPath : System.String\n"));

    let cached = defschema(&["inspect", "--cache", path_str(&out), "Verse.ThingDef"]);
    assert!(cached.status.success());
    assert_eq!(stdout(&cached), text);

    let unknown = defschema(&["inspect", "--cache", path_str(&out), "Verse.Missing"]);
    assert!(!unknown.status.success());
}

// ---------------------------------------------------------------------------
// merge / validate
// ---------------------------------------------------------------------------

#[test]
fn merge_appends_or_overwrites() {
    let dir = TempDir::new("merge");
    let out = extract_core(&dir);
    let single = defschema(&["outline", "--cache", path_str(&out)]);
    let defs = stdout(&single).lines().filter(|l| !l.starts_with(' ')).count();

    let appended = dir.join("appended.json");
    let output = defschema(&[
        "merge",
        path_str(&out),
        path_str(&out),
        "--output",
        path_str(&appended),
    ]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("({} definition(s))", defs * 2)));

    let overwritten = dir.join("overwritten.json");
    let output = defschema(&[
        "merge",
        "--overwrite",
        path_str(&out),
        path_str(&out),
        "--output",
        path_str(&overwritten),
    ]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("({defs} definition(s))")));

    let valid = defschema(&["validate", path_str(&appended), path_str(&overwritten)]);
    assert!(valid.status.success(), "validate failed: {}", stderr(&valid));
}

#[test]
fn validate_reports_dangling_handles() {
    let dir = TempDir::new("validate");
    let broken = dir.join("broken.json");
    let json = serde_json::json!({
        "definitions": [{
            "tag_name": "ThingDef",
            "name": "ThingDef",
            "parent_name": "Def",
            "full_name": "Verse.ThingDef",
            "fields": [{
                "name": "graphicData",
                "declared_type_name": "Verse.GraphicData",
                "kind": "nested_simple",
                "schema_id": 5
            }]
        }]
    });
    fs::write(&broken, json.to_string()).unwrap();

    let output = defschema(&["validate", path_str(&broken)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("dangling schema handle 5"));
}

#[test]
fn unreadable_cache_is_an_error() {
    let dir = TempDir::new("unreadable");
    let garbage = dir.join("garbage.json");
    fs::write(&garbage, "not json").unwrap();

    let output = defschema(&["outline", "--cache", path_str(&garbage)]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to read cache"));
}
