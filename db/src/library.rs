//! A base module plus add-ons, merged into one schema cache.
//!
//! The base module is extracted with bare tag names; add-ons keep their
//! namespace prefix so that definitions from different modules stay apart.
//! Add-ons are merged with [`MergeStrategy::Append`] in the order they are
//! added, and a module that is already part of the library is skipped.
//!
//! # Examples
//!
//! ```no_run
//! use defschema_db::{CacheStore, SchemaLibrary};
//! use defschema_extract::ExtractionConfig;
//!
//! let store = CacheStore::new(".cache/defschema");
//! let mut library = SchemaLibrary::open("modules/Core.json", store, ExtractionConfig::default());
//! library.add_module("mods/Addon.json");
//!
//! let query = library.query();
//! for tag in query.root_tags() {
//!     println!("{tag}");
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use defschema_core::{MergeReport, MergeStrategy, NodeQuery, SchemaCache};
use defschema_extract::ExtractionConfig;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::LibraryConfig;
use crate::error::Result;
use crate::manifest::{MANIFEST_FILE, Manifest, ModuleEntry};
use crate::store::{CacheOutcome, CacheStore, ModuleFingerprint};

/// Merged schema cache of several modules.
#[derive(Debug)]
pub struct SchemaLibrary {
    store: CacheStore,
    config: ExtractionConfig,
    force: bool,
    cache: SchemaCache,
    loaded: HashSet<String>,
    manifest: Manifest,
}

fn module_key(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

impl SchemaLibrary {
    /// Creates an empty library.
    pub fn new(store: CacheStore, config: ExtractionConfig) -> Self {
        Self {
            store,
            config,
            force: false,
            cache: SchemaCache::default(),
            loaded: HashSet::new(),
            manifest: Manifest::new(),
        }
    }

    /// Ignore persisted caches and extract every module afresh.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Creates a library holding the base module.
    pub fn open(base: impl AsRef<Path>, store: CacheStore, config: ExtractionConfig) -> Self {
        let mut library = Self::new(store, config);
        library.load_base(base);
        library
    }

    /// Builds the library a [`LibraryConfig`] describes, extracting the
    /// add-ons in parallel.
    pub fn from_config(config: &LibraryConfig, force: bool) -> Self {
        let store = CacheStore::new(&config.cache_dir);
        let mut library = Self::new(store, config.extraction.clone()).with_force(force);
        library.load_base(&config.base_module);

        if config.jobs > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(config.jobs)
                .build()
            {
                Ok(pool) => {
                    pool.install(|| library.extract_addons_parallel(&config.addons));
                    return library;
                }
                Err(err) => warn!(error = %err, "cannot build worker pool, using the global one"),
            }
        }
        library.extract_addons_parallel(&config.addons);
        library
    }

    /// Loads the base module with bare tag names.
    ///
    /// Returns `None` when the module is already part of the library.
    pub fn load_base(&mut self, path: impl AsRef<Path>) -> Option<MergeReport> {
        let config = self.config.with_namespace_prefix(false);
        self.load_one(path.as_ref(), &config)
    }

    /// Loads an add-on module with namespace-prefixed tag names and appends
    /// it to the library.
    ///
    /// Returns `None` when the module is already part of the library.
    pub fn add_module(&mut self, path: impl AsRef<Path>) -> Option<MergeReport> {
        let config = self.config.with_namespace_prefix(true);
        self.load_one(path.as_ref(), &config)
    }

    fn load_one(&mut self, path: &Path, config: &ExtractionConfig) -> Option<MergeReport> {
        let key = module_key(path);
        if self.loaded.contains(&key) {
            debug!(module = %path.display(), "module already loaded");
            return None;
        }
        let (cache, outcome) = self.store.load_or_extract(path, config, self.force);
        Some(self.absorb(key, path, cache, outcome, config.keep_namespace_prefix))
    }

    /// Extracts several add-ons concurrently, then merges them one by one in
    /// the given order.
    ///
    /// Modules already in the library and repeated paths are skipped.
    pub fn extract_addons_parallel(&mut self, paths: &[PathBuf]) -> Vec<MergeReport> {
        let mut seen = HashSet::new();
        let pending: Vec<(String, &PathBuf)> = paths
            .iter()
            .map(|p| (module_key(p), p))
            .filter(|(key, _)| !self.loaded.contains(key) && seen.insert(key.clone()))
            .collect();
        if pending.is_empty() {
            return Vec::new();
        }

        let config = self.config.with_namespace_prefix(true);
        let store = &self.store;
        let force = self.force;
        let extracted: Vec<(SchemaCache, CacheOutcome)> = pending
            .par_iter()
            .map(|(_, path)| store.load_or_extract(path, &config, force))
            .collect();

        pending
            .into_iter()
            .zip(extracted)
            .map(|((key, path), (cache, outcome))| self.absorb(key, path, cache, outcome, true))
            .collect()
    }

    fn absorb(
        &mut self,
        key: String,
        path: &Path,
        cache: SchemaCache,
        outcome: CacheOutcome,
        namespace_prefix: bool,
    ) -> MergeReport {
        let entry = ModuleEntry {
            fingerprint: ModuleFingerprint::of(path).ok(),
            outcome,
            loaded_at: chrono::Utc::now().to_rfc3339(),
            namespace_prefix,
            definitions: cache.definitions.len(),
            schemas: cache.schemas.len(),
            variants: cache.variants.len(),
        };

        let report = self.cache.merge_with(&cache, MergeStrategy::Append);

        info!(
            module = %path.display(),
            ?outcome,
            definitions = report.definitions_added,
            schemas = report.schemas_added,
            variants = report.variants_added,
            "module merged into library"
        );

        // A degraded module may become loadable later.
        if outcome != CacheOutcome::Degraded {
            self.loaded.insert(key.clone());
        }
        self.manifest.update_entry(key, entry);
        report
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn into_cache(self) -> SchemaCache {
        self.cache
    }

    pub fn query(&self) -> NodeQuery<'_> {
        NodeQuery::new(&self.cache)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// `true` when `path` has been loaded successfully.
    pub fn contains_module(&self, path: impl AsRef<Path>) -> bool {
        self.loaded.contains(&module_key(path.as_ref()))
    }

    /// Writes the manifest of loaded modules into the cache directory.
    pub fn save_manifest(&self) -> Result<PathBuf> {
        let path = self.store.dir().join(MANIFEST_FILE);
        self.manifest.save(&path)?;
        Ok(path)
    }
}
