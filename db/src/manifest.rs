//! Record of the modules a library has loaded.
//!
//! Written next to the persisted caches as `modules.json` so that tooling
//! can tell which modules a cache directory covers and how each one was
//! obtained.

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{CacheOutcome, ModuleFingerprint};

/// File name of the manifest inside a cache directory.
pub const MANIFEST_FILE: &str = "modules.json";

/// What is known about one loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Absent when the module could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<ModuleFingerprint>,
    pub outcome: CacheOutcome,
    /// RFC 3339 timestamp of the load.
    pub loaded_at: String,
    /// Whether definitions were tagged with their namespace.
    pub namespace_prefix: bool,
    pub definitions: usize,
    pub schemas: usize,
    pub variants: usize,
}

/// Loaded modules keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub tool_version: String,
    pub updated_at: String,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleEntry>,
    /// Module keys in the order they were merged.
    #[serde(default)]
    pub load_order: Vec<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            updated_at: chrono::Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }

    /// Loads a manifest from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Saves the manifest as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Records `entry` for `module`, replacing an earlier one.
    pub fn update_entry(&mut self, module: String, entry: ModuleEntry) {
        if !self.modules.contains_key(&module) {
            self.load_order.push(module.clone());
        }
        self.modules.insert(module, entry);
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn get(&self, module: &str) -> Option<&ModuleEntry> {
        self.modules.get(module)
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules whose recorded checksum differs from `current`, plus modules
    /// `current` no longer has.
    pub fn changed_since(&self, current: &Manifest) -> Vec<String> {
        self.load_order
            .iter()
            .filter(|key| {
                let before = self.modules.get(*key).and_then(|e| e.fingerprint.as_ref());
                let after = current.modules.get(*key).and_then(|e| e.fingerprint.as_ref());
                match (before, after) {
                    (Some(b), Some(a)) => b.sha256 != a.sha256,
                    (None, None) => false,
                    _ => true,
                }
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn entry(sha: &str) -> ModuleEntry {
        ModuleEntry {
            fingerprint: Some(ModuleFingerprint {
                path: PathBuf::from("/mods/Core.json"),
                size_bytes: 10,
                mtime_secs: 1_700_000_000,
                sha256: sha.into(),
            }),
            outcome: CacheOutcome::Extracted,
            loaded_at: "2024-01-15T10:30:00+00:00".into(),
            namespace_prefix: false,
            definitions: 3,
            schemas: 1,
            variants: 0,
        }
    }

    #[test]
    fn test_update_entry_keeps_first_load_position() {
        let mut manifest = Manifest::new();
        manifest.update_entry("b".into(), entry("1"));
        manifest.update_entry("a".into(), entry("1"));
        manifest.update_entry("b".into(), entry("2"));

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.load_order, vec!["b", "a"]);
        assert_eq!(
            manifest.get("b").unwrap().fingerprint.as_ref().unwrap().sha256,
            "2"
        );
    }

    #[test]
    fn test_changed_since_reports_checksum_changes_and_removals() {
        let mut old = Manifest::new();
        old.update_entry("core".into(), entry("1"));
        old.update_entry("addon".into(), entry("1"));
        old.update_entry("gone".into(), entry("1"));

        let mut new = Manifest::new();
        new.update_entry("core".into(), entry("1"));
        new.update_entry("addon".into(), entry("2"));

        assert_eq!(old.changed_since(&new), vec!["addon", "gone"]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let mut manifest = Manifest::new();
        manifest.update_entry("core".into(), entry("abc"));
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.contains("core"));
    }
}
