//! Library configuration.
//!
//! Names the base module, the add-ons layered on top of it, where persisted
//! caches live, and the extraction settings shared by every module.
//!
//! # Example YAML
//!
//! ```yaml
//! base_module: modules/Assembly-CSharp.json
//! addons:
//!   - mods/HugsLib/types.json
//!   - mods/CombatExtended/types.yaml
//! cache_dir: .cache/defschema
//! jobs: 4
//! extraction:
//!   definition_base: Verse.Def
//!   banned_namespaces: [System, UnityEngine]
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use defschema_extract::ExtractionConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache/defschema")
}

/// Top-level configuration for a [`SchemaLibrary`](crate::SchemaLibrary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Module whose definitions form the base vocabulary.
    pub base_module: PathBuf,
    /// Add-on modules, merged in this order after the base.
    #[serde(default)]
    pub addons: Vec<PathBuf>,
    /// Directory holding one persisted cache per module.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Worker threads for add-on extraction; `0` lets rayon decide.
    #[serde(default)]
    pub jobs: usize,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl LibraryConfig {
    /// Creates a configuration for `base_module` with default settings.
    pub fn new(base_module: impl Into<PathBuf>) -> Self {
        Self {
            base_module: base_module.into(),
            addons: Vec::new(),
            cache_dir: default_cache_dir(),
            jobs: 0,
            extraction: ExtractionConfig::default(),
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// Relative module and cache paths are resolved against the directory
    /// containing the file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails, or [`Extract`](crate::DatabaseError::Extract) if the
    /// extraction settings are unusable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let mut config: Self = serde_yaml::from_reader(BufReader::new(file))?;
        config.extraction.validate()?;
        if let Some(dir) = path.parent() {
            config.resolve_relative_to(dir);
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_yaml::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    fn resolve_relative_to(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        resolve(&mut self.base_module);
        resolve(&mut self.cache_dir);
        self.addons.iter_mut().for_each(resolve);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let config: LibraryConfig = serde_yaml::from_str("base_module: core.json\n").unwrap();
        assert_eq!(config.base_module, PathBuf::from("core.json"));
        assert!(config.addons.is_empty());
        assert_eq!(config.cache_dir, PathBuf::from(".cache/defschema"));
        assert_eq!(config.jobs, 0);
        assert_eq!(config.extraction, ExtractionConfig::default());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.yml");
        std::fs::write(
            &path,
            "base_module: core.json\naddons: [a.json, /abs/b.json]\ncache_dir: cache\nextraction:\n  definition_base: Game.Def\n",
        )
        .unwrap();

        let config = LibraryConfig::load(&path).unwrap();
        assert_eq!(config.base_module, dir.path().join("core.json"));
        assert_eq!(config.addons[0], dir.path().join("a.json"));
        assert_eq!(config.addons[1], PathBuf::from("/abs/b.json"));
        assert_eq!(config.cache_dir, dir.path().join("cache"));
        assert_eq!(config.extraction.definition_base, "Game.Def");
    }

    #[test]
    fn test_load_rejects_empty_definition_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.yml");
        std::fs::write(
            &path,
            "base_module: core.json\nextraction:\n  definition_base: \"\"\n",
        )
        .unwrap();
        assert!(matches!(
            LibraryConfig::load(&path),
            Err(crate::DatabaseError::Extract(_))
        ));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.yml");
        let mut config = LibraryConfig::new(dir.path().join("core.json"));
        config.addons.push(dir.path().join("addon.json"));
        config.cache_dir = dir.path().join("cache");
        config.jobs = 2;
        config.save(&path).unwrap();

        assert_eq!(LibraryConfig::load(&path).unwrap(), config);
    }
}
