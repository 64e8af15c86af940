//! Extraction configuration.
//!
//! Marker type names and naming conventions the extractor relies on. The
//! defaults describe the RimWorld module layout; every field can be
//! overridden from YAML.
//!
//! # Example YAML
//!
//! ```yaml
//! definition_base: Verse.Def
//! definition_registry_marker: RimWorld.DefOf
//! banned_namespaces:
//!   - System
//!   - UnityEngine
//! properties_prefix: CompProperties
//! component_suffix: Comp
//! keep_namespace_prefix: false
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// Settings controlling how a module is turned into a schema cache.
///
/// Missing YAML keys fall back to [`ExtractionConfig::default`].
///
/// # Examples
///
/// ```
/// # use defschema_extract::ExtractionConfig;
/// let config = ExtractionConfig::default();
/// assert!(config.is_banned("System.Collections.Generic.List"));
/// assert!(config.is_scalar_name("UnityEngine.Vector3"));
/// assert!(!config.is_scalar_name("Verse.GraphicData"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base type of every definition.
    pub definition_base: String,
    /// Attribute or base type marking registries of named definition
    /// instances.
    pub definition_registry_marker: String,
    pub localization_handle_marker: String,
    pub must_localize_marker: String,
    /// Root of every class hierarchy.
    pub universal_root: String,
    /// Full-name prefixes excluded from the type graph.
    pub banned_namespaces: Vec<String>,
    /// Full names of closed scalar types.
    pub scalar_types: Vec<String>,
    /// Short names treated as scalars regardless of namespace.
    pub scalar_short_names: Vec<String>,
    /// Short-name prefix of component property types (discovery seeds).
    pub properties_prefix: String,
    /// Short-name suffix of component family base types.
    pub component_suffix: String,
    /// Use full names as definition tag names.
    pub keep_namespace_prefix: bool,
    /// Also emit definition records for abstract definition types.
    pub include_abstract_definitions: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let strings = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            definition_base: "Verse.Def".into(),
            definition_registry_marker: "RimWorld.DefOf".into(),
            localization_handle_marker: "Verse.TranslationHandleAttribute".into(),
            must_localize_marker: "Verse.MustTranslateAttribute".into(),
            universal_root: "System.Object".into(),
            banned_namespaces: strings(&["System", "UnityEngine"]),
            scalar_types: strings(&[
                "System.Boolean",
                "System.Byte",
                "System.SByte",
                "System.Char",
                "System.Int16",
                "System.UInt16",
                "System.Int32",
                "System.UInt32",
                "System.Int64",
                "System.UInt64",
                "System.Single",
                "System.Double",
                "System.String",
                "System.Decimal",
                "System.DateTime",
                "UnityEngine.Vector2",
                "UnityEngine.Vector3",
                "UnityEngine.Color",
            ]),
            scalar_short_names: strings(&["IntRange", "FloatRange"]),
            properties_prefix: "CompProperties".into(),
            component_suffix: "Comp".into(),
            keep_namespace_prefix: false,
            include_abstract_definitions: false,
        }
    }
}

impl ExtractionConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ExtractError::IoError) if the file cannot be read,
    /// [`YamlError`](ExtractError::YamlError) if parsing fails, or
    /// [`Config`](ExtractError::Config) if a required name is empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_yaml::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_yaml::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Rejects configurations the extractor cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.definition_base.trim().is_empty() {
            return Err(ExtractError::Config("definition_base is empty".into()));
        }
        if self.universal_root.trim().is_empty() {
            return Err(ExtractError::Config("universal_root is empty".into()));
        }
        Ok(())
    }

    /// Returns a copy with `keep_namespace_prefix` set.
    pub fn with_namespace_prefix(&self, keep: bool) -> Self {
        Self {
            keep_namespace_prefix: keep,
            ..self.clone()
        }
    }

    /// `true` when `full_name` starts with a banned namespace prefix.
    pub fn is_banned(&self, full_name: &str) -> bool {
        self.banned_namespaces
            .iter()
            .any(|prefix| full_name.starts_with(prefix.as_str()))
    }

    /// `true` when `full_name` names a closed scalar type.
    pub fn is_scalar_name(&self, full_name: &str) -> bool {
        if self.scalar_types.iter().any(|t| t == full_name) {
            return true;
        }
        let short = full_name.rsplit('.').next().unwrap_or(full_name);
        self.scalar_short_names.iter().any(|s| s == short)
    }
}
