//! Schema extraction from compiled module type manifests.
//!
//! This crate turns the type information of one module into a
//! [`SchemaCache`]:
//!
//! - [`ModuleScanner`] loads the module's type manifest and indexes subtypes.
//! - [`IntrospectionCache`] memoizes each type's own instance members.
//! - [`SchemaRegistry`] / [`VariantRegistry`] hand out arena handles and
//!   break reference cycles by pre-registering placeholders.
//! - [`ExtractionSession`] runs discovery, classification, flattening and
//!   the catalog and cast-table derivations.
//!
//! # Example
//!
//! ```
//! use defschema_extract::*;
//!
//! let manifest = ModuleManifest::new("Mini")
//!     .with_type(TypeInfo::class("Verse.Def").field("defName", "System.String"))
//!     .with_type(TypeInfo::class("Mod.Comp").abstract_type())
//!     .with_type(TypeInfo::class("Mod.CompA").with_base("Mod.Comp").field("value", "System.Int32"))
//!     .with_type(TypeInfo::class("Mod.CompB").with_base("Mod.Comp"))
//!     .with_type(
//!         TypeInfo::class("Mod.Item")
//!             .with_base("Verse.Def")
//!             .field("comps", TypeRef::list_of("Mod.Comp")),
//!     );
//! let scanner = ModuleScanner::from_manifest("mini.json", manifest);
//!
//! let cache = ExtractionSession::new(&scanner, ExtractionConfig::default())
//!     .extract()
//!     .unwrap();
//! assert_eq!(cache.variants.len(), 2);
//! let comps = cache.definition("Item").unwrap().field("comps").unwrap();
//! assert_eq!(comps.variant_ids.as_ref().map(Vec::len), Some(2));
//! ```
//!
//! [`SchemaCache`]: defschema_core::SchemaCache

pub mod arena;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod introspect;
pub mod output;
pub mod scanner;
pub mod session;

use std::path::Path;

use defschema_core::SchemaCache;

pub use arena::{RegistryHost, SchemaRegistry, VariantRegistry};
pub use config::ExtractionConfig;
pub use descriptor::LiveDescriptor;
pub use error::{ExtractError, Result, TypeIntrospectionError};
pub use introspect::{IntrospectionCache, TypeRecord};
pub use output::{OutputFormat, definitions_outline, format_definitions};
pub use scanner::{
    MemberInfo, MemberKind, ModuleManifest, ModuleScanner, TypeInfo, TypeKind, TypeRef,
};
pub use session::ExtractionSession;

/// Loads the module at `path` and runs one extraction pass over it.
///
/// # Errors
///
/// Returns [`ExtractError::ModuleLoad`] if the manifest cannot be loaded,
/// or an introspection error that aborted the pass.
pub fn extract_module(path: impl AsRef<Path>, config: &ExtractionConfig) -> Result<SchemaCache> {
    config.validate()?;
    let scanner = ModuleScanner::load(path)?;
    ExtractionSession::new(&scanner, config.clone()).extract()
}
