//! Schema graph model, merge engine and read-only queries.
//!
//! This crate defines the data model produced by schema extraction and
//! consumed by editors:
//!
//! - [`SchemaCache`]: the aggregate root. Holds the definition records, the
//!   enumerated value catalog, the cast table and two append-only arenas.
//! - [`StructuralSchema`]: the fields of one nested type, addressed by
//!   integer handle.
//! - [`VariantRecord`]: one concrete member of a polymorphic family,
//!   addressed by integer handle.
//! - [`DefinitionRecord`]: one definition type with its flattened fields.
//! - [`FieldDescriptor`]: one field, classified by [`FieldKind`].
//!
//! Merging ([`SchemaCache::merge_with`]) appends another cache while
//! deduplicating structurally equal schemas and remapping every handle.
//! Validation ([`validate_cache`]) catches dangling handles and payload
//! mismatches. [`NodeQuery`] answers path-based lookups.
//!
//! # Example
//!
//! ```
//! use defschema_core::*;
//!
//! let mut base = SchemaCache::default();
//! base.schemas.push(StructuralSchema {
//!     full_name: "Verse.GraphicData".into(),
//!     fields: vec![FieldDescriptor::scalar("texPath", "System.String")],
//! });
//! base.definitions.push(DefinitionRecord {
//!     tag_name: "ThingDef".into(),
//!     full_name: "Verse.ThingDef".into(),
//!     fields: vec![FieldDescriptor::nested("graphicData", "Verse.GraphicData", 0)],
//!     ..Default::default()
//! });
//!
//! let addon = base.clone();
//! let report = base.merge_with(&addon, MergeStrategy::Append);
//! assert_eq!(report.schemas_deduplicated, 1);
//! assert_eq!(base.schemas.len(), 1);
//! assert!(validate_cache(&base).is_empty());
//! ```

mod descriptor;
mod merge;
mod query;
mod types;
mod validate;

pub use descriptor::{CacheDescriptor, TypeDescriptor, render_outline};
pub use merge::{MergeReport, MergeStrategy};
pub use query::{LIST_ITEM_TAG, NodeQuery};
pub use types::*;
pub use validate::{ValidationError, validate_cache};
