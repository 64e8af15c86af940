//! Persisted schema caches and multi-module schema libraries.
//!
//! Extracting a large module is slow, so each module's [`SchemaCache`] is
//! persisted once per module version and reused until the module changes.
//! A [`SchemaLibrary`] stacks add-on modules on top of a base module and
//! merges their caches into one.
//!
//! # Quick start
//!
//! ```no_run
//! use defschema_db::{LibraryConfig, SchemaLibrary};
//!
//! let config = LibraryConfig::load("defschema.yml").unwrap();
//! let library = SchemaLibrary::from_config(&config, false);
//! println!("{} definitions", library.cache().definitions.len());
//! library.save_manifest().unwrap();
//! ```
//!
//! [`SchemaCache`]: defschema_core::SchemaCache

mod config;
mod error;
mod library;
mod manifest;
mod store;

pub use config::LibraryConfig;
pub use error::{DatabaseError, Result};
pub use library::SchemaLibrary;
pub use manifest::{MANIFEST_FILE, Manifest, ModuleEntry};
pub use store::{
    CACHE_FORMAT_VERSION, CacheDocument, CacheOutcome, CacheStore, ModuleFingerprint,
    calculate_checksum, config_digest, read_cache, read_document, write_cache, write_document,
};
