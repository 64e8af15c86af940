//! Handle registries backing the schema and variant arenas.
//!
//! Both registries hand out `i32` handles into append-only vectors. The
//! structural registry inserts a placeholder *before* resolving a type's
//! fields, so a field that refers back to a type under construction finds
//! its handle and stops recursing.
//!
//! Resolvers receive the whole [`RegistryHost`] mutably, which lets them
//! call back into either registry while a placeholder is pending.
//!
//! A type whose schema failed once stays failed: later lookups return the
//! recorded error instead of the half-built placeholder.

use std::collections::HashMap;

use defschema_core::{FieldDescriptor, NO_SCHEMA, StructuralSchema, VariantRecord};
use tracing::{debug, warn};

use crate::error::TypeIntrospectionError;

/// Owner of both registries. Implemented by the extraction session.
pub trait RegistryHost {
    fn schemas(&mut self) -> &mut SchemaRegistry;
    fn variants(&mut self) -> &mut VariantRegistry;
    /// `false` for scalar and banned types, which never get a schema.
    fn needs_schema(&self, full_name: &str) -> bool;
}

/// Structural schemas keyed by full type name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Vec<StructuralSchema>,
    by_type: HashMap<String, i32>,
    failed: HashMap<String, TypeIntrospectionError>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_of(&self, full_name: &str) -> Option<i32> {
        self.by_type.get(full_name).copied()
    }

    pub fn schemas(&self) -> &[StructuralSchema] {
        &self.schemas
    }

    /// The recorded failure for `full_name`, if its schema could not be built.
    pub fn failure_of(&self, full_name: &str) -> Option<&TypeIntrospectionError> {
        self.failed.get(full_name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn into_schemas(self) -> Vec<StructuralSchema> {
        self.schemas
    }

    /// Returns the handle for `full_name`, creating the schema on first
    /// sight.
    ///
    /// The resolver runs at most once per type. Its error propagates and is
    /// recorded, so every later lookup of the type fails too. The placeholder
    /// it was filling stays in the arena with no fields but is no longer
    /// reachable by name.
    pub fn get_or_create<H, E>(
        host: &mut H,
        full_name: &str,
        resolver: impl FnOnce(&mut H) -> Result<Vec<FieldDescriptor>, E>,
    ) -> Result<i32, E>
    where
        H: RegistryHost + ?Sized,
        E: From<TypeIntrospectionError> + std::fmt::Display,
    {
        if let Some(failure) = host.schemas().failure_of(full_name) {
            return Err(E::from(failure.clone()));
        }
        if let Some(handle) = host.schemas().handle_of(full_name) {
            return Ok(handle);
        }
        if !host.needs_schema(full_name) {
            return Ok(NO_SCHEMA);
        }

        let registry = host.schemas();
        let index = registry.schemas.len();
        let handle = index as i32;
        registry
            .schemas
            .push(StructuralSchema::placeholder(full_name));
        registry.by_type.insert(full_name.to_string(), handle);

        match resolver(host) {
            Ok(fields) => {
                if let Some(schema) = host.schemas().schemas.get_mut(index) {
                    schema.fields = fields;
                }
                Ok(handle)
            }
            Err(err) => {
                debug!(type_name = full_name, error = %err, "schema failed, recording failure");
                let registry = host.schemas();
                registry.by_type.remove(full_name);
                registry.failed.insert(
                    full_name.to_string(),
                    TypeIntrospectionError::new(full_name, err.to_string()),
                );
                Err(err)
            }
        }
    }
}

/// Polymorphic variants keyed by short type name.
#[derive(Debug, Default)]
pub struct VariantRegistry {
    variants: Vec<VariantRecord>,
    by_short_name: HashMap<String, i32>,
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_of(&self, short_name: &str) -> Option<i32> {
        self.by_short_name.get(short_name).copied()
    }

    pub fn variants(&self) -> &[VariantRecord] {
        &self.variants
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn into_variants(self) -> Vec<VariantRecord> {
        self.variants
    }

    /// Returns the handle for `full_name`'s short name, registering the
    /// variant on first sight.
    ///
    /// The variant's `schema_id` copies the structural handle of the same
    /// type if one exists at this point. A resolver failure is logged and
    /// leaves the variant with no fields.
    pub fn get_or_create<H, E>(
        host: &mut H,
        full_name: &str,
        short_name: &str,
        is_special_kind: bool,
        resolver: impl FnOnce(&mut H) -> Result<Vec<FieldDescriptor>, E>,
    ) -> i32
    where
        H: RegistryHost + ?Sized,
        E: std::fmt::Display,
    {
        if let Some(handle) = host.variants().handle_of(short_name) {
            return handle;
        }

        let schema_id = host.schemas().handle_of(full_name).unwrap_or(NO_SCHEMA);
        let registry = host.variants();
        let index = registry.variants.len();
        let handle = index as i32;
        registry.variants.push(VariantRecord::placeholder(
            short_name,
            schema_id,
            is_special_kind,
        ));
        registry.by_short_name.insert(short_name.to_string(), handle);

        match resolver(host) {
            Ok(fields) => {
                if let Some(variant) = host.variants().variants.get_mut(index) {
                    variant.fields = fields;
                }
            }
            Err(err) => {
                warn!(
                    variant = short_name,
                    type_name = full_name,
                    error = %err,
                    "variant fields unavailable, keeping it with no fields"
                );
            }
        }
        handle
    }
}
