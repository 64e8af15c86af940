//! Structural validation of a schema cache.
//!
//! Catches broken invariants before a cache is handed to readers: handles
//! that point past the end of an arena, kind/payload mismatches and empty
//! names. A cache loaded from disk that fails validation is treated like a
//! corrupt file by the store.
//!
//! # Examples
//!
//! ```
//! use defschema_core::*;
//!
//! let mut cache = SchemaCache::default();
//! cache.definitions.push(DefinitionRecord {
//!     tag_name: "ThingDef".into(),
//!     full_name: "Verse.ThingDef".into(),
//!     fields: vec![FieldDescriptor::nested("graphicData", "Verse.GraphicData", 0)],
//!     ..Default::default()
//! });
//! // handle 0 does not exist yet
//! assert!(!validate_cache(&cache).is_empty());
//!
//! cache.schemas.push(StructuralSchema::placeholder("Verse.GraphicData"));
//! assert!(validate_cache(&cache).is_empty());
//! ```

use thiserror::Error;

use crate::{FieldDescriptor, FieldKind, SchemaCache};

/// Cache validation errors.
///
/// `location` strings read like `definition ThingDef/graphicData`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A `schema_id` points past the end of the schema arena.
    #[error("dangling schema handle {handle} at {location} (arena has {len} entries)")]
    DanglingSchema {
        location: String,
        handle: i32,
        len: usize,
    },
    /// A variant id points past the end of the variant arena.
    #[error("dangling variant handle {handle} at {location} (arena has {len} entries)")]
    DanglingVariant {
        location: String,
        handle: i32,
        len: usize,
    },
    /// An enumerated field carries no enumerator list, or a non-enumerated
    /// field carries one.
    #[error("enum values do not match field kind at {0}")]
    EnumPayloadMismatch(String),
    /// A polymorphic list carries no variant ids, or another kind carries
    /// some.
    #[error("variant ids do not match field kind at {0}")]
    VariantPayloadMismatch(String),
    /// A definition, schema or variant has an empty name.
    #[error("empty name at {0}")]
    EmptyName(String),
}

/// Validates every handle and payload reachable from `cache`.
///
/// Returns all problems found; an empty vector means the cache is sound.
pub fn validate_cache(cache: &SchemaCache) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let schemas = cache.schemas.len();
    let variants = cache.variants.len();

    for def in &cache.definitions {
        let location = format!("definition {}", def.tag_name);
        if def.tag_name.trim().is_empty() {
            errors.push(ValidationError::EmptyName(location.clone()));
        }
        validate_fields(&def.fields, &location, schemas, variants, &mut errors);
    }

    for (idx, schema) in cache.schemas.iter().enumerate() {
        let location = format!("schema #{idx} {}", schema.full_name);
        if schema.full_name.trim().is_empty() {
            errors.push(ValidationError::EmptyName(location.clone()));
        }
        validate_fields(&schema.fields, &location, schemas, variants, &mut errors);
    }

    for (idx, variant) in cache.variants.iter().enumerate() {
        let location = format!("variant #{idx} {}", variant.full_name);
        if variant.full_name.trim().is_empty() {
            errors.push(ValidationError::EmptyName(location.clone()));
        }
        check_schema_handle(variant.schema_id, &location, schemas, &mut errors);
        validate_fields(&variant.fields, &location, schemas, variants, &mut errors);
    }

    errors
}

fn check_schema_handle(
    handle: i32,
    location: &str,
    len: usize,
    errors: &mut Vec<ValidationError>,
) {
    if handle >= 0 && handle as usize >= len {
        errors.push(ValidationError::DanglingSchema {
            location: location.to_string(),
            handle,
            len,
        });
    }
}

fn validate_fields(
    fields: &[FieldDescriptor],
    parent: &str,
    schemas: usize,
    variants: usize,
    errors: &mut Vec<ValidationError>,
) {
    for field in fields {
        let location = format!("{parent}/{}", field.name);

        check_schema_handle(field.schema_id, &location, schemas, errors);

        if (field.kind == FieldKind::Enumerated) != field.enum_values.is_some() {
            errors.push(ValidationError::EnumPayloadMismatch(location.clone()));
        }
        if (field.kind == FieldKind::ListPolymorphic) != field.variant_ids.is_some() {
            errors.push(ValidationError::VariantPayloadMismatch(location.clone()));
        }
        for &handle in field.variant_ids.iter().flatten() {
            if handle < 0 || handle as usize >= variants {
                errors.push(ValidationError::DanglingVariant {
                    location: location.clone(),
                    handle,
                    len: variants,
                });
            }
        }

        if let Some(children) = &field.child_fields {
            validate_fields(children, &location, schemas, variants, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefinitionRecord, StructuralSchema, VariantRecord};

    fn def_with(fields: Vec<FieldDescriptor>) -> SchemaCache {
        let mut cache = SchemaCache::default();
        cache.definitions.push(DefinitionRecord {
            tag_name: "ThingDef".into(),
            full_name: "Verse.ThingDef".into(),
            fields,
            ..Default::default()
        });
        cache
    }

    #[test]
    fn test_valid_cache_has_no_errors() {
        let mut cache = def_with(vec![
            FieldDescriptor::scalar("label", "System.String"),
            FieldDescriptor::enumerated("category", "ThingCategory", vec!["Item".into()]),
            FieldDescriptor::polymorphic_list("comps", "List<Verse.CompProperties>", 0, vec![0]),
        ]);
        cache.schemas.push(StructuralSchema::placeholder("Verse.CompProperties"));
        cache.variants.push(VariantRecord::placeholder("CompProperties_Glower", 0, false));
        assert!(validate_cache(&cache).is_empty());
    }

    #[test]
    fn test_dangling_variant_in_child_fields() {
        let cache = def_with(vec![
            FieldDescriptor::nested("holder", "Holder", -1).with_children(vec![
                FieldDescriptor::polymorphic_list("items", "List<Item>", -1, vec![3]),
            ]),
        ]);
        let errors = validate_cache(&cache);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ValidationError::DanglingVariant { location, handle: 3, .. } if location == "definition ThingDef/holder/items"
        ));
    }

    #[test]
    fn test_dangling_variant_schema_handle() {
        let mut cache = SchemaCache::default();
        cache.variants.push(VariantRecord::placeholder("Orphan", 5, true));
        let errors = validate_cache(&cache);
        assert!(matches!(errors[0], ValidationError::DanglingSchema { handle: 5, .. }));
    }

    #[test]
    fn test_kind_payload_mismatch() {
        let mut field = FieldDescriptor::scalar("mode", "Mode");
        field.kind = FieldKind::Enumerated;
        let errors = validate_cache(&def_with(vec![field]));
        assert_eq!(
            errors,
            vec![ValidationError::EnumPayloadMismatch(
                "definition ThingDef/mode".into()
            )]
        );
    }

    #[test]
    fn test_empty_names_are_reported() {
        let mut cache = SchemaCache::default();
        cache.schemas.push(StructuralSchema::placeholder(" "));
        let errors = validate_cache(&cache);
        assert!(matches!(errors[0], ValidationError::EmptyName(_)));
    }
}
