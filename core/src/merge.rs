//! Merging of independently built schema caches.
//!
//! [`SchemaCache::merge_with`] absorbs another cache into `self` in five
//! ordered stages:
//!
//! 1. Structural schemas are reconciled by name bucket plus deep structural
//!    equality. Unmatched schemas get the next handle in `self`'s arena
//!    right away so later incoming schemas can dedup against them.
//! 2. Variant records are reconciled by short name only.
//! 3. Newly added schemas have every `schema_id` and variant id rewritten
//!    and are appended.
//! 4. Definitions are deep-cloned, remapped and appended (or replaced, see
//!    [`MergeStrategy::Overwrite`]).
//! 5. The enumerated-value catalog is unioned and the cast table is
//!    overwritten key by key.
//!
//! Arenas are append-only: a merge never removes or reorders existing
//! entries, so handles held by earlier readers stay valid.
//!
//! # Example
//!
//! ```
//! use defschema_core::*;
//!
//! let mut base = SchemaCache::default();
//! base.schemas.push(StructuralSchema {
//!     full_name: "Vector".into(),
//!     fields: vec![FieldDescriptor::scalar("x", "System.Single")],
//! });
//!
//! let mut addon = SchemaCache::default();
//! addon.schemas.push(StructuralSchema {
//!     full_name: "Vector".into(),
//!     fields: vec![FieldDescriptor::scalar("length", "System.Int32")],
//! });
//!
//! let report = base.merge_with(&addon, MergeStrategy::Append);
//! assert_eq!(base.schemas.len(), 2); // same name, different structure
//! assert_eq!(report.schemas_added, 1);
//! ```

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::{DefinitionRecord, FieldDescriptor, SchemaCache, StructuralSchema};

/// How definitions from the incoming cache are combined with existing ones.
///
/// Schemas, variants, the catalog and the cast table merge the same way
/// under both strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Append every incoming definition. Merging the same source twice
    /// duplicates its definitions.
    #[default]
    Append,
    /// Replace an existing definition with the same tag name in place;
    /// append the rest.
    Overwrite,
}

/// Counters describing what one merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub schemas_added: usize,
    pub schemas_deduplicated: usize,
    pub variants_added: usize,
    pub variants_reused: usize,
    /// Variants matched by short name whose field shape differs.
    pub variant_collisions: usize,
    pub definitions_added: usize,
    pub definitions_replaced: usize,
}

type IdMap = HashMap<i32, i32>;

/// Which cache a field list comes from while comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// Already in `self`; ids are final.
    Base,
    /// From `other`; variant ids still need mapping.
    Incoming,
}

#[derive(Debug, Clone, Copy)]
enum Candidate {
    Existing(usize),
    Pending(usize),
}

/// Maps `id` through `map`. Negative ids and lookup misses are returned
/// unchanged: caches written by older extractors may reference entries the
/// map never saw.
fn remap(map: &IdMap, id: i32) -> i32 {
    if id < 0 {
        return id;
    }
    match map.get(&id) {
        Some(&mapped) => mapped,
        None => {
            debug!(id, "handle missing from merge map, keeping it as-is");
            id
        }
    }
}

fn canonical_variant(id: i32, side: Side, variant_map: &IdMap) -> i32 {
    match side {
        Side::Base => id,
        Side::Incoming => remap(variant_map, id),
    }
}

fn fields_match(
    a: &[FieldDescriptor],
    a_side: Side,
    b: &[FieldDescriptor],
    b_side: Side,
    variant_map: &IdMap,
) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(fa, fb)| field_matches(fa, a_side, fb, b_side, variant_map))
}

fn field_matches(
    a: &FieldDescriptor,
    a_side: Side,
    b: &FieldDescriptor,
    b_side: Side,
    variant_map: &IdMap,
) -> bool {
    if a.name != b.name
        || a.declared_type_name != b.declared_type_name
        || a.kind != b.kind
        || a.reference_hint != b.reference_hint
        || a.enum_values != b.enum_values
    {
        return false;
    }

    let variants_equal = match (&a.variant_ids, &b.variant_ids) {
        (None, None) => true,
        (Some(va), Some(vb)) => {
            va.len() == vb.len()
                && va.iter().zip(vb).all(|(&ia, &ib)| {
                    canonical_variant(ia, a_side, variant_map)
                        == canonical_variant(ib, b_side, variant_map)
                })
        }
        _ => false,
    };
    if !variants_equal {
        return false;
    }

    let children_a = a.child_fields.as_deref().unwrap_or(&[]);
    let children_b = b.child_fields.as_deref().unwrap_or(&[]);
    fields_match(children_a, a_side, children_b, b_side, variant_map)
}

fn remap_fields(fields: &mut [FieldDescriptor], schema_map: &IdMap, variant_map: &IdMap) {
    for field in fields {
        field.schema_id = remap(schema_map, field.schema_id);
        if let Some(ids) = field.variant_ids.as_mut() {
            for id in ids.iter_mut() {
                *id = remap(variant_map, *id);
            }
        }
        if let Some(children) = field.child_fields.as_mut() {
            remap_fields(children, schema_map, variant_map);
        }
    }
}

fn cloned_and_remapped(
    fields: &[FieldDescriptor],
    schema_map: &IdMap,
    variant_map: &IdMap,
) -> Vec<FieldDescriptor> {
    let mut out = fields.to_vec();
    remap_fields(&mut out, schema_map, variant_map);
    out
}

impl SchemaCache {
    /// Returns a new cache holding `self` followed by `other`. Neither input
    /// is modified.
    pub fn concat(&self, other: &SchemaCache) -> SchemaCache {
        let mut merged = self.clone();
        merged.merge_with(other, MergeStrategy::Append);
        merged
    }

    /// Absorbs `other` into `self`, remapping every handle it carries.
    ///
    /// After the merge every `schema_id` and variant id reachable from
    /// `self` indexes into `self`'s own arenas. Merging an empty cache is a
    /// no-op.
    pub fn merge_with(&mut self, other: &SchemaCache, strategy: MergeStrategy) -> MergeReport {
        let mut report = MergeReport::default();

        // Variant handles depend only on short names, so they are planned
        // up front; stage 1 compares variant ids through this map.
        let mut variant_by_name: HashMap<String, i32> = HashMap::new();
        for (idx, variant) in self.variants.iter().enumerate() {
            variant_by_name
                .entry(variant.full_name.clone())
                .or_insert(idx as i32);
        }
        let mut variant_map = IdMap::new();
        let mut new_variants: Vec<usize> = Vec::new();
        let mut reused_variants: Vec<(usize, i32)> = Vec::new();
        for (idx, variant) in other.variants.iter().enumerate() {
            match variant_by_name.get(&variant.full_name) {
                Some(&existing) => {
                    variant_map.insert(idx as i32, existing);
                    if (existing as usize) < self.variants.len() {
                        reused_variants.push((idx, existing));
                    }
                }
                None => {
                    let handle = (self.variants.len() + new_variants.len()) as i32;
                    variant_by_name.insert(variant.full_name.clone(), handle);
                    variant_map.insert(idx as i32, handle);
                    new_variants.push(idx);
                }
            }
        }

        // Stage 1: schema reconciliation.
        let mut buckets: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (idx, schema) in self.schemas.iter().enumerate() {
            buckets
                .entry(schema.full_name.clone())
                .or_default()
                .push(Candidate::Existing(idx));
        }

        let mut schema_map = IdMap::new();
        let mut pending: Vec<StructuralSchema> = Vec::new();
        for (idx, schema) in other.schemas.iter().enumerate() {
            let found = buckets.get(&schema.full_name).and_then(|candidates| {
                candidates.iter().find_map(|candidate| {
                    let (fields, side, handle) = match *candidate {
                        Candidate::Existing(i) => (&self.schemas[i].fields, Side::Base, i),
                        Candidate::Pending(p) => (
                            &pending[p].fields,
                            Side::Incoming,
                            self.schemas.len() + p,
                        ),
                    };
                    fields_match(fields, side, &schema.fields, Side::Incoming, &variant_map)
                        .then_some(handle as i32)
                })
            });

            match found {
                Some(handle) => {
                    schema_map.insert(idx as i32, handle);
                    report.schemas_deduplicated += 1;
                }
                None => {
                    let handle = (self.schemas.len() + pending.len()) as i32;
                    schema_map.insert(idx as i32, handle);
                    buckets
                        .entry(schema.full_name.clone())
                        .or_default()
                        .push(Candidate::Pending(pending.len()));
                    pending.push(schema.clone());
                }
            }
        }

        // Stage 2: variant reconciliation.
        for (idx, existing) in reused_variants {
            let incoming = &other.variants[idx];
            let current = &self.variants[existing as usize];
            report.variants_reused += 1;
            if !fields_match(
                &current.fields,
                Side::Base,
                &incoming.fields,
                Side::Incoming,
                &variant_map,
            ) {
                warn!(
                    variant = %incoming.full_name,
                    existing_fields = current.fields.len(),
                    incoming_fields = incoming.fields.len(),
                    "variant short name already registered with a different shape, keeping the existing one"
                );
                report.variant_collisions += 1;
            }
        }
        for idx in new_variants {
            let mut variant = other.variants[idx].clone();
            variant.schema_id = remap(&schema_map, variant.schema_id);
            remap_fields(&mut variant.fields, &schema_map, &variant_map);
            self.variants.push(variant);
            report.variants_added += 1;
        }

        // Stage 3: remap the newly added schemas and append them.
        for mut schema in pending {
            remap_fields(&mut schema.fields, &schema_map, &variant_map);
            self.schemas.push(schema);
            report.schemas_added += 1;
        }

        // Stage 4: definitions.
        for def in &other.definitions {
            let merged = DefinitionRecord {
                fields: cloned_and_remapped(&def.fields, &schema_map, &variant_map),
                ..def.clone()
            };
            let slot = match strategy {
                MergeStrategy::Append => None,
                MergeStrategy::Overwrite => self
                    .definitions
                    .iter()
                    .position(|d| d.tag_name == merged.tag_name),
            };
            match slot {
                Some(pos) => {
                    self.definitions[pos] = merged;
                    report.definitions_replaced += 1;
                }
                None => {
                    self.definitions.push(merged);
                    report.definitions_added += 1;
                }
            }
        }

        // Stage 5: catalog union and cast overwrite.
        for (type_name, values) in &other.enumerated_value_catalog {
            match self.enumerated_value_catalog.get_mut(type_name) {
                None => {
                    self.enumerated_value_catalog
                        .insert(type_name.clone(), values.clone());
                }
                Some(existing) => {
                    let mut seen: HashSet<String> = HashSet::new();
                    let mut union = Vec::with_capacity(existing.len() + values.len());
                    for value in existing.iter().chain(values) {
                        if seen.insert(value.clone()) {
                            union.push(value.clone());
                        }
                    }
                    *existing = union;
                }
            }
        }
        for (wrapper, target) in &other.cast_table {
            self.cast_table.insert(wrapper.clone(), target.clone());
        }

        debug!(?report, "merged schema cache");
        report
    }
}
