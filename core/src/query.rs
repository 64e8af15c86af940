//! Path-based navigation over a finished schema cache.
//!
//! Editors address nodes with XML-style paths such as
//! `/Defs/ThingDef/comps/li`. [`NodeQuery`] resolves such a path against the
//! definition records, walking nested fields through the schema arena.
//! Lookups are best effort: a path that leaves the known graph resolves to
//! the deepest node that was still recognized.

use std::collections::HashMap;

use crate::{DefinitionRecord, FieldDescriptor, FieldKind, SchemaCache};

/// Segment name used for list items in serialized documents.
pub const LIST_ITEM_TAG: &str = "li";

/// Read-only query view over a [`SchemaCache`].
///
/// # Examples
///
/// ```
/// use defschema_core::*;
///
/// let mut cache = SchemaCache::default();
/// cache.schemas.push(StructuralSchema {
///     full_name: "Verse.GraphicData".into(),
///     fields: vec![FieldDescriptor::scalar("texPath", "System.String")],
/// });
/// cache.definitions.push(DefinitionRecord {
///     tag_name: "ThingDef".into(),
///     full_name: "Verse.ThingDef".into(),
///     fields: vec![FieldDescriptor::nested("graphicData", "Verse.GraphicData", 0)],
///     ..Default::default()
/// });
///
/// let query = NodeQuery::new(&cache);
/// assert_eq!(query.root_tags(), vec!["ThingDef"]);
/// assert_eq!(
///     query.child_names_or_values("Defs/ThingDef/graphicData"),
///     vec!["texPath".to_string()],
/// );
/// ```
pub struct NodeQuery<'a> {
    cache: &'a SchemaCache,
    by_tag: HashMap<&'a str, &'a DefinitionRecord>,
}

impl<'a> NodeQuery<'a> {
    /// Indexes the cache's definitions by tag name. When a tag appears more
    /// than once (the same module merged twice), the last record wins.
    pub fn new(cache: &'a SchemaCache) -> Self {
        let by_tag = cache
            .definitions
            .iter()
            .map(|def| (def.tag_name.as_str(), def))
            .collect();
        Self { cache, by_tag }
    }

    /// All definition tags, sorted.
    pub fn root_tags(&self) -> Vec<&'a str> {
        let mut tags: Vec<&'a str> = self.by_tag.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    /// Looks up a definition by tag name.
    pub fn definition(&self, tag: &str) -> Option<&'a DefinitionRecord> {
        self.by_tag.get(tag).copied()
    }

    /// Splits a path and keeps only the part starting at the last segment
    /// that names a definition.
    fn segments<'p>(&self, path: &'p str) -> Vec<&'p str> {
        let parts: Vec<&'p str> = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        for i in (1..parts.len()).rev() {
            if self.by_tag.contains_key(parts[i]) {
                return parts[i..].to_vec();
            }
        }
        parts
    }

    /// Returns the deepest field the path resolves to.
    ///
    /// `li` segments directly under a list field are stepped over. Returns
    /// `None` when the first segment is not a known definition or the path
    /// names only the definition itself.
    pub fn deepest_field(&self, path: &str) -> Option<&'a FieldDescriptor> {
        let segments = self.segments(path);
        self.deepest_in(&segments)
    }

    fn deepest_in(&self, segments: &[&str]) -> Option<&'a FieldDescriptor> {
        let (first, rest) = segments.split_first()?;
        let def = self.definition(first)?;

        let mut current: &'a [FieldDescriptor] = &def.fields;
        let mut last: Option<&'a FieldDescriptor> = None;
        for (i, segment) in rest.iter().enumerate() {
            if *segment == LIST_ITEM_TAG && last.is_some_and(|f| f.kind.is_list()) {
                continue;
            }
            let Some(matched) = current.iter().find(|f| f.name == *segment) else {
                return last;
            };
            last = Some(matched);
            if i + 1 == rest.len() {
                break;
            }
            if !matched.kind.has_structure() {
                return last;
            }
            current = matched.resolve_children(&self.cache.schemas);
        }
        last
    }

    /// Returns the node a path resolves to (if any) and its child fields.
    pub fn children(&self, path: &str) -> (Option<&'a FieldDescriptor>, &'a [FieldDescriptor]) {
        let segments = self.segments(path);
        if segments.len() == 1 {
            let fields = self
                .definition(segments[0])
                .map(|def| def.fields.as_slice())
                .unwrap_or(&[]);
            return (None, fields);
        }

        match self.deepest_in(&segments) {
            Some(field) if field.kind.has_structure() => {
                (Some(field), field.resolve_children(&self.cache.schemas))
            }
            other => (other, &[]),
        }
    }

    /// Names an editor can offer below `path`.
    ///
    /// - polymorphic list: the variant class names (or `li` when none are known)
    /// - other lists: the named instances of the item's definition type,
    ///   looked up through the cast table; the item's child names for a
    ///   path ending in `li`; otherwise `li`
    /// - everything else: child field names
    pub fn child_names_or_values(&self, path: &str) -> Vec<String> {
        let (node, children) = self.children(path);

        if let Some(node) = node {
            if node.kind == FieldKind::ListPolymorphic {
                let names: Vec<String> = node
                    .variant_ids
                    .iter()
                    .flatten()
                    .filter_map(|&id| self.cache.variant(id))
                    .map(|v| v.full_name.clone())
                    .collect();
                if names.is_empty() {
                    return vec![LIST_ITEM_TAG.to_string()];
                }
                return names;
            }

            if let Some(item) = node.list_item_type_name() {
                let target = self.cache.cast_target(item);
                if let Some(values) = self.cache.enumerated_values(target) {
                    return values.to_vec();
                }
                let ends_in_item = path
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .is_some_and(|s| s.trim() == LIST_ITEM_TAG);
                if ends_in_item {
                    return children.iter().map(|f| f.name.clone()).collect();
                }
                return vec![LIST_ITEM_TAG.to_string()];
            }
        }

        children.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StructuralSchema, VariantRecord};

    fn cache() -> SchemaCache {
        let mut cache = SchemaCache::default();
        cache.schemas.push(StructuralSchema {
            full_name: "Verse.GraphicData".into(),
            fields: vec![
                FieldDescriptor::scalar("texPath", "System.String"),
                FieldDescriptor::nested("shadowData", "Verse.ShadowData", 1),
            ],
        });
        cache.schemas.push(StructuralSchema {
            full_name: "Verse.ShadowData".into(),
            fields: vec![FieldDescriptor::scalar("volume", "UnityEngine.Vector3")],
        });
        cache.schemas.push(StructuralSchema {
            full_name: "RimWorld.StatModifier".into(),
            fields: vec![
                FieldDescriptor::nested("stat", "RimWorld.StatDef", -1),
                FieldDescriptor::scalar("value", "System.Single"),
            ],
        });
        cache.schemas.push(StructuralSchema {
            full_name: "Verse.CompProperties".into(),
            fields: vec![FieldDescriptor::scalar("compClass", "System.Type")],
        });
        cache.variants.push(VariantRecord::placeholder("CompProperties_Glower", 3, false));
        cache.variants.push(VariantRecord::placeholder("CompProperties_Power", 3, false));
        cache.definitions.push(DefinitionRecord {
            tag_name: "ThingDef".into(),
            full_name: "Verse.ThingDef".into(),
            fields: vec![
                FieldDescriptor::scalar("label", "System.String"),
                FieldDescriptor::nested("graphicData", "Verse.GraphicData", 0),
                FieldDescriptor::list("statBases", "List<RimWorld.StatModifier>", 2),
                FieldDescriptor::polymorphic_list("comps", "List<Verse.CompProperties>", 3, vec![0, 1]),
                FieldDescriptor::list("researchPrerequisites", "List<Verse.ResearchProjectDef>", -1),
                FieldDescriptor::polymorphic_list("modExtensions", "List<Verse.DefModExtension>", -1, vec![]),
            ],
            ..Default::default()
        });
        cache.definitions.push(DefinitionRecord {
            tag_name: "ResearchProjectDef".into(),
            full_name: "Verse.ResearchProjectDef".into(),
            ..Default::default()
        });
        cache.enumerated_value_catalog.insert(
            "RimWorld.StatDef".into(),
            vec!["MaxHitPoints".into(), "Mass".into()],
        );
        cache.enumerated_value_catalog.insert(
            "Verse.ResearchProjectDef".into(),
            vec!["Electricity".into()],
        );
        cache
            .cast_table
            .insert("RimWorld.StatModifier".into(), "RimWorld.StatDef".into());
        cache
    }

    #[test]
    fn test_root_tags_sorted() {
        let cache = cache();
        let query = NodeQuery::new(&cache);
        assert_eq!(query.root_tags(), vec!["ResearchProjectDef", "ThingDef"]);
    }

    #[test]
    fn test_definition_level_children() {
        let cache = cache();
        let query = NodeQuery::new(&cache);
        let (node, children) = query.children("/Defs/ThingDef");
        assert!(node.is_none());
        assert_eq!(children.len(), 6);
    }

    #[test]
    fn test_nested_navigation_through_schemas() {
        let cache = cache();
        let query = NodeQuery::new(&cache);
        let field = query
            .deepest_field("Defs/ThingDef/graphicData/shadowData/volume")
            .unwrap();
        assert_eq!(field.name, "volume");
    }

    #[test]
    fn test_unknown_segment_returns_last_valid_node() {
        let cache = cache();
        let query = NodeQuery::new(&cache);
        let field = query
            .deepest_field("ThingDef/graphicData/doesNotExist/deeper")
            .unwrap();
        assert_eq!(field.name, "graphicData");
        assert!(query.deepest_field("UnknownDef/label").is_none());
        assert!(query.deepest_field("ThingDef").is_none());
    }

    #[test]
    fn test_polymorphic_list_offers_variant_names() {
        let cache = cache();
        let query = NodeQuery::new(&cache);
        assert_eq!(
            query.child_names_or_values("ThingDef/comps"),
            vec!["CompProperties_Glower", "CompProperties_Power"]
        );
        assert_eq!(query.child_names_or_values("ThingDef/modExtensions"), vec!["li"]);
    }

    #[test]
    fn test_list_uses_cast_table_and_catalog() {
        let cache = cache();
        let query = NodeQuery::new(&cache);
        assert_eq!(
            query.child_names_or_values("ThingDef/statBases"),
            vec!["MaxHitPoints", "Mass"]
        );
        assert_eq!(
            query.child_names_or_values("ThingDef/researchPrerequisites"),
            vec!["Electricity"]
        );
    }

    #[test]
    fn test_list_item_children() {
        let mut cache = cache();
        cache.cast_table.clear();
        let query = NodeQuery::new(&cache);
        assert_eq!(query.child_names_or_values("ThingDef/statBases"), vec!["li"]);
        assert_eq!(
            query.child_names_or_values("ThingDef/statBases/li"),
            vec!["stat", "value"]
        );
    }

    #[test]
    fn test_path_is_trimmed_to_last_definition_segment() {
        let cache = cache();
        let query = NodeQuery::new(&cache);
        let (_, children) = query.children("Defs/ResearchProjectDef/ThingDef/graphicData");
        assert_eq!(children.len(), 2);
    }
}
