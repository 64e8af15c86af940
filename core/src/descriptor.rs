//! Type description seam shared by live extraction and cached schemas.
//!
//! Tools that only need to print or inspect a type's fields should not care
//! whether those fields come from a persisted [`SchemaCache`] or from a live
//! extraction session. Both implement [`TypeDescriptor`].

use std::fmt::Write as _;

use crate::{FieldDescriptor, FieldKind, SchemaCache, StructuralSchema, VariantRecord};

/// Something that can describe a type by name and resolve arena handles.
pub trait TypeDescriptor {
    /// Returns the fields of the named type, or `None` if it is unknown.
    ///
    /// Takes `&mut self` so live implementations can extract on demand.
    fn describe(&mut self, full_name: &str) -> Option<Vec<FieldDescriptor>>;

    /// Looks up a structural schema by handle.
    fn schema(&self, handle: i32) -> Option<&StructuralSchema>;

    /// Looks up a variant record by handle.
    fn variant(&self, handle: i32) -> Option<&VariantRecord>;
}

/// [`TypeDescriptor`] over an already built cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheDescriptor<'a> {
    cache: &'a SchemaCache,
}

impl<'a> CacheDescriptor<'a> {
    pub fn new(cache: &'a SchemaCache) -> Self {
        Self { cache }
    }
}

impl TypeDescriptor for CacheDescriptor<'_> {
    fn describe(&mut self, full_name: &str) -> Option<Vec<FieldDescriptor>> {
        if let Some(def) = self
            .cache
            .definitions
            .iter()
            .find(|d| d.full_name == full_name || d.tag_name == full_name)
        {
            return Some(def.fields.clone());
        }
        if let Some(schema) = self.cache.schemas.iter().find(|s| s.full_name == full_name) {
            return Some(schema.fields.clone());
        }
        // variants are keyed by short name
        let short = full_name.rsplit('.').next().unwrap_or(full_name);
        self.cache
            .variants
            .iter()
            .find(|v| v.full_name == short)
            .map(|v| v.fields.clone())
    }

    fn schema(&self, handle: i32) -> Option<&StructuralSchema> {
        self.cache.schema(handle)
    }

    fn variant(&self, handle: i32) -> Option<&VariantRecord> {
        self.cache.variant(handle)
    }
}

/// Renders an indented field outline of `full_name`, descending at most
/// `max_depth` levels through nested schemas.
///
/// Returns `None` if the descriptor does not know the type.
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
/// let outline = render_outline(&mut CacheDescriptor::new(&cache), "Verse.ThingDef", 4).unwrap();
/// assert!(outline.contains("    -- texPath : System.String"));
/// ```
pub fn render_outline(
    descriptor: &mut dyn TypeDescriptor,
    full_name: &str,
    max_depth: usize,
) -> Option<String> {
    let fields = descriptor.describe(full_name)?;
    let mut out = String::new();
    let _ = writeln!(out, "{full_name}");
    let mut path = Vec::new();
    write_fields(&*descriptor, &fields, 1, max_depth, &mut path, &mut out);
    Some(out)
}

fn write_fields(
    descriptor: &dyn TypeDescriptor,
    fields: &[FieldDescriptor],
    depth: usize,
    max_depth: usize,
    path: &mut Vec<i32>,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    for field in fields {
        let _ = write!(out, "{indent}-- {} : {}", field.name, field.declared_type_name);
        match field.kind {
            FieldKind::Enumerated => {
                let values = field.enum_values.as_deref().unwrap_or_default();
                let _ = write!(out, " [{}]", values.join(", "));
            }
            FieldKind::ListPolymorphic => {
                let names: Vec<&str> = field
                    .variant_ids
                    .iter()
                    .flatten()
                    .filter_map(|&id| descriptor.variant(id))
                    .map(|v| v.full_name.as_str())
                    .collect();
                let _ = write!(out, " <{}>", names.join(" | "));
            }
            FieldKind::ExternalReference => out.push_str(" (external)"),
            _ => {}
        }

        if path.contains(&field.schema_id) {
            out.push_str(" (recursive)\n");
            continue;
        }
        out.push('\n');

        if depth >= max_depth || !field.kind.has_structure() {
            continue;
        }
        let inline = field.child_fields.as_deref().filter(|c| !c.is_empty());
        let children = match inline {
            Some(children) => children,
            None => match descriptor.schema(field.schema_id) {
                Some(schema) => schema.fields.as_slice(),
                None => continue,
            },
        };
        path.push(field.schema_id);
        write_fields(descriptor, children, depth + 1, max_depth, path, out);
        path.pop();
    }
}
