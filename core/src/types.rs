//! Schema graph type definitions.
//!
//! The model is an arena graph: structural schemas and polymorphic variant
//! records live in two append-only vectors on [`SchemaCache`] and are only
//! ever referenced by integer handle. A handle of [`NO_SCHEMA`] (`-1`) means
//! "no structure attached". Handles are plain `i32` values because that is
//! how they are persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel handle meaning "no schema / no structure".
pub const NO_SCHEMA: i32 = -1;

fn no_schema() -> i32 {
    NO_SCHEMA
}

/// Converts a persisted handle into an arena index, if it is one.
pub(crate) fn handle_index(handle: i32) -> Option<usize> {
    usize::try_from(handle).ok()
}

/// Rough classification of a field's declared type.
///
/// # Examples
///
/// ```
/// use defschema_core::FieldKind;
///
/// assert_eq!(FieldKind::default(), FieldKind::Scalar);
/// assert!(FieldKind::ListPolymorphic.is_list());
/// assert!(!FieldKind::NestedSimple.is_list());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Closed scalar value (numbers, text, vectors, colors, ranges).
    #[default]
    Scalar,
    /// Language-level enumeration; see [`FieldDescriptor::enum_values`].
    Enumerated,
    /// Nested object with a structural schema.
    NestedSimple,
    /// Ordered sequence of a single concrete item type.
    ListSimple,
    /// Ordered sequence whose items pick a concrete variant by class name.
    ListPolymorphic,
    /// Metadata node attached by collaborators, never produced by extraction.
    Metadata,
    /// Type that lives outside the scanned module and cannot be described.
    ExternalReference,
}

impl FieldKind {
    /// Returns `true` for both list kinds.
    pub fn is_list(self) -> bool {
        matches!(self, Self::ListSimple | Self::ListPolymorphic)
    }

    /// Returns `true` when children of this field can be navigated.
    pub fn has_structure(self) -> bool {
        matches!(
            self,
            Self::NestedSimple | Self::ListSimple | Self::ListPolymorphic
        )
    }
}

/// One field or writable property of a type.
///
/// Use the constructors ([`scalar`](Self::scalar), [`nested`](Self::nested),
/// [`list`](Self::list), ...) and chain builder methods.
///
/// # Examples
///
/// ```
/// use defschema_core::{FieldDescriptor, FieldKind, NO_SCHEMA};
///
/// let label = FieldDescriptor::scalar("label", "System.String");
/// assert_eq!(label.kind, FieldKind::Scalar);
/// assert_eq!(label.schema_id, NO_SCHEMA);
///
/// let comps = FieldDescriptor::polymorphic_list("comps", "List<Verse.CompProperties>", 3, vec![0, 1]);
/// assert_eq!(comps.variant_ids.as_deref(), Some(&[0, 1][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Display string of the declared type (`List<T>` for sequences).
    pub declared_type_name: String,
    pub kind: FieldKind,
    /// Enumerator names, present iff `kind` is [`FieldKind::Enumerated`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Handles into the variant arena, present iff `kind` is
    /// [`FieldKind::ListPolymorphic`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_ids: Option<Vec<i32>>,
    /// Handle into the schema arena, [`NO_SCHEMA`] if none.
    #[serde(default = "no_schema")]
    pub schema_id: i32,
    /// Inline structure attached directly instead of through `schema_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_fields: Option<Vec<FieldDescriptor>>,
    /// Discriminator hint used when serializing (e.g. a `Class` attribute).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference_hint: String,
    #[serde(default)]
    pub has_localization_handle: bool,
    #[serde(default)]
    pub must_localize: bool,
}

impl FieldDescriptor {
    fn bare(name: &str, declared_type_name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            declared_type_name: declared_type_name.to_string(),
            kind,
            enum_values: None,
            variant_ids: None,
            schema_id: NO_SCHEMA,
            child_fields: None,
            reference_hint: String::new(),
            has_localization_handle: false,
            must_localize: false,
        }
    }

    /// Creates a scalar field.
    pub fn scalar(name: &str, declared_type_name: &str) -> Self {
        Self::bare(name, declared_type_name, FieldKind::Scalar)
    }

    /// Creates an enumerated field with its ordered enumerator names.
    pub fn enumerated(name: &str, declared_type_name: &str, values: Vec<String>) -> Self {
        let mut field = Self::bare(name, declared_type_name, FieldKind::Enumerated);
        field.enum_values = Some(values);
        field
    }

    /// Creates a nested object field pointing at a structural schema.
    pub fn nested(name: &str, declared_type_name: &str, schema_id: i32) -> Self {
        let mut field = Self::bare(name, declared_type_name, FieldKind::NestedSimple);
        field.schema_id = schema_id;
        field
    }

    /// Creates a simple list field whose items use `schema_id`.
    pub fn list(name: &str, declared_type_name: &str, schema_id: i32) -> Self {
        let mut field = Self::bare(name, declared_type_name, FieldKind::ListSimple);
        field.schema_id = schema_id;
        field
    }

    /// Creates a polymorphic list field.
    pub fn polymorphic_list(
        name: &str,
        declared_type_name: &str,
        schema_id: i32,
        variant_ids: Vec<i32>,
    ) -> Self {
        let mut field = Self::bare(name, declared_type_name, FieldKind::ListPolymorphic);
        field.schema_id = schema_id;
        field.variant_ids = Some(variant_ids);
        field
    }

    /// Creates a field whose type lives outside the scanned module.
    pub fn external(name: &str, declared_type_name: &str) -> Self {
        Self::bare(name, declared_type_name, FieldKind::ExternalReference)
    }

    /// Attaches inline child fields.
    pub fn with_children(mut self, children: Vec<FieldDescriptor>) -> Self {
        self.child_fields = Some(children);
        self
    }

    /// Sets the serialization reference hint.
    pub fn with_hint(mut self, hint: &str) -> Self {
        self.reference_hint = hint.to_string();
        self
    }

    /// Sets the localization provenance flags.
    pub fn with_localization(mut self, has_handle: bool, must_localize: bool) -> Self {
        self.has_localization_handle = has_handle;
        self.must_localize = must_localize;
        self
    }

    /// Returns the schema arena index, if this field points at one.
    pub fn schema_index(&self) -> Option<usize> {
        handle_index(self.schema_id)
    }

    /// Item type name for `List<T>` display names.
    ///
    /// ```
    /// use defschema_core::FieldDescriptor;
    ///
    /// let f = FieldDescriptor::list("stats", "List<RimWorld.StatModifier>", 0);
    /// assert_eq!(f.list_item_type_name(), Some("RimWorld.StatModifier"));
    /// ```
    pub fn list_item_type_name(&self) -> Option<&str> {
        self.declared_type_name
            .strip_prefix("List<")
            .and_then(|rest| rest.strip_suffix('>'))
    }

    /// Returns the child fields of this field.
    ///
    /// Inline `child_fields` win when non-empty; otherwise the fields of the
    /// schema referenced by `schema_id`; otherwise an empty slice.
    pub fn resolve_children<'a>(&'a self, schemas: &'a [StructuralSchema]) -> &'a [FieldDescriptor] {
        if let Some(children) = self.child_fields.as_deref() {
            if !children.is_empty() {
                return children;
            }
        }
        self.schema_index()
            .and_then(|idx| schemas.get(idx))
            .map(|schema| schema.fields.as_slice())
            .unwrap_or(&[])
    }

    /// Creates a fresh editable copy of this field's children.
    ///
    /// Only the first level is copied. Inline children are dropped while
    /// `schema_id`, `enum_values` and `variant_ids` are kept so deeper levels
    /// stay resolvable through the arena.
    pub fn instantiate_children(&self, schemas: &[StructuralSchema]) -> Vec<FieldDescriptor> {
        self.resolve_children(schemas)
            .iter()
            .map(|f| FieldDescriptor {
                child_fields: None,
                ..f.clone()
            })
            .collect()
    }
}

impl std::fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.declared_type_name)
    }
}

/// A named structural schema, addressed by its index in
/// [`SchemaCache::schemas`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSchema {
    /// Full type name. Unique within one extraction pass only.
    pub full_name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl StructuralSchema {
    /// Creates a schema with no fields yet.
    pub fn placeholder(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            fields: Vec::new(),
        }
    }
}

/// One concrete implementation of a polymorphic family, addressed by its
/// index in [`SchemaCache::variants`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    /// Short type name; this is what goes into `Class="..."`.
    pub full_name: String,
    #[serde(default = "no_schema")]
    pub schema_id: i32,
    /// Set for members of a component family.
    #[serde(default)]
    pub is_special_kind: bool,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl VariantRecord {
    /// Creates a variant with no fields yet.
    pub fn placeholder(short_name: &str, schema_id: i32, is_special_kind: bool) -> Self {
        Self {
            full_name: short_name.to_string(),
            schema_id,
            is_special_kind,
            fields: Vec::new(),
        }
    }

    /// Same name, schema handle and kind. Fields are not compared.
    pub fn same_identity(&self, other: &VariantRecord) -> bool {
        self.full_name == other.full_name
            && self.schema_id == other.schema_id
            && self.is_special_kind == other.is_special_kind
    }
}

impl std::fmt::Display for VariantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// One definition type with its fields flattened across the inheritance
/// chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRecord {
    /// Serialization tag; may carry a namespace prefix for add-on modules.
    pub tag_name: String,
    pub name: String,
    pub parent_name: String,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub ignore_validation_errors: bool,
    pub full_name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl DefinitionRecord {
    /// Looks up a top-level field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl std::fmt::Display for DefinitionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(Elements: {})", self.tag_name, self.fields.len())
    }
}

/// The serializable aggregate root of one or more extraction passes.
///
/// # Examples
///
/// ```
/// use defschema_core::*;
///
/// let mut cache = SchemaCache::default();
/// cache.schemas.push(StructuralSchema::placeholder("Verse.GraphicData"));
/// cache.definitions.push(DefinitionRecord {
///     tag_name: "ThingDef".into(),
///     name: "ThingDef".into(),
///     full_name: "Verse.ThingDef".into(),
///     fields: vec![FieldDescriptor::nested("graphicData", "Verse.GraphicData", 0)],
///     ..Default::default()
/// });
///
/// let def = cache.definition("ThingDef").unwrap();
/// let graphic = def.field("graphicData").unwrap();
/// assert!(graphic.resolve_children(&cache.schemas).is_empty());
/// assert_eq!(cache.schema(graphic.schema_id).unwrap().full_name, "Verse.GraphicData");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCache {
    #[serde(default)]
    pub definitions: Vec<DefinitionRecord>,
    /// Definition type full name -> named instances declared by registries.
    #[serde(default)]
    pub enumerated_value_catalog: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub schemas: Vec<StructuralSchema>,
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
    /// Single-field wrapper type -> wrapped definition type.
    #[serde(default)]
    pub cast_table: BTreeMap<String, String>,
}

impl SchemaCache {
    /// Returns `true` when the cache holds no definitions and no arena
    /// entries.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.schemas.is_empty() && self.variants.is_empty()
    }

    /// Looks up a structural schema by handle.
    pub fn schema(&self, handle: i32) -> Option<&StructuralSchema> {
        handle_index(handle).and_then(|idx| self.schemas.get(idx))
    }

    /// Looks up a variant record by handle.
    pub fn variant(&self, handle: i32) -> Option<&VariantRecord> {
        handle_index(handle).and_then(|idx| self.variants.get(idx))
    }

    /// First definition with the given tag name.
    pub fn definition(&self, tag_name: &str) -> Option<&DefinitionRecord> {
        self.definitions.iter().find(|d| d.tag_name == tag_name)
    }

    /// Returns the wrapped definition type for a cast-table entry, or the
    /// name itself when the type is not a single-field wrapper.
    pub fn cast_target<'a>(&'a self, type_name: &'a str) -> &'a str {
        self.cast_table
            .get(type_name)
            .map(String::as_str)
            .unwrap_or(type_name)
    }

    /// Named instances of a definition type, if a registry declares any.
    pub fn enumerated_values(&self, type_name: &str) -> Option<&[String]> {
        self.enumerated_value_catalog
            .get(type_name)
            .map(Vec::as_slice)
    }
}
