//! The extraction orchestrator.
//!
//! An [`ExtractionSession`] owns every piece of mutable state one extraction
//! pass needs: the introspection cache, both registries, the catalog and the
//! cast table. Nothing is global; dropping the session drops the pass.
//!
//! [`ExtractionSession::extract`] runs the stages in order:
//!
//! 1. resolve marker types (no definition base means an empty cache)
//! 2. derive the enumerated-value catalog from registry types
//! 3. discovery: breadth-first reachability from the seed types
//! 4. register every concrete member of each component family as a variant
//! 5. register every properties-named seed as a variant
//! 6. build one definition record per concrete definition type
//! 7. derive the cast table of single-definition wrapper types

use std::collections::{BTreeMap, HashSet, VecDeque};

use defschema_core::{
    DefinitionRecord, FieldDescriptor, NO_SCHEMA, SchemaCache, StructuralSchema, VariantRecord,
};
use tracing::{debug, info, warn};

use crate::arena::{RegistryHost, SchemaRegistry, VariantRegistry};
use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::introspect::IntrospectionCache;
use crate::scanner::{MemberInfo, MemberKind, ModuleScanner, TypeInfo, TypeRef};

/// State of one extraction pass over one module.
pub struct ExtractionSession<'m> {
    scanner: &'m ModuleScanner,
    config: ExtractionConfig,
    introspection: IntrospectionCache,
    schemas: SchemaRegistry,
    variants: VariantRegistry,
    component_members: HashSet<String>,
    catalog: BTreeMap<String, Vec<String>>,
    cast_table: BTreeMap<String, String>,
    definitions: Vec<DefinitionRecord>,
}

impl RegistryHost for ExtractionSession<'_> {
    fn schemas(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    fn variants(&mut self) -> &mut VariantRegistry {
        &mut self.variants
    }

    fn needs_schema(&self, full_name: &str) -> bool {
        if self.config.is_scalar_name(full_name) || self.is_banned_type(full_name) {
            return false;
        }
        // enums carry their values inline; unknown types cannot be described
        self.scanner.get(full_name).is_some_and(|t| !t.is_enum())
    }
}

impl<'m> ExtractionSession<'m> {
    pub fn new(scanner: &'m ModuleScanner, config: ExtractionConfig) -> Self {
        Self {
            scanner,
            config,
            introspection: IntrospectionCache::new(),
            schemas: SchemaRegistry::new(),
            variants: VariantRegistry::new(),
            component_members: HashSet::new(),
            catalog: BTreeMap::new(),
            cast_table: BTreeMap::new(),
            definitions: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn scanner(&self) -> &'m ModuleScanner {
        self.scanner
    }

    pub fn introspection(&self) -> &IntrospectionCache {
        &self.introspection
    }

    pub fn schema(&self, handle: i32) -> Option<&StructuralSchema> {
        usize::try_from(handle)
            .ok()
            .and_then(|idx| self.schemas.schemas().get(idx))
    }

    pub fn variant(&self, handle: i32) -> Option<&VariantRecord> {
        usize::try_from(handle)
            .ok()
            .and_then(|idx| self.variants.variants().get(idx))
    }

    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// Runs a full extraction pass and returns the finished cache.
    ///
    /// # Errors
    ///
    /// Propagates an introspection failure met while building a structural
    /// schema or flattening a definition. Variant failures are absorbed.
    pub fn extract(mut self) -> Result<SchemaCache> {
        if !self.identify_markers() {
            return Ok(SchemaCache::default());
        }
        self.build_catalog();
        let discovered = self.discover().len();
        self.register_component_variants();
        self.register_properties_variants();
        self.build_definitions()?;
        self.build_cast_table();

        info!(
            module = %self.scanner.module_name(),
            discovered,
            definitions = self.definitions.len(),
            schemas = self.schemas.len(),
            variants = self.variants.len(),
            catalog = self.catalog.len(),
            casts = self.cast_table.len(),
            "extraction complete"
        );
        Ok(self.into_cache())
    }

    fn into_cache(self) -> SchemaCache {
        SchemaCache {
            definitions: self.definitions,
            enumerated_value_catalog: self.catalog,
            schemas: self.schemas.into_schemas(),
            variants: self.variants.into_variants(),
            cast_table: self.cast_table,
        }
    }

    fn identify_markers(&mut self) -> bool {
        let config = &self.config;
        if self.scanner.get(&config.definition_base).is_none() {
            warn!(
                module = %self.scanner.module_name(),
                definition_base = %config.definition_base,
                "definition base type not found, nothing to extract"
            );
            return false;
        }
        debug!(
            registry_marker = self.is_marker_present(&config.definition_registry_marker),
            localization_handle = self.is_marker_present(&config.localization_handle_marker),
            must_localize = self.is_marker_present(&config.must_localize_marker),
            "resolved marker types"
        );

        let scanner = self.scanner;
        for family in self.component_families() {
            for member in scanner.all_subtypes(&family.full_name) {
                self.component_members.insert(member.clone());
            }
        }
        true
    }

    fn is_marker_present(&self, marker: &str) -> bool {
        self.scanner.get(marker).is_some()
            || self.scanner.types().iter().any(|t| {
                t.has_attribute(marker)
                    || t.base.as_deref() == Some(marker)
                    || t.members.iter().any(|m| m.has_attribute(marker))
            })
    }

    /// `true` for types excluded from the type graph.
    pub fn is_banned_type(&self, full_name: &str) -> bool {
        if self.config.is_banned(full_name) {
            return true;
        }
        self.scanner
            .get(full_name)
            .is_some_and(|t| t.generic_parameter || t.special_name || t.name.starts_with('<'))
    }

    fn is_component_family(&self, info: &TypeInfo) -> bool {
        let under_root = info
            .base
            .as_deref()
            .is_none_or(|base| base == self.config.universal_root);
        info.is_abstract
            && !info.is_interface()
            && under_root
            && info.name.ends_with(&self.config.component_suffix)
    }

    /// Component family bases, own or imported. An add-on subclasses the
    /// families of the modules it references.
    fn component_families(&self) -> Vec<&'m TypeInfo> {
        let scanner = self.scanner;
        scanner
            .types()
            .iter()
            .chain(scanner.imports())
            .filter(|t| self.is_component_family(t))
            .collect()
    }

    fn is_registry(&self, info: &TypeInfo) -> bool {
        let marker = &self.config.definition_registry_marker;
        info.has_attribute(marker) || info.base.as_deref() == Some(marker.as_str())
    }

    fn is_definition_type(&self, full_name: &str) -> bool {
        self.scanner
            .is_assignable_to(full_name, &self.config.definition_base)
    }

    fn build_catalog(&mut self) {
        let scanner = self.scanner;
        let registries: Vec<&TypeInfo> = scanner
            .types()
            .iter()
            .filter(|t| self.is_registry(t))
            .collect();
        for registry in registries {
            for member in &registry.members {
                if !member.is_static || member.member != MemberKind::Field {
                    continue;
                }
                if let Some(type_name) = member.ty.name() {
                    if self.is_definition_type(type_name) {
                        self.catalog
                            .entry(type_name.to_string())
                            .or_default()
                            .push(member.name.clone());
                    }
                }
            }
        }
        debug!(entries = self.catalog.len(), "built enumerated value catalog");
    }

    fn seeds(&self) -> Vec<String> {
        let mut seeds: Vec<String> = self
            .scanner
            .all_subtypes(&self.config.definition_base)
            .to_vec();
        for info in self.scanner.types() {
            if info.name.starts_with(&self.config.properties_prefix)
                && !seeds.contains(&info.full_name)
            {
                seeds.push(info.full_name.clone());
            }
        }
        seeds
    }

    /// Breadth-first reachability from the seed types.
    ///
    /// Builds an introspection record for every reached type and returns the
    /// visit order. Writes nothing to the schema arena.
    pub fn discover(&mut self) -> Vec<String> {
        let mut queue: VecDeque<String> = self.seeds().into();
        let mut visited: HashSet<String> = HashSet::new();
        let mut order = Vec::new();

        while let Some(type_name) = queue.pop_front() {
            if self.is_banned_type(&type_name) || !visited.insert(type_name.clone()) {
                continue;
            }
            order.push(type_name.clone());

            let record = match self
                .introspection
                .get_or_build(self.scanner, &self.config, &type_name)
            {
                Ok(record) => record,
                Err(_) => continue,
            };

            for referenced in &record.referenced_types {
                let Some(next) = referenced.unwrap_list().name() else {
                    continue;
                };
                if visited.contains(next)
                    || self.config.is_scalar_name(next)
                    || self.is_banned_type(next)
                    || self.scanner.get(next).is_none()
                {
                    continue;
                }
                queue.push_back(next.to_string());
            }
        }

        debug!(reached = order.len(), "discovery finished");
        order
    }

    fn register_component_variants(&mut self) {
        let scanner = self.scanner;
        for family in self.component_families() {
            for member in scanner.all_subtypes(&family.full_name) {
                if self.is_variant_candidate(member) {
                    self.register_variant(member);
                }
            }
        }
    }

    fn register_properties_variants(&mut self) {
        let scanner = self.scanner;
        for info in scanner.types() {
            if info.name.starts_with(&self.config.properties_prefix)
                && !info.is_interface()
                && !self.is_banned_type(&info.full_name)
            {
                self.register_variant(&info.full_name);
            }
        }
    }

    fn is_variant_candidate(&self, full_name: &str) -> bool {
        self.scanner
            .get(full_name)
            .is_some_and(|t| t.is_concrete() && !self.is_banned_type(full_name))
    }

    /// Registers `full_name` as a polymorphic variant and returns its handle.
    pub fn register_variant(&mut self, full_name: &str) -> i32 {
        let scanner = self.scanner;
        let Some(info) = scanner.get(full_name) else {
            return NO_SCHEMA;
        };
        let special = self.component_members.contains(full_name);
        VariantRegistry::get_or_create(self, full_name, &info.name, special, |session| {
            session.flatten_fields(full_name)
        })
    }

    /// Returns the structural schema handle for `full_name`, building the
    /// schema on first use. Scalars, enums, banned and unknown types get
    /// [`NO_SCHEMA`].
    pub fn schema_for_type(&mut self, full_name: &str) -> Result<i32> {
        SchemaRegistry::get_or_create(self, full_name, |session| {
            session.flatten_fields(full_name)
        })
    }

    /// Flattens the fields of `full_name` across its inheritance chain.
    ///
    /// Walks from the type up to (excluding) the universal root taking each
    /// level's own fields; a name seen at a more derived level shadows the
    /// same name further up. The walk stops at a base type the module does
    /// not know.
    pub fn flatten_fields(&mut self, full_name: &str) -> Result<Vec<FieldDescriptor>> {
        let scanner = self.scanner;
        let mut seen: HashSet<String> = HashSet::new();
        let mut fields = Vec::new();
        let mut chain: HashSet<String> = HashSet::new();

        let mut current = Some(full_name.to_string());
        while let Some(level) = current {
            if level == self.config.universal_root || !chain.insert(level.clone()) {
                break;
            }
            let Some(info) = scanner.get(&level) else {
                break;
            };
            let record = self
                .introspection
                .get_or_build(scanner, &self.config, &level)?;
            for member in &record.fields {
                if seen.insert(member.name.clone()) {
                    fields.push(self.classify(member)?);
                }
            }
            current = info.base.clone();
        }
        Ok(fields)
    }

    /// Classifies one member into a field descriptor.
    pub fn classify(&mut self, member: &MemberInfo) -> Result<FieldDescriptor> {
        let field = self.classify_type(&member.name, &member.ty)?;
        Ok(field.with_localization(
            member.has_attribute(&self.config.localization_handle_marker),
            member.has_attribute(&self.config.must_localize_marker),
        ))
    }

    fn classify_type(&mut self, name: &str, ty: &TypeRef) -> Result<FieldDescriptor> {
        match ty {
            TypeRef::List { list } => {
                let display = format!("List<{list}>");
                let Some(item) = list.name() else {
                    // nested sequences have no item schema
                    return Ok(FieldDescriptor::list(name, &display, NO_SCHEMA));
                };

                let variant_ids = self.is_polymorphic(item).then(|| self.variants_of(item));
                let schema_id = if self.config.is_scalar_name(item) {
                    NO_SCHEMA
                } else {
                    self.schema_for_type(item)?
                };
                Ok(match variant_ids {
                    Some(ids) => FieldDescriptor::polymorphic_list(name, &display, schema_id, ids),
                    None => FieldDescriptor::list(name, &display, schema_id),
                })
            }
            TypeRef::Named(type_name) => {
                if self.config.is_scalar_name(type_name) {
                    return Ok(FieldDescriptor::scalar(name, type_name));
                }
                let scanner = self.scanner;
                match scanner.get(type_name) {
                    Some(info) if info.is_enum() => Ok(FieldDescriptor::enumerated(
                        name,
                        &info.name,
                        info.enum_values.clone(),
                    )),
                    None if !self.is_banned_type(type_name) => {
                        Ok(FieldDescriptor::external(name, type_name))
                    }
                    _ => {
                        let schema_id = self.schema_for_type(type_name)?;
                        Ok(FieldDescriptor::nested(name, type_name, schema_id))
                    }
                }
            }
        }
    }

    fn is_polymorphic(&self, item: &str) -> bool {
        self.scanner.has_subtypes(item)
            || self
                .scanner
                .get(item)
                .is_some_and(|t| t.is_abstract || t.is_interface())
    }

    /// Variant handles for every concrete subtype of `item`, in subtype
    /// discovery order.
    fn variants_of(&mut self, item: &str) -> Vec<i32> {
        let scanner = self.scanner;
        let concrete: Vec<&String> = scanner
            .all_subtypes(item)
            .iter()
            .filter(|sub| self.is_variant_candidate(sub))
            .collect();
        concrete
            .into_iter()
            .map(|sub| self.register_variant(sub))
            .collect()
    }

    fn build_definitions(&mut self) -> Result<()> {
        let scanner = self.scanner;
        let mut records = Vec::new();
        for full_name in scanner.all_subtypes(&self.config.definition_base) {
            let Some(info) = scanner.get(full_name) else {
                continue;
            };
            if info.is_interface() || self.is_banned_type(full_name) {
                continue;
            }
            if info.is_abstract && !self.config.include_abstract_definitions {
                continue;
            }
            if self.introspection.cached(full_name).is_none() {
                debug!(type_name = %full_name, "no introspection record, skipping definition");
                continue;
            }

            let fields = self.flatten_fields(full_name)?;
            let tag_name = if self.config.keep_namespace_prefix {
                info.full_name.clone()
            } else {
                info.name.clone()
            };
            let parent_name = info
                .base
                .as_deref()
                .map(|base| base.rsplit('.').next().unwrap_or(base).to_string())
                .unwrap_or_default();
            records.push(DefinitionRecord {
                tag_name,
                name: info.name.clone(),
                parent_name,
                is_abstract: info.is_abstract,
                ignore_validation_errors: false,
                full_name: info.full_name.clone(),
                fields,
            });
        }
        records.sort_by(|a, b| a.tag_name.cmp(&b.tag_name));
        self.definitions = records;
        Ok(())
    }

    fn build_cast_table(&mut self) {
        let scanner = self.scanner;
        for info in scanner.types() {
            if info.is_enum()
                || info.is_interface()
                || self.is_banned_type(&info.full_name)
                || self.config.is_scalar_name(&info.full_name)
            {
                continue;
            }
            let Ok(record) = self
                .introspection
                .get_or_build(scanner, &self.config, &info.full_name)
            else {
                continue;
            };
            let wrapped: Vec<&str> = record
                .fields
                .iter()
                .filter_map(|f| f.ty.name())
                .filter(|t| self.is_definition_type(t))
                .collect();
            if let [only] = wrapped.as_slice() {
                self.cast_table
                    .insert(info.full_name.clone(), only.to_string());
            }
        }
    }
}
