//! Module scanning.
//!
//! A compiled module is consumed through a *type manifest*: a JSON or YAML
//! dump of every type the module declares, produced by an external metadata
//! dumper. [`ModuleScanner`] loads that manifest and builds the subtype
//! index every later stage relies on.
//!
//! Types listed under `imports` come from referenced modules (for an add-on,
//! the base module's `Verse.Def`). They can be looked up and walked as base
//! types but never seed discovery, variants or definitions.
//!
//! # Example JSON
//!
//! ```json
//! {
//!   "module": "Assembly-CSharp",
//!   "types": [
//!     { "full_name": "Verse.ThingDef", "base": "Verse.Def",
//!       "members": [ { "name": "comps", "type": { "list": "Verse.CompProperties" } } ] }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};

/// Reference to a member's declared type.
///
/// # Examples
///
/// ```
/// use defschema_extract::TypeRef;
///
/// let r: TypeRef = serde_json::from_str(r#"{ "list": "Verse.CompProperties" }"#).unwrap();
/// assert_eq!(r, TypeRef::list_of("Verse.CompProperties"));
/// assert_eq!(r.to_string(), "List<Verse.CompProperties>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeRef {
    /// A type named by its full name.
    Named(String),
    /// The ordered-sequence wrapper `List<T>`.
    List { list: Box<TypeRef> },
}

impl TypeRef {
    pub fn named(full_name: &str) -> Self {
        Self::Named(full_name.to_string())
    }

    pub fn list_of(item_full_name: &str) -> Self {
        Self::List {
            list: Box::new(Self::named(item_full_name)),
        }
    }

    /// The full name for a plain reference.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::List { .. } => None,
        }
    }

    /// Unwraps one level of the sequence wrapper.
    pub fn unwrap_list(&self) -> &TypeRef {
        match self {
            Self::List { list } => list,
            named => named,
        }
    }
}

impl From<&str> for TypeRef {
    fn from(full_name: &str) -> Self {
        Self::named(full_name)
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List { list } => write!(f, "List<{list}>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    #[default]
    Class,
    Struct,
    Interface,
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    #[default]
    Field,
    Property,
}

fn default_true() -> bool {
    true
}

/// One field or property as dumped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default)]
    pub member: MemberKind,
    #[serde(default)]
    pub is_static: bool,
    /// Only meaningful for properties.
    #[serde(default = "default_true")]
    pub writable: bool,
    #[serde(default)]
    pub compiler_generated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
}

impl MemberInfo {
    /// Instance field.
    pub fn field(name: &str, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.into(),
            member: MemberKind::Field,
            is_static: false,
            writable: true,
            compiler_generated: false,
            attributes: Vec::new(),
        }
    }

    /// Instance property.
    pub fn property(name: &str, ty: impl Into<TypeRef>, writable: bool) -> Self {
        Self {
            member: MemberKind::Property,
            writable,
            ..Self::field(name, ty)
        }
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attributes.push(attribute.to_string());
        self
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

/// One declared type as dumped.
///
/// Built either by deserializing a manifest or with the builder methods:
///
/// ```
/// use defschema_extract::{TypeInfo, TypeRef};
///
/// let comp = TypeInfo::class("Mod.Comp").abstract_type();
/// let item = TypeInfo::class("Mod.Item")
///     .with_base("Verse.Def")
///     .field("comps", TypeRef::list_of("Mod.Comp"));
/// assert_eq!(item.name, "Item");
/// assert!(comp.is_abstract);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub full_name: String,
    /// Short name; derived from `full_name` when empty.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Full name of the base type; absent for root-level types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub special_name: bool,
    #[serde(default)]
    pub generic_parameter: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<String>,
    /// Set by the dumper when it could not read this type's members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberInfo>,
}

impl TypeInfo {
    fn with_kind(full_name: &str, kind: TypeKind) -> Self {
        let mut info = Self {
            full_name: full_name.to_string(),
            name: String::new(),
            namespace: None,
            base: None,
            kind,
            is_abstract: false,
            special_name: false,
            generic_parameter: false,
            enum_values: Vec::new(),
            attributes: Vec::new(),
            load_error: None,
            members: Vec::new(),
        };
        info.normalize();
        info
    }

    pub fn class(full_name: &str) -> Self {
        Self::with_kind(full_name, TypeKind::Class)
    }

    pub fn structure(full_name: &str) -> Self {
        Self::with_kind(full_name, TypeKind::Struct)
    }

    pub fn interface(full_name: &str) -> Self {
        let mut info = Self::with_kind(full_name, TypeKind::Interface);
        info.is_abstract = true;
        info
    }

    pub fn enumeration(full_name: &str, values: &[&str]) -> Self {
        let mut info = Self::with_kind(full_name, TypeKind::Enum);
        info.enum_values = values.iter().map(|v| v.to_string()).collect();
        info
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attributes.push(attribute.to_string());
        self
    }

    pub fn with_load_error(mut self, reason: &str) -> Self {
        self.load_error = Some(reason.to_string());
        self
    }

    /// Adds an instance field.
    pub fn field(self, name: &str, ty: impl Into<TypeRef>) -> Self {
        self.member(MemberInfo::field(name, ty))
    }

    /// Adds a static field.
    pub fn static_field(self, name: &str, ty: impl Into<TypeRef>) -> Self {
        self.member(MemberInfo {
            is_static: true,
            ..MemberInfo::field(name, ty)
        })
    }

    pub fn member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }

    /// Fills in `name` and `namespace` from `full_name` when missing.
    fn normalize(&mut self) {
        let (namespace, short) = match self.full_name.rsplit_once('.') {
            Some((ns, short)) => (Some(ns), short),
            None => (None, self.full_name.as_str()),
        };
        if self.name.is_empty() {
            self.name = short.rsplit('+').next().unwrap_or(short).to_string();
        }
        if self.namespace.is_none() {
            self.namespace = namespace.map(str::to_string);
        }
    }

    pub fn is_enum(&self) -> bool {
        self.kind == TypeKind::Enum
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Neither abstract nor an interface.
    pub fn is_concrete(&self) -> bool {
        !self.is_abstract && !self.is_interface()
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

/// The on-disk manifest of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module name, informational.
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub types: Vec<TypeInfo>,
    /// Types from referenced modules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<TypeInfo>,
}

impl ModuleManifest {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, info: TypeInfo) -> Self {
        self.types.push(info);
        self
    }

    pub fn with_import(mut self, info: TypeInfo) -> Self {
        self.imports.push(info);
        self
    }

    /// Writes the manifest as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Own(usize),
    Import(usize),
}

/// A loaded module with its subtype index.
#[derive(Debug)]
pub struct ModuleScanner {
    path: PathBuf,
    module: String,
    types: Vec<TypeInfo>,
    imports: Vec<TypeInfo>,
    by_name: HashMap<String, Slot>,
    direct: HashMap<String, Vec<String>>,
    transitive: HashMap<String, Vec<String>>,
}

impl ModuleScanner {
    /// Loads a module manifest. `.yml`/`.yaml` files are read as YAML,
    /// everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::ModuleLoad`] if the file is missing,
    /// unreadable or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ExtractError::module_load(path, "file not found"));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ExtractError::module_load(path, e))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml" | "yaml")
        );
        let manifest: ModuleManifest = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| ExtractError::module_load(path, e))?
        } else {
            serde_json::from_str(&raw).map_err(|e| ExtractError::module_load(path, e))?
        };
        Ok(Self::from_manifest(path, manifest))
    }

    /// Builds the scanner for an in-memory manifest.
    pub fn from_manifest(path: impl Into<PathBuf>, manifest: ModuleManifest) -> Self {
        let ModuleManifest {
            module,
            mut types,
            mut imports,
        } = manifest;
        types.iter_mut().for_each(TypeInfo::normalize);
        imports.iter_mut().for_each(TypeInfo::normalize);

        let mut by_name = HashMap::new();
        for (idx, info) in imports.iter().enumerate() {
            by_name.insert(info.full_name.clone(), Slot::Import(idx));
        }
        for (idx, info) in types.iter().enumerate() {
            if let Some(Slot::Own(_)) = by_name.insert(info.full_name.clone(), Slot::Own(idx)) {
                warn!(type_name = %info.full_name, "type declared twice in module, later entry wins");
            }
        }

        // Only the module's own types count as subtypes.
        let mut direct: HashMap<String, Vec<String>> = HashMap::new();
        for info in &types {
            if let Some(base) = &info.base {
                direct
                    .entry(base.clone())
                    .or_default()
                    .push(info.full_name.clone());
            }
        }

        let mut transitive = HashMap::new();
        let mut visiting = HashSet::new();
        for name in direct.keys() {
            expand_subtypes(name, &direct, &mut transitive, &mut visiting);
        }

        debug!(
            module = %module,
            types = types.len(),
            imports = imports.len(),
            "indexed module"
        );

        Self {
            path: path.into(),
            module,
            types,
            imports,
            by_name,
            direct,
            transitive,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// The module's own types, in manifest order.
    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    /// Types imported from referenced modules.
    pub fn imports(&self) -> &[TypeInfo] {
        &self.imports
    }

    /// Looks up an own or imported type.
    pub fn get(&self, full_name: &str) -> Option<&TypeInfo> {
        match self.by_name.get(full_name)? {
            Slot::Own(idx) => self.types.get(*idx),
            Slot::Import(idx) => self.imports.get(*idx),
        }
    }

    /// `true` when the type is declared by this module (not imported).
    pub fn is_own(&self, full_name: &str) -> bool {
        matches!(self.by_name.get(full_name), Some(Slot::Own(_)))
    }

    pub fn has_subtypes(&self, full_name: &str) -> bool {
        self.direct.contains_key(full_name)
    }

    /// Direct subtypes, in manifest order.
    pub fn subtypes_of(&self, full_name: &str) -> &[String] {
        self.direct.get(full_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transitive subtypes: direct subtypes first, then the subtypes of each
    /// of those in turn.
    pub fn all_subtypes(&self, full_name: &str) -> &[String] {
        self.transitive
            .get(full_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `true` when `full_name` is `ancestor` or derives from it.
    pub fn is_assignable_to(&self, full_name: &str, ancestor: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = full_name;
        loop {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                return false;
            }
            match self.get(current).and_then(|t| t.base.as_deref()) {
                Some(base) => current = base,
                None => return false,
            }
        }
    }
}

fn expand_subtypes(
    name: &str,
    direct: &HashMap<String, Vec<String>>,
    memo: &mut HashMap<String, Vec<String>>,
    visiting: &mut HashSet<String>,
) -> Vec<String> {
    if let Some(done) = memo.get(name) {
        return done.clone();
    }
    if !visiting.insert(name.to_string()) {
        warn!(type_name = name, "inheritance cycle in manifest");
        return Vec::new();
    }

    let children = direct.get(name).cloned().unwrap_or_default();
    let mut all = children.clone();
    for child in &children {
        all.extend(expand_subtypes(child, direct, memo, visiting));
    }

    visiting.remove(name);
    memo.insert(name.to_string(), all.clone());
    all
}
