//! Memoized per-type member introspection.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::config::ExtractionConfig;
use crate::error::TypeIntrospectionError;
use crate::scanner::{MemberInfo, MemberKind, ModuleScanner, TypeInfo, TypeRef};

/// Own instance members of one type, filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub full_name: String,
    pub short_name: String,
    /// Own (non-inherited) instance fields and writable instance
    /// properties, in declaration order.
    pub fields: Vec<MemberInfo>,
    /// Distinct declared types of `fields`, in first-seen order.
    pub referenced_types: Vec<TypeRef>,
}

impl TypeRecord {
    fn build(info: &TypeInfo) -> Self {
        let fields: Vec<MemberInfo> = info
            .members
            .iter()
            .filter(|m| is_instance_member(m))
            .cloned()
            .collect();

        let mut referenced_types: Vec<TypeRef> = Vec::new();
        for field in &fields {
            if !referenced_types.contains(&field.ty) {
                referenced_types.push(field.ty.clone());
            }
        }

        Self {
            full_name: info.full_name.clone(),
            short_name: info.name.clone(),
            fields,
            referenced_types,
        }
    }
}

fn is_instance_member(member: &MemberInfo) -> bool {
    if member.is_static || member.compiler_generated {
        return false;
    }
    // backing fields look like `<Label>k__BackingField`
    if member.name.contains('<') || member.name.contains('>') {
        return false;
    }
    member.member == MemberKind::Field || member.writable
}

/// Lazily built [`TypeRecord`]s keyed by full type name.
///
/// Repeated lookups return the same `Rc`; failures are memoized too.
#[derive(Debug, Default)]
pub struct IntrospectionCache {
    records: HashMap<String, Result<Rc<TypeRecord>, TypeIntrospectionError>>,
}

impl IntrospectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `full_name`, building it on first use.
    ///
    /// # Errors
    ///
    /// Fails when the type is not declared by the module (or its imports) or
    /// the dumper flagged it with a load error.
    pub fn get_or_build(
        &mut self,
        scanner: &ModuleScanner,
        config: &ExtractionConfig,
        full_name: &str,
    ) -> Result<Rc<TypeRecord>, TypeIntrospectionError> {
        if let Some(memo) = self.records.get(full_name) {
            return memo.clone();
        }

        let built = match scanner.get(full_name) {
            None => Err(TypeIntrospectionError::new(full_name, "type is not declared in module")),
            Some(info) => match &info.load_error {
                Some(reason) => Err(TypeIntrospectionError::new(full_name, reason.as_str())),
                // banned types contribute no members
                None if config.is_banned(full_name) => Ok(Rc::new(TypeRecord {
                    full_name: info.full_name.clone(),
                    short_name: info.name.clone(),
                    fields: Vec::new(),
                    referenced_types: Vec::new(),
                })),
                None => Ok(Rc::new(TypeRecord::build(info))),
            },
        };
        if let Err(err) = &built {
            debug!(type_name = full_name, error = %err, "introspection failed");
        }

        self.records.insert(full_name.to_string(), built.clone());
        built
    }

    /// Returns an already built record without building one.
    pub fn cached(&self, full_name: &str) -> Option<Rc<TypeRecord>> {
        self.records.get(full_name)?.as_ref().ok().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
