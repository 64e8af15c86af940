//! Live [`TypeDescriptor`] backed by an extraction session.

use defschema_core::{FieldDescriptor, StructuralSchema, TypeDescriptor, VariantRecord};
use tracing::debug;

use crate::session::ExtractionSession;

/// Describes types straight from a loaded module, classifying on demand.
///
/// Schemas and variants created while describing accumulate in the wrapped
/// session, so handles in returned fields stay resolvable.
pub struct LiveDescriptor<'m> {
    session: ExtractionSession<'m>,
}

impl<'m> LiveDescriptor<'m> {
    pub fn new(session: ExtractionSession<'m>) -> Self {
        Self { session }
    }

    pub fn into_session(self) -> ExtractionSession<'m> {
        self.session
    }
}

impl TypeDescriptor for LiveDescriptor<'_> {
    fn describe(&mut self, full_name: &str) -> Option<Vec<FieldDescriptor>> {
        self.session.scanner().get(full_name)?;
        match self.session.flatten_fields(full_name) {
            Ok(fields) => Some(fields),
            Err(err) => {
                debug!(type_name = full_name, error = %err, "cannot describe type");
                None
            }
        }
    }

    fn schema(&self, handle: i32) -> Option<&StructuralSchema> {
        self.session.schema(handle)
    }

    fn variant(&self, handle: i32) -> Option<&VariantRecord> {
        self.session.variant(handle)
    }
}

#[cfg(test)]
mod tests {
    use defschema_core::render_outline;

    use super::*;
    use crate::ExtractionConfig;
    use crate::scanner::{ModuleManifest, ModuleScanner, TypeInfo, TypeRef};

    #[test]
    fn test_live_outline_follows_cycles() {
        let manifest = ModuleManifest::new("Graph").with_type(
            TypeInfo::class("Mod.Node")
                .field("child", "Mod.Node")
                .field("label", "System.String")
                .field("siblings", TypeRef::list_of("Mod.Node")),
        );
        let scanner = ModuleScanner::from_manifest("graph.json", manifest);
        let session = ExtractionSession::new(&scanner, ExtractionConfig::default());
        let mut descriptor = LiveDescriptor::new(session);

        let outline = render_outline(&mut descriptor, "Mod.Node", 5).unwrap();
        assert!(outline.starts_with("Mod.Node\n  -- child : Mod.Node\n"));
        assert!(outline.contains("(recursive)"));
        assert!(descriptor.describe("Mod.Missing").is_none());

        let session = descriptor.into_session();
        assert_eq!(session.schema_count(), 1);
    }
}
