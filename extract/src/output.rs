//! Output formatting for extracted definitions.

use defschema_core::{DefinitionRecord, FieldKind, SchemaCache};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Yaml,
    Markdown,
    Table,
}

/// Formats the definitions of a cache in the requested output format.
pub fn format_definitions(cache: &SchemaCache, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&cache.definitions)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => serde_yaml::to_string(&cache.definitions)
            .map_err(|e| format!("YAML serialization failed: {e}")),
        OutputFormat::Markdown => Ok(definitions_to_markdown(&cache.definitions)),
        OutputFormat::Table => Ok(definitions_outline(&cache.definitions)),
    }
}

/// Plain outline: one `tag : parent` line per definition followed by one
/// `  -- field : type` line per field.
///
/// ```
/// use defschema_core::{DefinitionRecord, FieldDescriptor};
/// use defschema_extract::definitions_outline;
///
/// let def = DefinitionRecord {
///     tag_name: "ThingDef".into(),
///     parent_name: "BuildableDef".into(),
///     fields: vec![FieldDescriptor::scalar("label", "System.String")],
///     ..Default::default()
/// };
/// assert_eq!(
///     definitions_outline(&[def]),
///     "ThingDef : BuildableDef\n  -- label : System.String\n"
/// );
/// ```
pub fn definitions_outline(definitions: &[DefinitionRecord]) -> String {
    let mut out = String::new();
    for def in definitions {
        out.push_str(&format!("{} : {}\n", def.tag_name, def.parent_name));
        for field in &def.fields {
            out.push_str(&format!(
                "  -- {} : {}\n",
                field.name, field.declared_type_name
            ));
        }
    }
    out
}

fn kind_label(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Scalar => "scalar",
        FieldKind::Enumerated => "enum",
        FieldKind::NestedSimple => "nested",
        FieldKind::ListSimple => "list",
        FieldKind::ListPolymorphic => "polymorphic list",
        FieldKind::Metadata => "metadata",
        FieldKind::ExternalReference => "external",
    }
}

fn definitions_to_markdown(definitions: &[DefinitionRecord]) -> String {
    let mut out = String::new();
    out.push_str("# Definitions\n\n");

    for def in definitions {
        out.push_str(&format!("## {}\n\n", def.tag_name));
        out.push_str(&format!("**Type:** `{}`", def.full_name));
        if !def.parent_name.is_empty() {
            out.push_str(&format!("  **Parent:** `{}`", def.parent_name));
        }
        if def.is_abstract {
            out.push_str("  *(abstract)*");
        }
        out.push_str("\n\n");

        if def.fields.is_empty() {
            continue;
        }
        out.push_str("| Field | Type | Kind |\n");
        out.push_str("|-------|------|------|\n");
        for field in &def.fields {
            let mut kind = kind_label(field.kind).to_string();
            if field.must_localize {
                kind.push_str(", localized");
            }
            out.push_str(&format!(
                "| `{}` | `{}` | {kind} |\n",
                field.name, field.declared_type_name
            ));
        }
        out.push('\n');
    }

    out
}
