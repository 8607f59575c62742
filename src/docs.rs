//! Prompt documentation for the types a grammar constrains.
//!
//! Walks the same `Introspection` as the grammar emitter: one block per named
//! type, in emission order, so a type described here is exactly a type the
//! grammar has a rule for.
use tracing::debug;

use crate::compiler::CompileOptions;
use crate::introspect::Introspection;
use crate::ir::{EnumType, Field, NamedType, RecordType, Ty, TypeGraph, TypeId};

pub fn render_documentation(
    graph: &TypeGraph,
    intro: &Introspection,
    options: &CompileOptions,
) -> String {
    let docs = Docs { graph, intro, options };
    let blocks: Vec<String> = intro
        .named()
        .filter_map(|(id, _)| match graph.get(id)? {
            NamedType::Record(r) => Some(docs.record_block(id, r)),
            NamedType::Enum(e) => Some(docs.enum_block(e)),
            NamedType::Declared { .. } => None,
        })
        .collect();
    debug!(blocks = blocks.len(), "documentation rendered");
    blocks.join("\n")
}

/// Readable form of a type expression: `list of string`, `optional Category`,
/// `string or float`.
pub fn type_prose(graph: &TypeGraph, intro: &Introspection, ty: &Ty) -> String {
    match ty {
        Ty::Prim(p) => p.name().to_string(),
        Ty::Named(id) => {
            let id = intro.canonical(*id);
            graph.name(id).map(str::to_string).unwrap_or_else(|| id.to_string())
        }
        Ty::List(item) => format!("list of {}", nested_prose(graph, intro, item)),
        Ty::Optional(item) => format!("optional {}", nested_prose(graph, intro, item)),
        Ty::Union(vs) => vs
            .iter()
            .map(|v| nested_prose(graph, intro, v))
            .collect::<Vec<_>>()
            .join(" or "),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn nested_prose(graph: &TypeGraph, intro: &Introspection, ty: &Ty) -> String {
    let text = type_prose(graph, intro, ty);
    if matches!(ty, Ty::Union(_)) { format!("({text})") } else { text }
}

struct Docs<'a> {
    graph: &'a TypeGraph,
    intro: &'a Introspection,
    options: &'a CompileOptions,
}

impl Docs<'_> {
    fn record_block(&self, id: TypeId, record: &RecordType) -> String {
        let mut out = format!("{}: {}\n", self.options.model_prefix, record.name);
        if let Some(description) = &record.description {
            push_description(&mut out, 2, description);
        }
        if self.intro.is_recursive(id) {
            out.push_str(&format!("  Recursive: a {0} may contain further {0} values.\n", record.name));
        }
        out.push_str(&format!("  {}:\n", self.options.fields_prefix));
        if record.fields.is_empty() {
            out.push_str("    (none)\n");
        }
        for field in &record.fields {
            self.field_lines(&mut out, field);
        }
        out
    }

    fn field_lines(&self, out: &mut String, field: &Field) {
        let presence = if field.required { "required" } else { "optional" };
        let prose = type_prose(self.graph, self.intro, &field.ty);
        out.push_str(&format!("    {} ({prose}, {presence})\n", field.name));
        if self.options.field_descriptions {
            push_description(out, 6, &field.description);
        }
        for id in field.ty.named_refs() {
            match self.graph.get(self.intro.canonical(id)) {
                Some(NamedType::Enum(e)) => {
                    out.push_str(&format!("      Allowed values ({}): {}\n", e.name, quoted_values(e)));
                }
                Some(NamedType::Record(r)) => {
                    out.push_str(&format!("      See: {}\n", r.name));
                }
                Some(NamedType::Declared { .. }) | None => {}
            }
        }
    }

    fn enum_block(&self, e: &EnumType) -> String {
        let mut out = format!("Enum: {}\n", e.name);
        if let Some(description) = &e.description {
            push_description(&mut out, 2, description);
        }
        out.push_str(&format!("  Values: {}\n", quoted_values(e)));
        out
    }
}

fn quoted_values(e: &EnumType) -> String {
    e.values
        .iter()
        .map(|v| serde_json::Value::String(v.clone()).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `Description: ...` at `indent`; later lines continue two spaces deeper.
/// Surrounding blank lines and per-line indentation (docstring style) are dropped.
fn push_description(out: &mut String, indent: usize, description: &str) {
    let lines: Vec<&str> = description.lines().map(str::trim).collect();
    let Some(start) = lines.iter().position(|l| !l.is_empty()) else {
        return;
    };
    let end = lines.iter().rposition(|l| !l.is_empty()).unwrap_or(start);
    let pad = " ".repeat(indent);
    out.push_str(&format!("{pad}Description: {}\n", lines[start]));
    for line in &lines[start + 1..=end] {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("{pad}  {line}\n"));
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
