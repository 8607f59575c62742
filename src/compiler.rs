//! Compiler facade: type graph + roots → grammar text and documentation.
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::docs::render_documentation;
use crate::error::{CompileError, GrammarError};
use crate::grammar::Grammar;
use crate::grammar::emit::emit_grammar;
use crate::introspect::introspect;
use crate::ir::{Ty, TypeGraph};
use crate::naming::ROOT_RULE;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Key holding the chosen model's name when roots are wrapped, e.g. `"function"`.
    pub outer_object_name: Option<String>,
    /// Key holding the chosen model's object, e.g. `"function_parameters"`.
    pub outer_object_content: Option<String>,
    /// Heading for each record block in the documentation.
    pub model_prefix: String,
    /// Heading for each record's field list in the documentation.
    pub fields_prefix: String,
    /// Include field description lines in the documentation.
    pub field_descriptions: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            outer_object_name: None,
            outer_object_content: None,
            model_prefix: "Output Model".to_string(),
            fields_prefix: "Output Fields".to_string(),
            field_descriptions: true,
        }
    }
}

impl CompileOptions {
    pub fn with_outer_object(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.outer_object_name = Some(name.into());
        self.outer_object_content = Some(content.into());
        self
    }

    pub fn with_prefixes(mut self, model: impl Into<String>, fields: impl Into<String>) -> Self {
        self.model_prefix = model.into();
        self.fields_prefix = fields.into();
        self
    }

    /// `(name key, content key)` when wrapper mode is on. Setting only one of
    /// the two keys is an error rather than a silent fallback.
    pub fn outer_wrapper(&self) -> Result<Option<(&str, &str)>, CompileError> {
        match (&self.outer_object_name, &self.outer_object_content) {
            (Some(name), Some(content)) => Ok(Some((name.as_str(), content.as_str()))),
            (None, None) => Ok(None),
            _ => Err(CompileError::IncompleteOuterWrapper),
        }
    }
}

/// Both artifacts of one compilation. Immutable once built.
#[derive(Debug, Clone)]
pub struct Compiled {
    grammar: String,
    documentation: String,
    rules: Grammar,
}

impl Compiled {
    /// GBNF text, one rule per line.
    pub fn grammar(&self) -> &str { &self.grammar }

    pub fn documentation(&self) -> &str { &self.documentation }

    /// The grammar before rendering.
    pub fn rules(&self) -> &Grammar { &self.rules }

    /// Whether `text` is a complete derivation of the `root` rule.
    pub fn accepts(&self, text: &str) -> Result<bool, GrammarError> {
        self.rules.accepts(text)
    }

    pub fn into_parts(self) -> (String, String) {
        (self.grammar, self.documentation)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

/// Introspect once, then emit the grammar and the documentation from that
/// single result. Either both artifacts come back or an error does.
pub fn compile(
    graph: &TypeGraph,
    roots: &[Ty],
    options: &CompileOptions,
) -> Result<Compiled, CompileError> {
    options.outer_wrapper()?;
    let intro = introspect(graph, roots)?;
    let rules = emit_grammar(graph, &intro, options)?;
    rules.validate(ROOT_RULE)?;
    let documentation = render_documentation(graph, &intro, options);
    let grammar = rules.to_string();
    info!(
        types = intro.len(),
        rules = rules.rules.len(),
        grammar_bytes = grammar.len(),
        "compiled"
    );
    Ok(Compiled { grammar, documentation, rules })
}

// ------------------------------- Tests ------------------------------------ //
