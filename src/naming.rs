//! Type name → GBNF rule identifier.
//!
//! GBNF identifiers are restricted to `[a-z0-9-]` here; type names are
//! CamelCase or snake_case, so `SendMessageToUser` becomes
//! `send-message-to-user` and `HTTPServer` becomes `http-server`.
use once_cell::sync::Lazy;
use regex::Regex;

static ACRONYM_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());
static WORD_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());
static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

pub const ROOT_RULE: &str = "root";
pub const MODELS_RULE: &str = "grammar-models";
pub const WS_RULE: &str = "ws";

/// Rule names the emitter defines on its own; a type may not map onto one.
pub fn is_reserved(rule: &str) -> bool {
    matches!(rule, ROOT_RULE | MODELS_RULE | WS_RULE)
        || crate::ir::Prim::from_name(rule).is_some()
}

/// Kebab-case rule name for a type name. `None` when nothing usable is left
/// (e.g. a name made only of punctuation or non-ASCII letters).
pub fn rule_name(type_name: &str) -> Option<String> {
    let s = ACRONYM_BOUNDARY.replace_all(type_name, "${1}-${2}");
    let s = WORD_BOUNDARY.replace_all(&s, "${1}-${2}");
    let s = s.to_ascii_lowercase();
    let s = NON_IDENT.replace_all(&s, "-");
    let s = s.trim_matches('-');
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Rule wrapping a root model in the outer `{ name, content }` object.
pub fn wrapper_rule_name(model_rule: &str) -> String {
    format!("{model_rule}-grammar-model")
}
