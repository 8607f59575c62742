//! GBNF grammar model.
//!
//! A `Grammar` is an ordered list of `name ::= body` rules. It renders to the
//! textual notation consumed by llama.cpp style constrained decoders, can be
//! read back from that notation (`parse`), and can recognize input text
//! (`check`) so emitted grammars are testable without a decoding engine.
pub mod check;
pub mod emit;
pub mod parse;

use std::collections::HashSet;
use std::fmt;

use crate::error::GrammarError;

pub use check::Recognizer;
pub use parse::parse_grammar;

// ------------------------------- AST -------------------------------------- //

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Exact text.
    Literal(String),
    /// One character from (or outside) a set.
    Class(CharClass),
    /// Any single character (`.`).
    Any,
    /// Reference to another rule.
    Ref(String),
    Seq(Vec<Expr>),
    Alt(Vec<Expr>),
    Repeat(Box<Expr>, Repeat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Optional,   // ?
    ZeroOrMore, // *
    OneOrMore,  // +
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    pub negated: bool,
    pub items: Vec<ClassItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassItem {
    Char(char),
    Range(char, char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub body: Expr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grammar {
    pub rules: Vec<Rule>,
}

// ----------------------------- Builders ----------------------------------- //

impl Expr {
    pub fn lit(text: impl Into<String>) -> Self { Expr::Literal(text.into()) }

    pub fn rule(name: impl Into<String>) -> Self { Expr::Ref(name.into()) }

    /// Sequence; nested sequences are flattened and a single item is returned as-is.
    pub fn seq(items: impl IntoIterator<Item = Expr>) -> Self {
        let mut out = Vec::new();
        for item in items {
            match item {
                Expr::Seq(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        if out.len() == 1 { out.remove(0) } else { Expr::Seq(out) }
    }

    /// Alternation; nested alternations are flattened and a single item is returned as-is.
    pub fn alt(items: impl IntoIterator<Item = Expr>) -> Self {
        let mut out = Vec::new();
        for item in items {
            match item {
                Expr::Alt(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        if out.len() == 1 { out.remove(0) } else { Expr::Alt(out) }
    }

    pub fn opt(self) -> Self { Expr::Repeat(Box::new(self), Repeat::Optional) }

    pub fn star(self) -> Self { Expr::Repeat(Box::new(self), Repeat::ZeroOrMore) }

    pub fn plus(self) -> Self { Expr::Repeat(Box::new(self), Repeat::OneOrMore) }

    pub fn is_empty_seq(&self) -> bool {
        matches!(self, Expr::Seq(items) if items.is_empty())
    }

    /// Rule names referenced from this expression, in order of appearance.
    pub fn refs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Ref(name) => out.push(name),
            Expr::Seq(items) | Expr::Alt(items) => items.iter().for_each(|e| e.refs(out)),
            Expr::Repeat(inner, _) => inner.refs(out),
            Expr::Literal(_) | Expr::Class(_) | Expr::Any => {}
        }
    }
}

impl CharClass {
    pub fn of(items: impl IntoIterator<Item = ClassItem>) -> Self {
        Self { negated: false, items: items.into_iter().collect() }
    }

    pub fn none_of(items: impl IntoIterator<Item = ClassItem>) -> Self {
        Self { negated: true, items: items.into_iter().collect() }
    }

    pub fn matches(&self, c: char) -> bool {
        let hit = self.items.iter().any(|item| match *item {
            ClassItem::Char(x) => x == c,
            ClassItem::Range(lo, hi) => lo <= c && c <= hi,
        });
        hit != self.negated
    }
}

impl From<CharClass> for Expr {
    fn from(class: CharClass) -> Self { Expr::Class(class) }
}

impl Grammar {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, name: impl Into<String>, body: Expr) {
        self.rules.push(Rule { name: name.into(), body });
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Self-containment: `root` exists, no rule is defined twice, and every
    /// referenced rule is defined.
    pub fn validate(&self, root: &str) -> Result<(), GrammarError> {
        let mut defined = HashSet::new();
        for rule in &self.rules {
            if !defined.insert(rule.name.as_str()) {
                return Err(GrammarError::DuplicateRule { rule: rule.name.clone() });
            }
        }
        if !defined.contains(root) {
            return Err(GrammarError::MissingRule { rule: root.to_string() });
        }
        for rule in &self.rules {
            let mut refs = Vec::new();
            rule.body.refs(&mut refs);
            if let Some(missing) = refs.into_iter().find(|r| !defined.contains(r)) {
                return Err(GrammarError::UndefinedRule {
                    rule: missing.to_string(),
                    referenced_by: rule.name.clone(),
                });
            }
        }
        Ok(())
    }
}

// ----------------------------- Rendering ---------------------------------- //

/// Where an expression is printed; decides when parentheses are needed.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    Body,   // top of a rule: bare alternation allowed
    Item,   // element of a sequence: alternation needs parens
    Atom,   // operand of a postfix operator: sequences need parens too
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, slot: Slot) -> fmt::Result {
    match expr {
        Expr::Literal(text) => write_literal(f, text),
        Expr::Class(class) => write_class(f, class),
        Expr::Any => f.write_str("."),
        Expr::Ref(name) => f.write_str(name),
        Expr::Seq(items) if items.is_empty() => f.write_str("\"\""),
        Expr::Seq(items) => {
            let wrap = slot == Slot::Atom && items.len() > 1;
            if wrap { f.write_str("( ")?; }
            for (i, item) in items.iter().enumerate() {
                if i > 0 { f.write_str(" ")?; }
                write_expr(f, item, Slot::Item)?;
            }
            if wrap { f.write_str(" )")?; }
            Ok(())
        }
        Expr::Alt(arms) => {
            let wrap = slot != Slot::Body;
            if wrap { f.write_str("( ")?; }
            for (i, arm) in arms.iter().enumerate() {
                if i > 0 { f.write_str(" | ")?; }
                write_expr(f, arm, Slot::Item)?;
            }
            if wrap { f.write_str(" )")?; }
            Ok(())
        }
        Expr::Repeat(inner, op) => {
            write_expr(f, inner, Slot::Atom)?;
            f.write_str(match op {
                Repeat::Optional => "?",
                Repeat::ZeroOrMore => "*",
                Repeat::OneOrMore => "+",
            })
        }
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            _ => write_plain_char(f, c)?,
        }
    }
    f.write_str("\"")
}

fn write_class(f: &mut fmt::Formatter<'_>, class: &CharClass) -> fmt::Result {
    f.write_str("[")?;
    if class.negated { f.write_str("^")?; }
    for item in &class.items {
        match *item {
            ClassItem::Char(c) => write_class_char(f, c)?,
            ClassItem::Range(lo, hi) => {
                write_class_char(f, lo)?;
                f.write_str("-")?;
                write_class_char(f, hi)?;
            }
        }
    }
    f.write_str("]")
}

fn write_class_char(f: &mut fmt::Formatter<'_>, c: char) -> fmt::Result {
    match c {
        ']' => f.write_str("\\]"),
        '\\' => f.write_str("\\\\"),
        _ => write_plain_char(f, c),
    }
}

fn write_plain_char(f: &mut fmt::Formatter<'_>, c: char) -> fmt::Result {
    match c {
        '\n' => f.write_str("\\n"),
        '\r' => f.write_str("\\r"),
        '\t' => f.write_str("\\t"),
        c if (c as u32) < 0x20 || c as u32 == 0x7F => write!(f, "\\x{:02X}", c as u32),
        c => write!(f, "{c}"),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, Slot::Body)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::= {}", self.name, self.body)
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_flatten() {
        let e = Expr::seq([Expr::lit("a"), Expr::seq([Expr::lit("b"), Expr::lit("c")])]);
        assert_eq!(e, Expr::Seq(vec![Expr::lit("a"), Expr::lit("b"), Expr::lit("c")]));
        assert_eq!(Expr::alt([Expr::rule("x")]), Expr::rule("x"));
    }

    #[test]
    fn renders_with_minimal_parentheses() {
        let body = Expr::alt([
            Expr::seq([Expr::lit("{"), Expr::rule("ws"), Expr::lit("}")]),
            Expr::seq([Expr::lit("a"), Expr::alt([Expr::rule("b"), Expr::rule("c")])]),
            Expr::seq([Expr::lit(","), Expr::rule("ws")]).star(),
            Expr::rule("x").opt(),
        ]);
        assert_eq!(
            body.to_string(),
            r#""{" ws "}" | "a" ( b | c ) | ( "," ws )* | x?"#
        );
    }

    #[test]
    fn escapes_literals_and_classes() {
        assert_eq!(Expr::lit("\"title\"").to_string(), r#""\"title\"""#);
        assert_eq!(Expr::lit("a\\b\n").to_string(), r#""a\\b\n""#);
        let class = CharClass::none_of([
            ClassItem::Char('"'),
            ClassItem::Char('\\'),
            ClassItem::Char('\x7F'),
            ClassItem::Range('\x00', '\x1F'),
        ]);
        assert_eq!(Expr::from(class).to_string(), r#"[^"\\\x7F\x00-\x1F]"#);
        let ws = CharClass::of([ClassItem::Char(' '), ClassItem::Char('\t'), ClassItem::Char('\n')]);
        assert_eq!(Expr::from(ws).to_string(), r"[ \t\n]");
    }

    #[test]
    fn class_matching() {
        let digits = CharClass::of([ClassItem::Range('0', '9')]);
        assert!(digits.matches('7'));
        assert!(!digits.matches('a'));
        let not_quote = CharClass::none_of([ClassItem::Char('"')]);
        assert!(not_quote.matches('x'));
        assert!(!not_quote.matches('"'));
    }

    #[test]
    fn validate_reports_closure_problems() {
        let mut g = Grammar::new();
        g.push("root", Expr::rule("thing"));
        assert_eq!(
            g.validate("root"),
            Err(GrammarError::UndefinedRule { rule: "thing".into(), referenced_by: "root".into() })
        );
        g.push("thing", Expr::lit("x"));
        assert_eq!(g.validate("root"), Ok(()));
        g.push("thing", Expr::lit("y"));
        assert_eq!(g.validate("root"), Err(GrammarError::DuplicateRule { rule: "thing".into() }));
        assert_eq!(
            Grammar::new().validate("root"),
            Err(GrammarError::MissingRule { rule: "root".into() })
        );
    }
}
