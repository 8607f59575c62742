//! Reader for GBNF text.
//!
//! Accepts the subset llama.cpp understands: `name ::= body` rules, string
//! literals, character classes, `.`, rule references, parenthesized groups,
//! postfix `? * +`, alternation, and `#` comments. A newline ends a rule unless
//! it appears inside parentheses or right after `|`.
use crate::error::GrammarError;

use super::{CharClass, ClassItem, Expr, Grammar, Repeat};

/// Parse grammar text into rules. Closure is not checked here; see
/// [`Grammar::validate`].
pub fn parse_grammar(src: &str) -> Result<Grammar, GrammarError> {
    let mut p = Parser { chars: src.chars().collect(), pos: 0 };
    let mut grammar = Grammar::new();
    loop {
        p.skip_space(true);
        if p.peek().is_none() {
            break;
        }
        let name = p.name()?;
        p.skip_space(false);
        p.expect("::=")?;
        p.skip_space(false);
        let body = p.alternatives(false)?;
        p.skip_space(false);
        match p.peek() {
            None | Some('\n') | Some('\r') => {}
            Some(c) => return Err(p.error(format!("unexpected `{c}` after rule `{name}`"))),
        }
        grammar.push(name, body);
    }
    Ok(grammar)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> GrammarError {
        let before = &self.chars[..self.pos.min(self.chars.len())];
        let line = before.iter().filter(|c| **c == '\n').count() + 1;
        let column = before.iter().rev().take_while(|c| **c != '\n').count() + 1;
        GrammarError::Syntax { line, column, message: message.into() }
    }

    fn skip_space(&mut self, newlines: bool) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' => self.pos += 1,
                '\n' | '\r' if newlines => self.pos += 1,
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' { break; }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), GrammarError> {
        for expected in token.chars() {
            if self.peek() != Some(expected) {
                return Err(self.error(format!("expected `{token}`")));
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn name(&mut self) -> Result<String, GrammarError> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a rule name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn alternatives(&mut self, nested: bool) -> Result<Expr, GrammarError> {
        let mut arms = vec![self.sequence(nested)?];
        loop {
            self.skip_space(nested);
            if self.peek() != Some('|') {
                break;
            }
            self.pos += 1;
            self.skip_space(true);
            arms.push(self.sequence(nested)?);
        }
        Ok(Expr::alt(arms))
    }

    fn sequence(&mut self, nested: bool) -> Result<Expr, GrammarError> {
        let mut items = Vec::new();
        loop {
            self.skip_space(nested);
            match self.peek() {
                None | Some('|') | Some(')') | Some('\n') | Some('\r') => break,
                _ => {}
            }
            let mut item = self.atom()?;
            while let Some(op) = self.peek().and_then(|c| match c {
                '?' => Some(Repeat::Optional),
                '*' => Some(Repeat::ZeroOrMore),
                '+' => Some(Repeat::OneOrMore),
                _ => None,
            }) {
                self.pos += 1;
                item = Expr::Repeat(Box::new(item), op);
            }
            items.push(item);
        }
        Ok(Expr::seq(items))
    }

    fn atom(&mut self) -> Result<Expr, GrammarError> {
        match self.peek() {
            Some('"') => {
                self.pos += 1;
                let mut text = String::new();
                loop {
                    match self.peek() {
                        None | Some('\n') => return Err(self.error("unterminated string literal")),
                        Some('"') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => text.push(self.char_in_literal()?),
                    }
                }
                Ok(Expr::Literal(text))
            }
            Some('[') => {
                self.pos += 1;
                let negated = self.peek() == Some('^');
                if negated { self.pos += 1; }
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        None | Some('\n') => return Err(self.error("unterminated character class")),
                        Some(']') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => {
                            let lo = self.char_in_literal()?;
                            if self.peek() == Some('-') && !matches!(self.peek_at(1), Some(']') | None) {
                                self.pos += 1;
                                let hi = self.char_in_literal()?;
                                items.push(ClassItem::Range(lo, hi));
                            } else {
                                items.push(ClassItem::Char(lo));
                            }
                        }
                    }
                }
                Ok(Expr::Class(CharClass { negated, items }))
            }
            Some('(') => {
                self.pos += 1;
                self.skip_space(true);
                let inner = self.alternatives(true)?;
                self.skip_space(true);
                self.expect(")")?;
                Ok(inner)
            }
            Some('.') => {
                self.pos += 1;
                Ok(Expr::Any)
            }
            Some(c) if is_name_char(c) => Ok(Expr::Ref(self.name()?)),
            Some(c) => Err(self.error(format!("unexpected `{c}`"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// One (possibly escaped) character inside a literal or class.
    fn char_in_literal(&mut self) -> Result<char, GrammarError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unexpected end of input"));
        };
        if c != '\\' {
            return Ok(c);
        }
        let Some(e) = self.bump() else {
            return Err(self.error("dangling escape"));
        };
        match e {
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'x' => self.hex_escape(2),
            'u' => self.hex_escape(4),
            'U' => self.hex_escape(8),
            '\\' | '"' | '[' | ']' | '/' | '-' => Ok(e),
            other => Err(self.error(format!("unknown escape `\\{other}`"))),
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, GrammarError> {
        let mut value = 0u32;
        for _ in 0..digits {
            let d = self.bump().and_then(|c| c.to_digit(16));
            let Some(d) = d else {
                return Err(self.error("malformed hex escape"));
            };
            value = value * 16 + d;
        }
        char::from_u32(value).ok_or_else(|| self.error("escape is not a valid character"))
    }
}

// ------------------------------- Tests ------------------------------------ //
