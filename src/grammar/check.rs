//! Backtracking recognizer for GBNF grammars.
//!
//! Computes, for every (rule, position) pair, the set of positions where a
//! match can end. Rule results are memoized, so grammars shaped like the ones
//! the emitter produces are recognized in polynomial time. Left-recursive
//! rules are cut off rather than looped on and may under-accept.
//!
//! Rule invocations nest at most `MAX_RULE_DEPTH` deep; deeper input is an
//! error, never a stack overflow.
//!
//! Used to verify round trips (a JSON rendering of a value is accepted by the
//! grammar emitted for its type), not for token-level decoding.
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::GrammarError;
use crate::naming::ROOT_RULE;

use super::{Expr, Grammar, Repeat};

type Ends = BTreeSet<usize>;

/// Same bound serde_json puts on JSON nesting.
pub const MAX_RULE_DEPTH: usize = 128;

pub struct Recognizer<'g> {
    grammar: &'g Grammar,
    index: HashMap<&'g str, usize>,
}

impl<'g> Recognizer<'g> {
    /// Fails if any referenced rule is undefined or defined twice.
    pub fn new(grammar: &'g Grammar) -> Result<Self, GrammarError> {
        let mut index = HashMap::new();
        for (i, rule) in grammar.rules.iter().enumerate() {
            if index.insert(rule.name.as_str(), i).is_some() {
                return Err(GrammarError::DuplicateRule { rule: rule.name.clone() });
            }
        }
        for rule in &grammar.rules {
            let mut refs = Vec::new();
            rule.body.refs(&mut refs);
            if let Some(missing) = refs.into_iter().find(|r| !index.contains_key(r)) {
                return Err(GrammarError::UndefinedRule {
                    rule: missing.to_string(),
                    referenced_by: rule.name.clone(),
                });
            }
        }
        Ok(Self { grammar, index })
    }

    /// Whether the whole of `input` derives from rule `start`.
    pub fn accepts(&self, start: &str, input: &str) -> Result<bool, GrammarError> {
        let Some(&start) = self.index.get(start) else {
            return Err(GrammarError::MissingRule { rule: start.to_string() });
        };
        let chars: Vec<char> = input.chars().collect();
        let mut run = Run {
            rec: self,
            input: &chars,
            memo: HashMap::new(),
            active: HashSet::new(),
            depth: 0,
            too_deep: false,
        };
        let ends = run.rule(start, 0);
        if run.too_deep {
            return Err(GrammarError::NestingTooDeep { limit: MAX_RULE_DEPTH });
        }
        Ok(ends.contains(&chars.len()))
    }
}

impl Grammar {
    /// Shorthand for recognizing `input` from the `root` rule.
    pub fn accepts(&self, input: &str) -> Result<bool, GrammarError> {
        Recognizer::new(self)?.accepts(ROOT_RULE, input)
    }
}

struct Run<'r, 'g> {
    rec: &'r Recognizer<'g>,
    input: &'r [char],
    memo: HashMap<(usize, usize), Ends>,
    active: HashSet<(usize, usize)>,
    depth: usize,
    too_deep: bool,
}

impl Run<'_, '_> {
    fn rule(&mut self, rule: usize, pos: usize) -> Ends {
        if let Some(ends) = self.memo.get(&(rule, pos)) {
            return ends.clone();
        }
        if self.too_deep || self.depth >= MAX_RULE_DEPTH {
            self.too_deep = true;
            return Ends::new();
        }
        if !self.active.insert((rule, pos)) {
            return Ends::new();
        }
        let grammar = self.rec.grammar;
        self.depth += 1;
        let ends = self.expr(&grammar.rules[rule].body, pos);
        self.depth -= 1;
        self.active.remove(&(rule, pos));
        if !self.too_deep {
            self.memo.insert((rule, pos), ends.clone());
        }
        ends
    }

    fn expr(&mut self, expr: &Expr, pos: usize) -> Ends {
        match expr {
            Expr::Literal(text) => {
                let mut at = pos;
                for c in text.chars() {
                    if self.input.get(at) != Some(&c) {
                        return Ends::new();
                    }
                    at += 1;
                }
                Ends::from([at])
            }
            Expr::Class(class) => match self.input.get(pos) {
                Some(c) if class.matches(*c) => Ends::from([pos + 1]),
                _ => Ends::new(),
            },
            Expr::Any => {
                if pos < self.input.len() { Ends::from([pos + 1]) } else { Ends::new() }
            }
            Expr::Ref(name) => {
                let rec = self.rec;
                match rec.index.get(name.as_str()) {
                    Some(&rule) => self.rule(rule, pos),
                    None => Ends::new(),
                }
            }
            Expr::Seq(items) => {
                let mut current = Ends::from([pos]);
                for item in items {
                    let mut next = Ends::new();
                    for p in current {
                        next.extend(self.expr(item, p));
                    }
                    if next.is_empty() {
                        return next;
                    }
                    current = next;
                }
                current
            }
            Expr::Alt(arms) => {
                let mut out = Ends::new();
                for arm in arms {
                    out.extend(self.expr(arm, pos));
                }
                out
            }
            Expr::Repeat(inner, op) => match op {
                Repeat::Optional => {
                    let mut out = self.expr(inner, pos);
                    out.insert(pos);
                    out
                }
                Repeat::ZeroOrMore => self.closure(inner, Ends::from([pos])),
                Repeat::OneOrMore => {
                    let first = self.expr(inner, pos);
                    self.closure(inner, first)
                }
            },
        }
    }

    /// Every position reachable from `start` by repeating `inner` zero or more times.
    fn closure(&mut self, inner: &Expr, start: Ends) -> Ends {
        let mut out = start.clone();
        let mut frontier: Vec<usize> = start.into_iter().collect();
        while let Some(p) = frontier.pop() {
            for end in self.expr(inner, p) {
                if out.insert(end) {
                    frontier.push(end);
                }
            }
        }
        out
    }
}

// ------------------------------- Tests ------------------------------------ //
