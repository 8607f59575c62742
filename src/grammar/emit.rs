//! Grammar emission: introspected type graph → GBNF rules.
//!
//! Rule order is fixed: `root`, `grammar-models`, outer-wrapper rules, one rule
//! per named type in introspection order, the primitive rules that were
//! referenced, then `ws`. Nothing here iterates an unordered collection, so
//! the same input always renders to the same bytes.
use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::compiler::CompileOptions;
use crate::error::CompileError;
use crate::introspect::Introspection;
use crate::ir::{Field, NamedType, Prim, Ty, TypeGraph, TypeId};
use crate::naming::{self, MODELS_RULE, ROOT_RULE, WS_RULE};

use super::{CharClass, ClassItem, Expr, Grammar, Rule};

pub fn emit_grammar(
    graph: &TypeGraph,
    intro: &Introspection,
    options: &CompileOptions,
) -> Result<Grammar, CompileError> {
    let wrapper = options.outer_wrapper()?;
    let mut emitter = Emitter { graph, intro, used: BTreeSet::new() };

    let mut type_rules = Vec::with_capacity(intro.len());
    for (id, rule) in intro.named() {
        let body = emitter.named_body(id)?;
        type_rules.push(Rule { name: rule.to_string(), body });
    }
    let taken: HashSet<&str> = type_rules.iter().map(|r| r.name.as_str()).collect();

    let mut wrapper_rules = Vec::new();
    let mut arms = Vec::new();
    for (root, _) in intro.roots() {
        let Some((name_key, content_key)) = wrapper else {
            arms.push(emitter.value(root)?);
            continue;
        };
        let Ty::Named(id) = root else {
            return Err(CompileError::UnsupportedType {
                name: "root".into(),
                path: ROOT_RULE.into(),
                reason: "the outer wrapper selects models by name, so every root must be a named type".into(),
            });
        };
        let model_name = graph.name(*id).unwrap_or_default();
        let model_rule = emitter.rule_of(*id)?;
        let rule = naming::wrapper_rule_name(model_rule);
        if taken.contains(rule.as_str()) {
            return Err(CompileError::NamingConflict {
                name: model_name.to_string(),
                path: ROOT_RULE.into(),
                reason: format!("wrapper rule `{rule}` collides with a type rule"),
            });
        }
        let body = Expr::seq([
            Expr::lit("{"), ws(),
            Expr::lit(json_quote(name_key)), ws(), Expr::lit(":"), ws(),
            Expr::lit(json_quote(model_name)), ws(), Expr::lit(","), ws(),
            Expr::lit(json_quote(content_key)), ws(), Expr::lit(":"), ws(),
            Expr::rule(model_rule), ws(),
            Expr::lit("}"),
        ]);
        arms.push(Expr::rule(rule.clone()));
        wrapper_rules.push(Rule { name: rule, body });
    }

    let mut grammar = Grammar::new();
    grammar.push(ROOT_RULE, Expr::seq([ws(), Expr::rule(MODELS_RULE), ws()]));
    grammar.push(MODELS_RULE, Expr::alt(arms));
    grammar.rules.extend(wrapper_rules);
    grammar.rules.extend(type_rules);
    for prim in &emitter.used {
        grammar.push(prim.name(), primitive_body(*prim));
    }
    grammar.push(WS_RULE, Expr::from(CharClass::of([
        ClassItem::Char(' '),
        ClassItem::Char('\t'),
        ClassItem::Char('\n'),
    ])).star());

    debug!(rules = grammar.rules.len(), primitives = emitter.used.len(), "grammar emitted");
    Ok(grammar)
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

struct Emitter<'a> {
    graph: &'a TypeGraph,
    intro: &'a Introspection,
    used: BTreeSet<Prim>,
}

impl<'a> Emitter<'a> {
    fn rule_of(&self, id: TypeId) -> Result<&'a str, CompileError> {
        self.intro.rule_name(id).ok_or_else(|| CompileError::UnsupportedType {
            name: self.graph.name(id).map(str::to_string).unwrap_or_else(|| id.to_string()),
            path: ROOT_RULE.into(),
            reason: "type was not reached during introspection".into(),
        })
    }

    fn named_body(&mut self, id: TypeId) -> Result<Expr, CompileError> {
        match self.graph.get(id) {
            Some(NamedType::Enum(e)) => {
                Ok(Expr::alt(e.values.iter().map(|v| Expr::lit(json_quote(v)))))
            }
            Some(NamedType::Record(r)) => {
                let members = self.members(&r.fields, false)?;
                Ok(Expr::seq([Expr::lit("{"), ws(), members, Expr::lit("}")]))
            }
            Some(NamedType::Declared { name }) => Err(CompileError::UnsupportedType {
                name: name.clone(),
                path: name.clone(),
                reason: "record was declared but never defined".into(),
            }),
            None => Err(CompileError::UnsupportedType {
                name: id.to_string(),
                path: ROOT_RULE.into(),
                reason: "type id does not belong to this graph".into(),
            }),
        }
    }

    /// Object members in declared order. `after_first` tells whether a member
    /// may already have been written, i.e. whether the next one needs a comma.
    ///
    /// Required members after that point are plain `"," ws member`; omittable
    /// ones are `( "," ws member )?`. While nothing may have been written yet,
    /// an omittable member branches into "written here" and "skipped".
    fn members(&mut self, fields: &[Field], after_first: bool) -> Result<Expr, CompileError> {
        let Some((field, rest)) = fields.split_first() else {
            return Ok(Expr::seq([]));
        };
        let member = self.member(field)?;
        if after_first {
            let item = Expr::seq([Expr::lit(","), ws(), member]);
            let item = if field.required { item } else { item.opt() };
            return Ok(Expr::seq([item, self.members(rest, true)?]));
        }
        let present = Expr::seq([member, self.members(rest, true)?]);
        if field.required {
            return Ok(present);
        }
        let absent = self.members(rest, false)?;
        Ok(if absent.is_empty_seq() { present.opt() } else { Expr::alt([present, absent]) })
    }

    fn member(&mut self, field: &Field) -> Result<Expr, CompileError> {
        Ok(Expr::seq([
            Expr::lit(json_quote(&field.name)), ws(), Expr::lit(":"), ws(),
            self.value(&field.ty)?, ws(),
        ]))
    }

    fn value(&mut self, ty: &Ty) -> Result<Expr, CompileError> {
        Ok(match ty {
            Ty::Prim(p) => {
                self.used.insert(*p);
                Expr::rule(p.name())
            }
            Ty::Named(id) => Expr::rule(self.rule_of(*id)?),
            Ty::List(item) => {
                let v = self.value(item)?;
                let more = Expr::seq([Expr::lit(","), ws(), v.clone(), ws()]).star();
                Expr::seq([
                    Expr::lit("["), ws(),
                    Expr::seq([v, ws(), more]).opt(),
                    Expr::lit("]"),
                ])
            }
            Ty::Optional(item) => {
                let v = self.value(item)?;
                self.used.insert(Prim::Null);
                Expr::alt([v, Expr::rule(Prim::Null.name())])
            }
            Ty::Union(variants) => {
                let arms = variants.iter().map(|v| self.value(v)).collect::<Result<Vec<_>, _>>()?;
                Expr::alt(arms)
            }
        })
    }
}

fn ws() -> Expr {
    Expr::rule(WS_RULE)
}

/// JSON string literal for `s`, e.g. `title` → `"title"`.
fn json_quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn digits(lo: char, hi: char) -> Expr {
    Expr::from(CharClass::of([ClassItem::Range(lo, hi)]))
}

fn hex_digit() -> Expr {
    Expr::from(CharClass::of([
        ClassItem::Range('0', '9'),
        ClassItem::Range('a', 'f'),
        ClassItem::Range('A', 'F'),
    ]))
}

/// `"-"? ( "0" | [1-9] [0-9]* )`
fn integer_part() -> Expr {
    Expr::seq([
        Expr::lit("-").opt(),
        Expr::alt([Expr::lit("0"), Expr::seq([digits('1', '9'), digits('0', '9').star()])]),
    ])
}

fn primitive_body(prim: Prim) -> Expr {
    match prim {
        Prim::String => {
            let plain = CharClass::none_of([
                ClassItem::Char('"'),
                ClassItem::Char('\\'),
                ClassItem::Char('\x7F'),
                ClassItem::Range('\x00', '\x1F'),
            ]);
            let simple_escape = CharClass::of("\"\\/bfnrt".chars().map(ClassItem::Char));
            let escape = Expr::seq([
                Expr::lit("\\"),
                Expr::alt([
                    Expr::from(simple_escape),
                    Expr::seq([Expr::lit("u"), hex_digit(), hex_digit(), hex_digit(), hex_digit()]),
                ]),
            ]);
            Expr::seq([
                Expr::lit("\""),
                Expr::alt([Expr::from(plain), escape]).star(),
                Expr::lit("\""),
            ])
        }
        Prim::Integer => integer_part(),
        Prim::Float => Expr::seq([
            integer_part(),
            Expr::seq([Expr::lit("."), digits('0', '9').plus()]).opt(),
            Expr::seq([
                Expr::from(CharClass::of([ClassItem::Char('e'), ClassItem::Char('E')])),
                Expr::from(CharClass::of([ClassItem::Char('-'), ClassItem::Char('+')])).opt(),
                digits('0', '9').plus(),
            ]).opt(),
        ]),
        Prim::Boolean => Expr::alt([Expr::lit("true"), Expr::lit("false")]),
        Prim::Null => Expr::lit("null"),
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::introspect;
    use crate::ir::{EnumType, RecordType};
    use pretty_assertions::assert_eq;

    fn emit(graph: &TypeGraph, roots: &[Ty], options: &CompileOptions) -> Grammar {
        let intro = introspect(graph, roots).unwrap();
        emit_grammar(graph, &intro, options).unwrap()
    }

    fn rule_text(grammar: &Grammar, name: &str) -> String {
        grammar.get(name).unwrap().body.to_string()
    }

    #[test]
    fn primitive_rules_render_as_json_grammars() {
        assert_eq!(
            primitive_body(Prim::String).to_string(),
            r#""\"" ( [^"\\\x7F\x00-\x1F] | "\\" ( ["\\/bfnrt] | "u" [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F] [0-9a-fA-F] ) )* "\"""#
        );
        assert_eq!(primitive_body(Prim::Integer).to_string(), r#""-"? ( "0" | [1-9] [0-9]* )"#);
        assert_eq!(
            primitive_body(Prim::Float).to_string(),
            r#""-"? ( "0" | [1-9] [0-9]* ) ( "." [0-9]+ )? ( [eE] [-+]? [0-9]+ )?"#
        );
        assert_eq!(primitive_body(Prim::Boolean).to_string(), r#""true" | "false""#);
    }

    #[test]
    fn record_with_omittable_field() {
        let mut g = TypeGraph::new();
        let category = g.add_enum(EnumType::new("Category", ["Fiction", "Non-Fiction"]));
        let book = g.add_record(RecordType::new("Book")
            .field(Field::new("title", Ty::string()))
            .field(Field::omittable("published_year", Ty::integer()))
            .field(Field::new("keywords", Ty::list(Ty::string())))
            .field(Field::new("category", category)));
        let grammar = emit(&g, &[Ty::named(book)], &CompileOptions::default());

        let names: Vec<_> = grammar.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["root", "grammar-models", "book", "category", "string", "integer", "ws"]);
        assert_eq!(rule_text(&grammar, "root"), "ws grammar-models ws");
        assert_eq!(rule_text(&grammar, "grammar-models"), "book");
        assert_eq!(
            rule_text(&grammar, "book"),
            concat!(
                r#""{" ws "\"title\"" ws ":" ws string ws "#,
                r#"( "," ws "\"published_year\"" ws ":" ws integer ws )? "#,
                r#""," ws "\"keywords\"" ws ":" ws "[" ws ( string ws ( "," ws string ws )* )? "]" ws "#,
                r#""," ws "\"category\"" ws ":" ws category ws "}""#,
            )
        );
        assert_eq!(rule_text(&grammar, "category"), r#""\"Fiction\"" | "\"Non-Fiction\"""#);
        assert_eq!(rule_text(&grammar, "ws"), r"[ \t\n]*");
    }

    #[test]
    fn enum_keeps_declared_order() {
        let mut g = TypeGraph::new();
        let e = g.add_enum(EnumType::new("Letters", ["B", "A", "C"]));
        let grammar = emit(&g, &[Ty::named(e)], &CompileOptions::default());
        assert_eq!(rule_text(&grammar, "letters"), r#""\"B\"" | "\"A\"" | "\"C\"""#);
    }

    #[test]
    fn leading_omittable_fields_branch() {
        let mut g = TypeGraph::new();
        let r = g.add_record(RecordType::new("Patch")
            .field(Field::omittable("a", Ty::boolean()))
            .field(Field::omittable("b", Ty::boolean()))
            .field(Field::new("c", Ty::boolean())));
        let grammar = emit(&g, &[Ty::named(r)], &CompileOptions::default());
        let a = r#""\"a\"" ws ":" ws boolean ws"#;
        let b = r#""\"b\"" ws ":" ws boolean ws"#;
        let c = r#""\"c\"" ws ":" ws boolean ws"#;
        assert_eq!(
            rule_text(&grammar, "patch"),
            format!(
                r#""{{" ws ( {a} ( "," ws {b} )? "," ws {c} | {b} "," ws {c} | {c} ) "}}""#
            )
        );
    }

    #[test]
    fn every_field_subset_is_judged_by_required_keys() {
        let mut g = TypeGraph::new();
        let r = g.add_record(RecordType::new("Mixed")
            .field(Field::omittable("a", Ty::integer()))
            .field(Field::new("b", Ty::integer()))
            .field(Field::omittable("c", Ty::integer()))
            .field(Field::omittable("d", Ty::integer()))
            .field(Field::new("e", Ty::integer())));
        let grammar = emit(&g, &[Ty::named(r)], &CompileOptions::default());

        let keys = ["a", "b", "c", "d", "e"];
        for mask in 0u32..32 {
            let mut object = serde_json::Map::new();
            for (bit, key) in keys.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    object.insert(key.to_string(), serde_json::json!(bit));
                }
            }
            let text = serde_json::Value::Object(object).to_string();
            let expected = mask & 0b00010 != 0 && mask & 0b10000 != 0;
            assert_eq!(grammar.accepts(&text).unwrap(), expected, "{text}");
        }

        for text in [
            r#"{,"b":1,"e":2}"#,
            r#"{"b":1,,"e":2}"#,
            r#"{"b":1,"e":2,}"#,
            r#"{"a":0,,"b":1,"e":2}"#,
            r#"{"e":2,"b":1}"#,
        ] {
            assert!(!grammar.accepts(text).unwrap(), "{text}");
        }
    }

    #[test]
    fn all_omittable_and_empty_records() {
        let mut g = TypeGraph::new();
        let empty = g.add_record(RecordType::new("Empty"));
        let loose = g.add_record(RecordType::new("Loose").field(Field::omittable("x", Ty::null())));
        let grammar = emit(&g, &[Ty::named(empty), Ty::named(loose)], &CompileOptions::default());
        assert_eq!(rule_text(&grammar, "empty"), r#""{" ws "}""#);
        assert_eq!(rule_text(&grammar, "loose"), r#""{" ws ( "\"x\"" ws ":" ws null ws )? "}""#);
        assert_eq!(rule_text(&grammar, "grammar-models"), "empty | loose");
    }

    #[test]
    fn optional_container_uses_null_alternative() {
        let mut g = TypeGraph::new();
        let r = g.add_record(RecordType::new("Maybe")
            .field(Field::new("year", Ty::optional(Ty::integer())))
            .field(Field::new("tags", Ty::optional(Ty::list(Ty::string())))));
        let grammar = emit(&g, &[Ty::named(r)], &CompileOptions::default());
        let body = rule_text(&grammar, "maybe");
        assert!(body.contains(r#""\"year\"" ws ":" ws ( integer | null ) ws"#), "{body}");
        assert!(body.contains(r#"( "[" ws ( string ws ( "," ws string ws )* )? "]" | null )"#), "{body}");
        assert!(grammar.get("null").is_some());
    }

    #[test]
    fn union_alternates_in_declared_order() {
        let mut g = TypeGraph::new();
        let unit = g.add_enum(EnumType::new("Unit", ["kg"]));
        let r = g.add_record(RecordType::new("Weight")
            .field(Field::new("value", Ty::union([Ty::string(), Ty::float(), Ty::named(unit)]))));
        let grammar = emit(&g, &[Ty::named(r)], &CompileOptions::default());
        assert!(rule_text(&grammar, "weight").contains("( string | float | unit )"));
        let prims: Vec<_> = grammar.rules.iter().map(|r| r.name.as_str()).skip(4).collect();
        assert_eq!(prims, ["string", "float", "ws"]);
    }

    #[test]
    fn recursive_record_references_itself() {
        let mut g = TypeGraph::new();
        let node = g.declare_record("TreeNode");
        g.define_record(node, RecordType::new("TreeNode")
            .field(Field::new("value", Ty::integer()))
            .field(Field::new("children", Ty::list(node))));
        let grammar = emit(&g, &[Ty::named(node)], &CompileOptions::default());
        let body = rule_text(&grammar, "tree-node");
        assert!(body.contains("( tree-node ws ( \",\" ws tree-node ws )* )?"), "{body}");
        assert_eq!(grammar.rules.iter().filter(|r| r.name == "tree-node").count(), 1);
    }

    #[test]
    fn outer_wrapper_rules() {
        let mut g = TypeGraph::new();
        let send = g.add_record(RecordType::new("SendMessageToUser").field(Field::new("message", Ty::string())));
        let calc = g.add_record(RecordType::new("Calculator").field(Field::new("number_one", Ty::float())));
        let options = CompileOptions::default().with_outer_object("function", "function_parameters");
        let grammar = emit(&g, &[Ty::named(send), Ty::named(calc)], &options);

        assert_eq!(
            rule_text(&grammar, "grammar-models"),
            "send-message-to-user-grammar-model | calculator-grammar-model"
        );
        assert_eq!(
            rule_text(&grammar, "calculator-grammar-model"),
            r#""{" ws "\"function\"" ws ":" ws "\"Calculator\"" ws "," ws "\"function_parameters\"" ws ":" ws calculator ws "}""#
        );
    }

    #[test]
    fn outer_wrapper_needs_named_roots_and_both_keys() {
        let g = TypeGraph::new();
        let roots = [Ty::list(Ty::string())];
        let intro = introspect(&g, &roots).unwrap();
        let wrapped = CompileOptions::default().with_outer_object("function", "function_parameters");
        assert!(matches!(
            emit_grammar(&g, &intro, &wrapped),
            Err(CompileError::UnsupportedType { .. })
        ));

        let half = CompileOptions { outer_object_name: Some("function".into()), ..CompileOptions::default() };
        assert!(matches!(emit_grammar(&g, &intro, &half), Err(CompileError::IncompleteOuterWrapper)));
    }

    #[test]
    fn unnamed_root_is_inlined() {
        let g = TypeGraph::new();
        let grammar = emit(&g, &[Ty::list(Ty::integer())], &CompileOptions::default());
        assert_eq!(
            rule_text(&grammar, "grammar-models"),
            r#""[" ws ( integer ws ( "," ws integer ws )* )? "]""#
        );
    }

    #[test]
    fn keys_and_values_are_json_escaped() {
        let mut g = TypeGraph::new();
        let e = g.add_enum(EnumType::new("Quote", ["say \"hi\"", "back\\slash"]));
        let grammar = emit(&g, &[Ty::named(e)], &CompileOptions::default());
        assert_eq!(
            rule_text(&grammar, "quote"),
            r#""\"say \\\"hi\\\"\"" | "\"back\\\\slash\"""#
        );
    }
}
