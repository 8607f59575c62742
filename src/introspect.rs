//! Type introspection: one depth-first pass over the roots.
//!
//! Produces the deduplicated, first-encounter-ordered list of named types that
//! both the grammar emitter and the documentation generator walk, so the two
//! artifacts can never disagree on which types exist or in what order.
//!
//! All validation happens here (naming, unions, enums, dangling ids), so
//! emission never starts on a graph that would produce a broken grammar.
use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::error::CompileError;
use crate::ir::{NamedType, Prim, Ty, TypeGraph, TypeId};
use crate::naming;

#[derive(Debug, Clone)]
pub struct Introspection {
    /// Named types in first-encounter order → GBNF rule name.
    named: IndexMap<TypeId, String>,
    /// Identical re-declarations folded onto their first occurrence.
    aliases: HashMap<TypeId, TypeId>,
    /// Distinct roots → declaration position.
    roots: IndexMap<Ty, usize>,
    /// Types re-entered while still on the traversal stack.
    recursive: IndexSet<TypeId>,
}

impl Introspection {
    /// Named types with their rule names, in emission order.
    pub fn named(&self) -> impl Iterator<Item = (TypeId, &str)> {
        self.named.iter().map(|(id, rule)| (*id, rule.as_str()))
    }

    pub fn len(&self) -> usize { self.named.len() }

    pub fn is_empty(&self) -> bool { self.named.is_empty() }

    /// Follow the alias table to the id that owns the rule.
    pub fn canonical(&self, id: TypeId) -> TypeId {
        self.aliases.get(&id).copied().unwrap_or(id)
    }

    pub fn rule_name(&self, id: TypeId) -> Option<&str> {
        self.named.get(&self.canonical(id)).map(String::as_str)
    }

    /// Roots in declaration order, duplicates removed, named roots canonicalized.
    pub fn roots(&self) -> impl Iterator<Item = (&Ty, usize)> {
        self.roots.iter().map(|(ty, pos)| (ty, *pos))
    }

    pub fn is_recursive(&self, id: TypeId) -> bool {
        self.recursive.contains(&self.canonical(id))
    }
}

/// Walk `roots` in order and collect every reachable named type.
pub fn introspect(graph: &TypeGraph, roots: &[Ty]) -> Result<Introspection, CompileError> {
    if roots.is_empty() {
        return Err(CompileError::EmptyRootList);
    }

    let mut walker = Walker {
        graph,
        named: IndexMap::new(),
        aliases: HashMap::new(),
        by_name: HashMap::new(),
        by_rule: HashMap::new(),
        stack: Vec::new(),
        recursive: IndexSet::new(),
        path: Vec::new(),
    };

    let mut root_map = IndexMap::new();
    for (position, root) in roots.iter().enumerate() {
        walker.path.clear();
        walker.path.push(match root {
            Ty::Named(id) => graph.name(*id).map(str::to_string).unwrap_or_else(|| id.to_string()),
            _ => format!("root[{position}]"),
        });
        walker.visit(root)?;
        let root = walker.canonicalize(root);
        if !root_map.contains_key(&root) {
            let next = root_map.len();
            root_map.insert(root, next);
        }
    }

    debug!(
        named = walker.named.len(),
        roots = root_map.len(),
        recursive = walker.recursive.len(),
        "introspection complete"
    );

    Ok(Introspection {
        named: walker.named,
        aliases: walker.aliases,
        roots: root_map,
        recursive: walker.recursive,
    })
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

struct Walker<'g> {
    graph: &'g TypeGraph,
    named: IndexMap<TypeId, String>,
    aliases: HashMap<TypeId, TypeId>,
    by_name: HashMap<&'g str, TypeId>,
    by_rule: HashMap<String, TypeId>,
    stack: Vec<TypeId>,
    recursive: IndexSet<TypeId>,
    path: Vec<String>,
}

/// What a union variant can match, for overlap detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leaf {
    Prim(Prim),
    Named(TypeId),
    List,
}

impl<'g> Walker<'g> {
    fn path(&self) -> String {
        self.path.concat()
    }

    fn with_segment<T>(
        &mut self,
        segment: String,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.path.push(segment);
        let out = f(self);
        self.path.pop();
        out
    }

    fn unsupported(&self, name: impl Into<String>, reason: impl Into<String>) -> CompileError {
        CompileError::UnsupportedType { name: name.into(), path: self.path(), reason: reason.into() }
    }

    fn visit(&mut self, ty: &Ty) -> Result<(), CompileError> {
        match ty {
            Ty::Prim(_) => Ok(()),
            Ty::Named(id) => self.visit_named(*id),
            Ty::List(item) => self.with_segment("[]".into(), |w| w.visit(item)),
            Ty::Optional(item) => {
                if matches!(**item, Ty::Optional(_)) {
                    return Err(self.unsupported("optional", "nested optional cannot be told apart from a single one"));
                }
                self.with_segment("?".into(), |w| w.visit(item))
            }
            Ty::Union(variants) => {
                self.check_union(variants)?;
                for (i, variant) in variants.iter().enumerate() {
                    self.with_segment(format!("|{i}"), |w| w.visit(variant))?;
                }
                Ok(())
            }
        }
    }

    fn visit_named(&mut self, id: TypeId) -> Result<(), CompileError> {
        let id = self.canonical(id);
        if self.stack.contains(&id) {
            trace!(%id, path = %self.path(), "recursive reference");
            self.recursive.insert(id);
            return Ok(());
        }
        if self.named.contains_key(&id) {
            return Ok(());
        }

        let graph = self.graph;
        let Some(node) = graph.get(id) else {
            return Err(self.unsupported(id.to_string(), "type id does not belong to this graph"));
        };
        let name = node.name();

        if let Some(&first) = self.by_name.get(name) {
            if graph.same_shape(first, id) {
                trace!(%id, %first, type_name = name, "folding identical re-declaration");
                self.aliases.insert(id, first);
                // same_shape compares references by name only; the types this
                // copy points at still have to pass the name check.
                if let NamedType::Record(record) = node {
                    for field in &record.fields {
                        self.with_segment(format!(".{}", field.name), |w| w.visit(&field.ty))?;
                    }
                }
                return Ok(());
            }
            return Err(CompileError::NamingConflict {
                name: name.to_string(),
                path: self.path(),
                reason: "two different type shapes share this name".into(),
            });
        }

        let Some(rule) = naming::rule_name(name) else {
            return Err(self.unsupported(name, "name does not yield a usable rule identifier"));
        };
        if naming::is_reserved(&rule) {
            return Err(CompileError::NamingConflict {
                name: name.to_string(),
                path: self.path(),
                reason: format!("rule name `{rule}` is reserved"),
            });
        }
        if let Some(&other) = self.by_rule.get(&rule) {
            let other_name = graph.name(other).unwrap_or_default();
            return Err(CompileError::NamingConflict {
                name: name.to_string(),
                path: self.path(),
                reason: format!("rule name `{rule}` is also produced by `{other_name}`"),
            });
        }

        match node {
            NamedType::Declared { .. } => {
                Err(self.unsupported(name, "record was declared but never defined"))
            }
            NamedType::Enum(e) => {
                if e.values.is_empty() {
                    return Err(CompileError::InvalidEnum { name: name.into(), reason: "no values".into() });
                }
                let mut seen = IndexSet::new();
                for value in &e.values {
                    if !seen.insert(value.as_str()) {
                        return Err(CompileError::InvalidEnum {
                            name: name.into(),
                            reason: format!("duplicate value {value:?}"),
                        });
                    }
                }
                self.register(id, name, rule);
                Ok(())
            }
            NamedType::Record(record) => {
                self.register(id, name, rule);
                self.stack.push(id);
                for field in &record.fields {
                    self.with_segment(format!(".{}", field.name), |w| w.visit(&field.ty))?;
                }
                self.stack.pop();
                Ok(())
            }
        }
    }

    fn register(&mut self, id: TypeId, name: &'g str, rule: String) {
        trace!(%id, type_name = name, rule = %rule, "named type");
        self.by_name.insert(name, id);
        self.by_rule.insert(rule.clone(), id);
        self.named.insert(id, rule);
    }

    fn canonical(&self, id: TypeId) -> TypeId {
        self.aliases.get(&id).copied().unwrap_or(id)
    }

    fn canonicalize(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::Prim(p) => Ty::Prim(*p),
            Ty::Named(id) => Ty::Named(self.canonical(*id)),
            Ty::List(item) => Ty::List(Box::new(self.canonicalize(item))),
            Ty::Optional(item) => Ty::Optional(Box::new(self.canonicalize(item))),
            Ty::Union(vs) => Ty::Union(vs.iter().map(|v| self.canonicalize(v)).collect()),
        }
    }

    /// Unions need two or more variants whose value sets do not overlap.
    /// `integer | float` is rejected as well: every integer literal is also a
    /// float literal, so the alternation could never tell them apart.
    fn check_union(&self, variants: &[Ty]) -> Result<(), CompileError> {
        if variants.len() < 2 {
            return Err(self.unsupported("union", "a union needs at least two variants"));
        }
        let mut leaves = Vec::new();
        for v in variants {
            self.union_leaves(v, &mut leaves);
        }
        let ambiguous = |reason: String| CompileError::AmbiguousUnion { path: self.path(), reason };
        for (i, a) in leaves.iter().enumerate() {
            for b in &leaves[i + 1..] {
                match (a, b) {
                    (x, y) if x == y => {
                        let what = match x {
                            Leaf::Prim(p) => p.name().to_string(),
                            Leaf::Named(id) => self.graph.name(*id).unwrap_or_default().to_string(),
                            Leaf::List => "list".to_string(),
                        };
                        return Err(ambiguous(format!("`{what}` appears more than once")));
                    }
                    (Leaf::Prim(Prim::Integer), Leaf::Prim(Prim::Float))
                    | (Leaf::Prim(Prim::Float), Leaf::Prim(Prim::Integer)) => {
                        return Err(ambiguous(
                            "`integer` and `float` overlap; declare the value as `float` to accept both".into(),
                        ));
                    }
                    (Leaf::Named(x), Leaf::Named(y)) if self.canonical(*x) == self.canonical(*y) => {
                        let what = self.graph.name(*x).unwrap_or_default();
                        return Err(ambiguous(format!("`{what}` appears more than once")));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn union_leaves(&self, ty: &Ty, out: &mut Vec<Leaf>) {
        match ty {
            Ty::Prim(p) => out.push(Leaf::Prim(*p)),
            Ty::Named(id) => out.push(Leaf::Named(*id)),
            Ty::List(_) => out.push(Leaf::List),
            Ty::Optional(item) => {
                out.push(Leaf::Prim(Prim::Null));
                self.union_leaves(item, out);
            }
            Ty::Union(vs) => vs.iter().for_each(|v| self.union_leaves(v, out)),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EnumType, Field, RecordType};

    fn names(graph: &TypeGraph, intro: &Introspection) -> Vec<String> {
        intro.named().map(|(id, _)| graph.name(id).unwrap().to_string()).collect()
    }

    #[test]
    fn first_encounter_depth_first_order() {
        let mut g = TypeGraph::new();
        let country = g.add_enum(EnumType::new("Country", ["FR", "DE"]));
        let address = g.add_record(RecordType::new("Address").field(Field::new("country", country)));
        let person = g.add_record(RecordType::new("Person")
            .field(Field::new("home", address))
            .field(Field::new("born_in", country))
            .field(Field::new("work", Ty::optional(address))));
        let company = g.add_record(RecordType::new("Company")
            .field(Field::new("staff", Ty::list(person)))
            .field(Field::new("hq", address)));

        let intro = introspect(&g, &[Ty::named(company)]).unwrap();
        assert_eq!(names(&g, &intro), ["Company", "Person", "Address", "Country"]);
        assert_eq!(intro.rule_name(company), Some("company"));
    }

    #[test]
    fn self_reference_terminates_and_is_flagged() {
        let mut g = TypeGraph::new();
        let node = g.declare_record("TreeNode");
        g.define_record(node, RecordType::new("TreeNode")
            .field(Field::new("value", Ty::integer()))
            .field(Field::new("children", Ty::list(node))));

        let intro = introspect(&g, &[Ty::named(node)]).unwrap();
        assert_eq!(intro.len(), 1);
        assert!(intro.is_recursive(node));
    }

    #[test]
    fn mutual_recursion_through_two_records() {
        let mut g = TypeGraph::new();
        let a = g.declare_record("Alpha");
        let b = g.declare_record("Beta");
        g.define_record(a, RecordType::new("Alpha").field(Field::new("beta", Ty::optional(b))));
        g.define_record(b, RecordType::new("Beta").field(Field::new("alpha", a)));

        let intro = introspect(&g, &[Ty::named(a)]).unwrap();
        assert_eq!(names(&g, &intro), ["Alpha", "Beta"]);
        assert!(intro.is_recursive(a));
        assert!(!intro.is_recursive(b));
    }

    #[test]
    fn roots_keep_declaration_order_and_collapse_duplicates() {
        let mut g = TypeGraph::new();
        let send = g.add_record(RecordType::new("SendMessageToUser").field(Field::new("message", Ty::string())));
        let calc = g.add_record(RecordType::new("Calculator").field(Field::new("x", Ty::float())));
        let intro = introspect(&g, &[Ty::named(send), Ty::named(calc), Ty::named(send)]).unwrap();
        let roots: Vec<_> = intro.roots().map(|(ty, pos)| (ty.clone(), pos)).collect();
        assert_eq!(roots, vec![(Ty::named(send), 0), (Ty::named(calc), 1)]);
    }

    #[test]
    fn empty_roots_rejected() {
        let g = TypeGraph::new();
        assert!(matches!(introspect(&g, &[]), Err(CompileError::EmptyRootList)));
    }

    #[test]
    fn distinct_shapes_with_one_name_conflict() {
        let mut g = TypeGraph::new();
        let a = g.add_enum(EnumType::new("Status", ["on", "off"]));
        let b = g.add_enum(EnumType::new("Status", ["open", "closed"]));
        let r = g.add_record(RecordType::new("Door")
            .field(Field::new("light", a))
            .field(Field::new("state", b)));
        let err = introspect(&g, &[Ty::named(r)]).unwrap_err();
        match err {
            CompileError::NamingConflict { name, path, .. } => {
                assert_eq!(name, "Status");
                assert_eq!(path, "Door.state");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn identical_redeclaration_is_folded() {
        let mut g = TypeGraph::new();
        let a = g.add_enum(EnumType::new("Status", ["on", "off"]));
        let b = g.add_enum(EnumType::new("Status", ["on", "off"]));
        let r = g.add_record(RecordType::new("Door")
            .field(Field::new("x", a))
            .field(Field::new("y", b)));
        let intro = introspect(&g, &[Ty::named(r)]).unwrap();
        assert_eq!(intro.len(), 2);
        assert_eq!(intro.canonical(b), a);
        assert_eq!(intro.rule_name(b), Some("status"));
    }

    #[test]
    fn conflict_behind_folded_record_is_found() {
        let mut g = TypeGraph::new();
        let warm = g.add_enum(EnumType::new("Color", ["red", "green"]));
        let cold = g.add_enum(EnumType::new("Color", ["cyan", "magenta"]));
        let a = g.add_record(RecordType::new("Pixel").field(Field::new("c", warm)));
        let b = g.add_record(RecordType::new("Pixel").field(Field::new("c", cold)));
        let scene = g.add_record(RecordType::new("Scene")
            .field(Field::new("p1", a))
            .field(Field::new("p2", b)));
        match introspect(&g, &[Ty::named(scene)]) {
            Err(CompileError::NamingConflict { name, path, .. }) => {
                assert_eq!(name, "Color");
                assert_eq!(path, "Scene.p2.c");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn folded_cycles_terminate() {
        let mut g = TypeGraph::new();
        let a1 = g.declare_record("Alpha");
        let a2 = g.declare_record("Alpha");
        g.define_record(a1, RecordType::new("Alpha").field(Field::new("next", Ty::optional(a1))));
        g.define_record(a2, RecordType::new("Alpha").field(Field::new("next", Ty::optional(a2))));
        let pair = g.add_record(RecordType::new("Pair")
            .field(Field::new("left", a1))
            .field(Field::new("right", a2)));
        let intro = introspect(&g, &[Ty::named(pair)]).unwrap();
        assert_eq!(names(&g, &intro), ["Pair", "Alpha"]);
        assert_eq!(intro.canonical(a2), a1);
    }

    #[test]
    fn colliding_rule_names_conflict() {
        let mut g = TypeGraph::new();
        let a = g.add_enum(EnumType::new("MathOp", ["add"]));
        let b = g.add_enum(EnumType::new("math_op", ["sub"]));
        let r = g.add_record(RecordType::new("Calc").field(Field::new("a", a)).field(Field::new("b", b)));
        assert!(matches!(
            introspect(&g, &[Ty::named(r)]),
            Err(CompileError::NamingConflict { .. })
        ));
    }

    #[test]
    fn reserved_rule_name_conflicts() {
        let mut g = TypeGraph::new();
        let s = g.add_record(RecordType::new("String"));
        assert!(matches!(
            introspect(&g, &[Ty::named(s)]),
            Err(CompileError::NamingConflict { .. })
        ));
    }

    #[test]
    fn integer_float_union_is_ambiguous() {
        let mut g = TypeGraph::new();
        let calc = g.add_record(RecordType::new("Calculator")
            .field(Field::new("number_one", Ty::union([Ty::integer(), Ty::float()]))));
        match introspect(&g, &[Ty::named(calc)]) {
            Err(CompileError::AmbiguousUnion { path, .. }) => assert_eq!(path, "Calculator.number_one"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_primitive_and_null_overlap_are_ambiguous() {
        let mut g = TypeGraph::new();
        let dup = g.add_record(RecordType::new("A").field(Field::new("v", Ty::union([Ty::string(), Ty::string()]))));
        assert!(matches!(introspect(&g, &[Ty::named(dup)]), Err(CompileError::AmbiguousUnion { .. })));

        let nulls = g.add_record(RecordType::new("B")
            .field(Field::new("v", Ty::union([Ty::null(), Ty::optional(Ty::string())]))));
        assert!(matches!(introspect(&g, &[Ty::named(nulls)]), Err(CompileError::AmbiguousUnion { .. })));
    }

    #[test]
    fn distinct_union_is_accepted() {
        let mut g = TypeGraph::new();
        let e = g.add_enum(EnumType::new("Unit", ["kg", "lb"]));
        let r = g.add_record(RecordType::new("Weight")
            .field(Field::new("value", Ty::union([Ty::float(), Ty::string(), Ty::list(Ty::integer()), Ty::named(e)]))));
        let intro = introspect(&g, &[Ty::named(r)]).unwrap();
        assert_eq!(names(&g, &intro), ["Weight", "Unit"]);
    }

    #[test]
    fn single_variant_union_and_nested_optional_unsupported() {
        let mut g = TypeGraph::new();
        let one = g.add_record(RecordType::new("One").field(Field::new("v", Ty::union([Ty::string()]))));
        assert!(matches!(introspect(&g, &[Ty::named(one)]), Err(CompileError::UnsupportedType { .. })));

        let nested = g.add_record(RecordType::new("Nested")
            .field(Field::new("v", Ty::optional(Ty::optional(Ty::string())))));
        assert!(matches!(introspect(&g, &[Ty::named(nested)]), Err(CompileError::UnsupportedType { .. })));
    }

    #[test]
    fn undefined_declaration_and_dangling_id_unsupported() {
        let mut g = TypeGraph::new();
        let pending = g.declare_record("Pending");
        match introspect(&g, &[Ty::named(pending)]) {
            Err(CompileError::UnsupportedType { name, .. }) => assert_eq!(name, "Pending"),
            other => panic!("unexpected {other:?}"),
        }

        let mut other = TypeGraph::new();
        other.add_record(RecordType::new("X"));
        let foreign = other.add_record(RecordType::new("Y"));
        let empty = TypeGraph::new();
        assert!(matches!(introspect(&empty, &[Ty::named(foreign)]), Err(CompileError::UnsupportedType { .. })));
    }

    #[test]
    fn invalid_enums() {
        let mut g = TypeGraph::new();
        let empty = g.add_enum(EnumType::new("Nothing", Vec::<String>::new()));
        assert!(matches!(introspect(&g, &[Ty::named(empty)]), Err(CompileError::InvalidEnum { .. })));
        let dup = g.add_enum(EnumType::new("Twice", ["a", "a"]));
        assert!(matches!(introspect(&g, &[Ty::named(dup)]), Err(CompileError::InvalidEnum { .. })));
    }
}
