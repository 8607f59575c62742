//! Declaration files: a JSON description of a type graph, its roots, and the
//! compile options, so the compiler can be driven without writing Rust.
//!
//! ```json
//! {
//!   "types": [
//!     { "enum": "Category", "values": ["Fiction", "Non-Fiction"] },
//!     { "record": "Book", "fields": [
//!         { "name": "title", "type": "string" },
//!         { "name": "keywords", "type": { "list": "string" } },
//!         { "name": "category", "type": "Category" }
//!     ] }
//!   ],
//!   "roots": ["Book"]
//! }
//! ```
//!
//! Types may reference each other in any order, cycles included.
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::compiler::CompileOptions;
use crate::error::DeclError;
use crate::ir::{EnumType, Field, Prim, RecordType, Ty, TypeGraph, TypeId};
use crate::path_de;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclFile {
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    pub roots: Vec<TypeExpr>,
    #[serde(default)]
    pub options: CompileOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeDecl {
    Record(RecordDecl),
    Enum(EnumDecl),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordDecl {
    #[serde(rename = "record")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDecl {
    #[serde(rename = "enum")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool { true }

/// `"string"`, `"Book"`, `{"list": T}`, `{"optional": T}`, `{"union": [T, ...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeExpr {
    Name(String),
    Composite(CompositeExpr),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeExpr {
    List(Box<TypeExpr>),
    Optional(Box<TypeExpr>),
    Union(Vec<TypeExpr>),
}

impl TypeDecl {
    pub fn name(&self) -> &str {
        match self {
            TypeDecl::Record(r) => &r.name,
            TypeDecl::Enum(e) => &e.name,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl std::str::FromStr for DeclFile {
    type Err = DeclError;
    fn from_str(src: &str) -> Result<Self, DeclError> {
        path_de::from_str_with_path(src)
    }
}

impl DeclFile {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DeclError> {
        path_de::from_slice_with_path(bytes)
    }

    /// Build the type graph. Every name is declared first, then record bodies
    /// are resolved, so forward references and cycles need no special order.
    pub fn into_graph(self) -> Result<(TypeGraph, Vec<Ty>, CompileOptions), DeclError> {
        let mut graph = TypeGraph::new();
        let mut ids: IndexMap<String, TypeId> = IndexMap::new();

        for decl in &self.types {
            let name = decl.name();
            if Prim::from_name(name).is_some() {
                return Err(DeclError::ReservedName { name: name.to_string() });
            }
            if ids.contains_key(name) {
                return Err(DeclError::DuplicateDeclaration { name: name.to_string() });
            }
            let id = match decl {
                TypeDecl::Record(r) => graph.declare_record(r.name.clone()),
                TypeDecl::Enum(e) => {
                    let mut enum_type = EnumType::new(e.name.clone(), e.values.iter().cloned());
                    enum_type.description = e.description.clone();
                    graph.add_enum(enum_type)
                }
            };
            ids.insert(name.to_string(), id);
        }

        let resolver = Resolver { ids: &ids };
        for decl in self.types {
            let TypeDecl::Record(r) = decl else { continue };
            let id = ids[r.name.as_str()];
            let mut record = RecordType::new(r.name.clone());
            record.description = r.description;
            for f in r.fields {
                let at = format!("{}.{}", r.name, f.name);
                let ty = resolver.resolve(&f.ty, &at)?;
                let mut field = if f.required { Field::new(f.name, ty) } else { Field::omittable(f.name, ty) };
                field.description = f.description;
                record.fields.push(field);
            }
            graph.define_record(id, record);
        }

        let roots = self
            .roots
            .iter()
            .enumerate()
            .map(|(i, root)| resolver.resolve(root, &format!("roots[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(types = graph.len(), roots = roots.len(), "declaration file loaded");
        Ok((graph, roots, self.options))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

struct Resolver<'a> {
    ids: &'a IndexMap<String, TypeId>,
}

impl Resolver<'_> {
    fn resolve(&self, expr: &TypeExpr, at: &str) -> Result<Ty, DeclError> {
        match expr {
            TypeExpr::Name(name) => {
                if let Some(prim) = Prim::from_name(name) {
                    return Ok(Ty::Prim(prim));
                }
                self.ids.get(name.as_str()).map(|id| Ty::Named(*id)).ok_or_else(|| {
                    DeclError::UnknownType { name: name.clone(), at: at.to_string() }
                })
            }
            TypeExpr::Composite(CompositeExpr::List(item)) => {
                Ok(Ty::list(self.resolve(item, &format!("{at}[]"))?))
            }
            TypeExpr::Composite(CompositeExpr::Optional(item)) => {
                Ok(Ty::optional(self.resolve(item, &format!("{at}?"))?))
            }
            TypeExpr::Composite(CompositeExpr::Union(variants)) => {
                let variants = variants
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.resolve(v, &format!("{at}|{i}")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Ty::Union(variants))
            }
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
