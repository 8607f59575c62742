// Strongly-typed type graph. Named types live in an arena and are referenced by `TypeId`,
// so records can point back at themselves (or at an ancestor) without owning cycles.

use std::fmt;

/// Index of a named type inside a [`TypeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl TypeId {
    pub fn index(self) -> usize { self.0 }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primitive JSON value kinds. Declaration order is also the order the
/// primitive rules are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prim {
    String,
    Integer,
    Float,
    Boolean,
    Null,
}

impl Prim {
    pub const ALL: [Prim; 5] = [Prim::String, Prim::Integer, Prim::Float, Prim::Boolean, Prim::Null];

    /// Name used both as the GBNF rule name and in documentation prose.
    pub fn name(self) -> &'static str {
        match self {
            Prim::String  => "string",
            Prim::Integer => "integer",
            Prim::Float   => "float",
            Prim::Boolean => "boolean",
            Prim::Null    => "null",
        }
    }

    pub fn from_name(name: &str) -> Option<Prim> {
        Prim::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Inline type expression. Only `Named` points into the arena; containers and
/// unions are structural and never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Prim(Prim),
    Named(TypeId),
    List(Box<Ty>),          // zero-or-more
    Optional(Box<Ty>),      // value or null
    Union(Vec<Ty>),         // declared order is alternation order
}

impl Ty {
    pub fn string() -> Self { Ty::Prim(Prim::String) }
    pub fn integer() -> Self { Ty::Prim(Prim::Integer) }
    pub fn float() -> Self { Ty::Prim(Prim::Float) }
    pub fn boolean() -> Self { Ty::Prim(Prim::Boolean) }
    pub fn null() -> Self { Ty::Prim(Prim::Null) }
    pub fn named(id: TypeId) -> Self { Ty::Named(id) }
    pub fn list(item: impl Into<Ty>) -> Self { Ty::List(Box::new(item.into())) }
    pub fn optional(item: impl Into<Ty>) -> Self { Ty::Optional(Box::new(item.into())) }
    pub fn union<I>(variants: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Ty>,
    {
        Ty::Union(variants.into_iter().map(Into::into).collect())
    }

    /// Named types referenced anywhere inside this expression, in traversal order.
    pub fn named_refs(&self) -> Vec<TypeId> {
        fn go(ty: &Ty, out: &mut Vec<TypeId>) {
            match ty {
                Ty::Prim(_) => {}
                Ty::Named(id) => {
                    if !out.contains(id) { out.push(*id); }
                }
                Ty::List(inner) | Ty::Optional(inner) => go(inner, out),
                Ty::Union(variants) => variants.iter().for_each(|v| go(v, out)),
            }
        }
        let mut out = Vec::new();
        go(self, &mut out);
        out
    }
}

impl From<Prim> for Ty {
    fn from(p: Prim) -> Self { Ty::Prim(p) }
}

impl From<TypeId> for Ty {
    fn from(id: TypeId) -> Self { Ty::Named(id) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Ty,
    pub description: String,
    pub required: bool,      // false: the key may be left out of the object
}

impl Field {
    pub fn new(name: impl Into<String>, ty: impl Into<Ty>) -> Self {
        Self { name: name.into(), ty: ty.into(), description: String::new(), required: true }
    }

    /// A field whose key may be omitted entirely.
    pub fn omittable(name: impl Into<String>, ty: impl Into<Ty>) -> Self {
        Self { required: false, ..Self::new(name, ty) }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<Field>,  // declaration order drives grammar and docs
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, fields: Vec::new() }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

impl EnumType {
    pub fn new<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedType {
    Record(RecordType),
    Enum(EnumType),
    /// Forward declaration, waiting for `TypeGraph::define_record`.
    Declared { name: String },
}

impl NamedType {
    pub fn name(&self) -> &str {
        match self {
            NamedType::Record(r) => &r.name,
            NamedType::Enum(e) => &e.name,
            NamedType::Declared { name } => name,
        }
    }
}

/// Arena of named types for one compilation.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    nodes: Vec<NamedType>,
}

impl TypeGraph {
    pub fn new() -> Self { Self::default() }

    fn push(&mut self, node: NamedType) -> TypeId {
        self.nodes.push(node);
        TypeId(self.nodes.len() - 1)
    }

    pub fn add_record(&mut self, record: RecordType) -> TypeId {
        self.push(NamedType::Record(record))
    }

    pub fn add_enum(&mut self, enum_: EnumType) -> TypeId {
        self.push(NamedType::Enum(enum_))
    }

    /// Reserve an id for a record so its fields (or other records) can refer
    /// to it before it is defined.
    pub fn declare_record(&mut self, name: impl Into<String>) -> TypeId {
        self.push(NamedType::Declared { name: name.into() })
    }

    /// Fill in a forward declaration. Returns `false` (and leaves the graph
    /// untouched) if `id` is unknown or does not name a pending declaration
    /// with the same name.
    pub fn define_record(&mut self, id: TypeId, record: RecordType) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(slot @ NamedType::Declared { .. }) if slot.name() == record.name => {
                *slot = NamedType::Record(record);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&NamedType> {
        self.nodes.get(id.0)
    }

    pub fn name(&self, id: TypeId) -> Option<&str> {
        self.get(id).map(NamedType::name)
    }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &NamedType)> {
        self.nodes.iter().enumerate().map(|(i, n)| (TypeId(i), n))
    }

    /// Structural equality of two arena entries. Named references are compared
    /// by the name they resolve to, which keeps the comparison shallow on
    /// cyclic graphs; the referenced types themselves are not compared.
    pub fn same_shape(&self, a: TypeId, b: TypeId) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(NamedType::Enum(x)), Some(NamedType::Enum(y))) => x == y,
            (Some(NamedType::Record(x)), Some(NamedType::Record(y))) => {
                x.name == y.name
                    && x.description == y.description
                    && x.fields.len() == y.fields.len()
                    && x.fields.iter().zip(&y.fields).all(|(fx, fy)| {
                        fx.name == fy.name
                            && fx.description == fy.description
                            && fx.required == fy.required
                            && self.same_ty(&fx.ty, &fy.ty)
                    })
            }
            _ => false,
        }
    }

    fn same_ty(&self, a: &Ty, b: &Ty) -> bool {
        match (a, b) {
            (Ty::Prim(x), Ty::Prim(y)) => x == y,
            (Ty::Named(x), Ty::Named(y)) => x == y || self.name(*x) == self.name(*y),
            (Ty::List(x), Ty::List(y)) | (Ty::Optional(x), Ty::Optional(y)) => self.same_ty(x, y),
            (Ty::Union(xs), Ty::Union(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.same_ty(x, y))
            }
            _ => false,
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
