//! Compile type descriptors (records, enums, lists, optionals, unions) into a
//! GBNF grammar for constrained decoding, plus matching prompt documentation.
//!
//! ```no_run
//! use json_gbnf::{compile, CompileOptions, EnumType, Field, RecordType, Ty, TypeGraph};
//!
//! let mut graph = TypeGraph::new();
//! let category = graph.add_enum(EnumType::new("Category", ["Fiction", "Non-Fiction"]));
//! let book = graph.add_record(RecordType::new("Book")
//!     .field(Field::new("title", Ty::string()))
//!     .field(Field::new("category", category)));
//!
//! let out = compile(&graph, &[Ty::named(book)], &CompileOptions::default())?;
//! println!("{}\n{}", out.grammar(), out.documentation());
//! # Ok::<(), json_gbnf::CompileError>(())
//! ```
pub mod compiler;
pub mod decl;
pub mod docs;
pub mod error;
pub mod grammar;
pub mod introspect;
pub mod ir;
pub mod naming;
mod path_de;

pub use compiler::{compile, CompileOptions, Compiled};
pub use decl::DeclFile;
pub use error::{CompileError, DeclError, GrammarError};
pub use grammar::Grammar;
pub use ir::{EnumType, Field, NamedType, Prim, RecordType, Ty, TypeGraph, TypeId};
