use thiserror::Error;

/// Everything that can stop a compilation. No variant ever comes with partial
/// output: the facade returns either both artifacts or one of these.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("no root types were supplied")]
    EmptyRootList,

    #[error("naming conflict for `{name}` at {path}: {reason}")]
    NamingConflict { name: String, path: String, reason: String },

    #[error("unsupported type `{name}` at {path}: {reason}")]
    UnsupportedType { name: String, path: String, reason: String },

    #[error("ambiguous union at {path}: {reason}")]
    AmbiguousUnion { path: String, reason: String },

    #[error("invalid enum `{name}`: {reason}")]
    InvalidEnum { name: String, reason: String },

    #[error("outer wrapper needs both `outer_object_name` and `outer_object_content`")]
    IncompleteOuterWrapper,

    #[error("emitted grammar is not self-contained: {0}")]
    Grammar(#[from] GrammarError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax { line: usize, column: usize, message: String },

    #[error("rule `{rule}` referenced by `{referenced_by}` is never defined")]
    UndefinedRule { rule: String, referenced_by: String },

    #[error("rule `{rule}` is defined more than once")]
    DuplicateRule { rule: String },

    #[error("missing rule `{rule}`")]
    MissingRule { rule: String },

    #[error("input nests deeper than {limit} rule levels")]
    NestingTooDeep { limit: usize },
}

/// Problems reading a declaration file, before any compilation starts.
#[derive(Debug, Error)]
pub enum DeclError {
    #[error("at JSON path {path} → {message}")]
    Syntax { path: String, message: String },

    #[error("type `{name}` is declared more than once")]
    DuplicateDeclaration { name: String },

    #[error("unknown type `{name}` referenced from {at}")]
    UnknownType { name: String, at: String },

    #[error("`{name}` is a primitive type name and cannot be declared")]
    ReservedName { name: String },
}
