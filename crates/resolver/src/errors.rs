use thiserror::Error;

/// Errors produced while parsing or evaluating a `${...}` expression.
///
/// All of these surface as failed step results, not panics; the scenario
/// continues only if a later assertion expected the failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The placeholder body does not match the expression grammar.
    #[error("malformed expression '{0}'")]
    Syntax(String),

    /// The path root is not one of the registered accessor keywords.
    #[error("unknown accessor root '{0}'")]
    UnknownRoot(String),

    /// A path segment named a field or list index that does not exist.
    #[error("field '{segment}' not found while resolving '{expr}'")]
    FieldNotFound { expr: String, segment: String },

    /// A relative accessor reached past the bottom of the stack.
    #[error("accessor '{accessor}' needs {needed} prior result(s), stack holds {depth}")]
    IndexOutOfRange {
        accessor: String,
        needed: usize,
        depth: usize,
    },

    /// `array_length` was applied to a value that is not list-shaped.
    #[error("array_length applied to non-array value in '{0}'")]
    NotAnArray(String),

    /// A coercion function could not convert the evaluated value.
    #[error("cannot coerce value in '{expr}': {message}")]
    Coercion { expr: String, message: String },
}
