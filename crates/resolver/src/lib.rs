//! Template-expression resolver.
//!
//! Steps reference values produced by earlier steps through `${...}`
//! placeholders, e.g. `${previous_response.id}` or
//! `${array_length(response.items)}`. This crate parses those placeholders
//! lazily at resolution time and evaluates them against the scenario's
//! response-history stack. Resolution is pure: it never mutates the stack,
//! and it always reads the stack as it stood before the current step is
//! appended (the dispatcher pushes the current result only afterwards).

mod errors;
mod expr;
mod template;

pub use errors::ResolveError;
pub use expr::{Accessor, Expr, Function, Segment};
pub use template::{contains_placeholder, resolve_string, resolve_template, resolve_value};
