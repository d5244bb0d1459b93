//! Step dispatcher and scenario lifecycle.
//!
//! The dispatcher takes one classified step at a time, resolves its `${...}`
//! placeholders against the scenario's response-history stack, hands the
//! resolved payload to the matching executor, and appends the structured
//! result to the stack. Executor and resolution failures are recorded as
//! data on the result; they never unwind through the dispatcher.
//!
//! The lifecycle manager brackets each scenario: a pristine context before
//! the first step, teardown of the browser session after the last one,
//! regardless of how the scenario ended.

mod dispatch;
mod executors;
mod lifecycle;
mod validate;

pub use dispatch::Dispatcher;
pub use executors::{ApiExecutor, ApiResponse, BrowserExecutor, BrowserReply, ExecutorError};
pub use lifecycle::{ContextManager, LifecycleError};
pub use validate::ValidationVerdict;
