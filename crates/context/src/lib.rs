//! Scenario-scoped state for the stepchain engine.
//!
//! A [`ScenarioContext`] is created fresh for every scenario and owns the
//! [`ResponseHistoryStack`], the auth token slot, and the UI-captured field
//! map. Nothing in this crate performs I/O; the dispatcher is the only
//! mutator, and only between steps.

mod context;
mod stack;

pub use context::{ScenarioContext, ScenarioMeta};
pub use stack::ResponseHistoryStack;
