use serde::{Deserialize, Serialize};
use stepchain_core_types::StepResult;

/// Append-only record of all prior step results within one scenario.
///
/// Insertion order is execution order. Entries are immutable once pushed;
/// accessors hand out shared references only. The stack is exclusively owned
/// by its scenario context and is never shared across scenarios.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseHistoryStack {
    entries: Vec<StepResult>,
}

impl ResponseHistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished step. Called exactly once per step, after its
    /// expressions were resolved against the stack as it stood before.
    pub fn push(&mut self, result: StepResult) {
        self.entries.push(result);
    }

    /// Most recent entry: the `response` accessor.
    pub fn last(&self) -> Option<&StepResult> {
        self.entries.last()
    }

    /// Entry `n` back from the most recent one. `nth_from_end(1)` is
    /// `previous_response`, `nth_from_end(2)` is `second_to_last_response`.
    /// Returns `None` when `n` exceeds the stack depth; callers surface that
    /// as an `IndexOutOfRange` failure.
    pub fn nth_from_end(&self, n: usize) -> Option<&StepResult> {
        self.entries.len().checked_sub(n + 1).map(|i| &self.entries[i])
    }

    /// Entry by absolute position (execution order, 0-based).
    pub fn get(&self, index: usize) -> Option<&StepResult> {
        self.entries.get(index)
    }

    /// Most recent entry that performed an externally visible call, together
    /// with its absolute position. Validation steps inspect this one.
    pub fn last_action(&self) -> Option<(usize, &StepResult)> {
        self.nth_action_from_end(0)
    }

    /// Action entry `n` back from the most recent action, with its absolute
    /// position. Validation entries are transparent here: the accessor
    /// keywords address prior actions, and a verdict pushed in between must
    /// not shift what `response` refers to.
    pub fn nth_action_from_end(&self, n: usize) -> Option<(usize, &StepResult)> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, result)| result.is_action())
            .nth(n)
    }

    /// Number of action entries on the stack.
    pub fn action_count(&self) -> usize {
        self.entries.iter().filter(|result| result.is_action()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.entries.iter()
    }
}
