use std::sync::Arc;

use stepchain_context::{ScenarioContext, ScenarioMeta};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::executors::BrowserExecutor;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A context handed out for a new scenario already carried state. This
    /// is fatal: isolation between scenarios cannot be trusted any more.
    #[error("context leak detected for scenario '{0}': state present before the first step")]
    ContextLeak(String),
}

/// Brackets every scenario with a fresh context and a guaranteed teardown.
///
/// `open` hands out a pristine context or refuses; `close` tears down the
/// browser session on every exit path, pass or fail.
pub struct ContextManager {
    browser: Arc<dyn BrowserExecutor>,
}

impl ContextManager {
    pub fn new(browser: Arc<dyn BrowserExecutor>) -> Self {
        Self { browser }
    }

    pub fn open(&self, meta: ScenarioMeta) -> Result<ScenarioContext, LifecycleError> {
        let context = ScenarioContext::new(meta);
        if !context.is_pristine() {
            return Err(LifecycleError::ContextLeak(context.meta.name));
        }
        info!(scenario = %context.meta.name, run_id = %context.run_id, "scenario context opened");
        Ok(context)
    }

    /// Consume the context and close the scenario's browser session. Session
    /// teardown failures are logged, not raised; the context is gone either
    /// way.
    pub async fn close(&self, context: ScenarioContext) {
        if let Err(err) = self.browser.close_session().await {
            warn!(scenario = %context.meta.name, error = %err, "browser session teardown failed");
        }
        debug!(
            scenario = %context.meta.name,
            steps = context.stack.len(),
            "scenario context closed"
        );
    }
}
