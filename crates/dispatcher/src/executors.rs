use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use stepchain_core_types::{ApiRequest, BrowserInstruction};
use thiserror::Error;

/// Failures raised by an executor. The dispatcher converts these into
/// `StepError::Executor` on the step result; they never abort the scenario
/// by themselves.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("request rejected: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("browser instruction failed: {0}")]
    Instruction(String),
}

/// What the API lane hands back for one HTTP round trip.
///
/// Non-2xx statuses are still successful round trips; only transport-level
/// failures become [`ExecutorError`]s.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body when the response carried one, otherwise the raw
    /// text as `Value::String`.
    pub body: Option<Value>,
}

/// What the browser lane hands back after acting on an instruction.
#[derive(Debug, Clone, Default)]
pub struct BrowserReply {
    /// Human-readable log of what the automation did or observed.
    pub text: String,
    /// Field values read off the rendered page, merged into the scenario's
    /// `ui_fields` map.
    pub fields: HashMap<String, String>,
    /// Bearer token surfaced by the page, if the flow exposed one.
    pub token: Option<String>,
}

/// API lane: performs one fully resolved HTTP request.
#[async_trait]
pub trait ApiExecutor: Send + Sync {
    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, ExecutorError>;
}

/// Browser lane: runs one natural-language instruction inside the
/// scenario's browser session.
#[async_trait]
pub trait BrowserExecutor: Send + Sync {
    async fn run(&self, instruction: &BrowserInstruction) -> Result<BrowserReply, ExecutorError>;

    /// Tear down the scenario's browser session. Called by the lifecycle
    /// manager on every exit path.
    async fn close_session(&self) -> Result<(), ExecutorError>;
}
