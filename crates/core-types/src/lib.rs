//! Shared primitives for the stepchain scenario execution engine.
//!
//! Everything that crosses a crate seam lives here: step roles and kinds,
//! resolved payloads, step outcomes, and the scenario definition format the
//! runner consumes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for one scenario run.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ScenarioId(pub String);

impl ScenarioId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ScenarioId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gherkin role of a step line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepRole {
    Given,
    When,
    Then,
    And,
    But,
}

impl StepRole {
    /// `And`/`But` inherit intent from their neighbours; everything else is
    /// explicit.
    pub fn is_continuation(self) -> bool {
        matches!(self, StepRole::And | StepRole::But)
    }
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepRole::Given => "Given",
            StepRole::When => "When",
            StepRole::Then => "Then",
            StepRole::And => "And",
            StepRole::But => "But",
        };
        write!(f, "{label}")
    }
}

/// Lane a step is routed into.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Api,
    Browser,
    Validation,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepKind::Api => "api",
            StepKind::Browser => "browser",
            StepKind::Validation => "validation",
        };
        write!(f, "{label}")
    }
}

/// Fully resolved API call, ready for the API executor.
///
/// Endpoints are always fully qualified; the executor rejects relative paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: String,
    pub endpoint: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            endpoint: endpoint.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Resolved natural-language browser instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrowserInstruction {
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
}

impl BrowserInstruction {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            element: None,
        }
    }
}

/// The resolved payload handed to an executor, recorded on the step result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "lane", rename_all = "lowercase")]
pub enum ResolvedPayload {
    Api(ApiRequest),
    Browser(BrowserInstruction),
    Validation { assertion: String },
}

/// Machine-readable failure classification carried on a step result.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// A `${...}` path named a missing field.
    FieldNotFound,
    /// A relative accessor reached past the bottom of the stack.
    IndexOutOfRange,
    /// `array_length` was applied to a non-list value.
    NotAnArray,
    /// Any other expression-resolution failure (syntax, unknown root,
    /// failed coercion).
    Expression,
    /// The API or browser executor failed (network, driver, bad endpoint).
    Executor,
    /// A validation step computed a failing verdict.
    Assertion,
}

/// Failure recorded as data on a step result, never raised past the
/// dispatcher.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn executor(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Executor, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Assertion, message)
    }
}

/// Structured result of one executor round trip.
///
/// API lanes populate `status`/`headers` and parse structured bodies into
/// `body`; browser lanes store the human-readable log as `Value::String`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepOutcome {
    pub fn failed(error: StepError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Immutable record of one executed step.
///
/// Once pushed onto the history stack a result is never mutated; later steps
/// read it through the relative accessors only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub kind: StepKind,
    pub role: StepRole,
    pub text: String,
    /// The resolved request/instruction sent to the executor. `None` when
    /// expression resolution failed before anything could be dispatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResolvedPayload>,
    pub outcome: StepOutcome,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StepResult {
    /// True when the step performed an externally visible call.
    pub fn is_action(&self) -> bool {
        !matches!(self.kind, StepKind::Validation)
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.error.is_none()
    }
}

/// One Given/When/Then line from a scenario definition file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    pub role: StepRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl StepDef {
    pub fn new(role: StepRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// An ordered sequence of steps sharing one scenario context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDef {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<StepDef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_role_parses_lowercase() {
        let role: StepRole = serde_json::from_str("\"given\"").unwrap();
        assert_eq!(role, StepRole::Given);
        assert!(StepRole::And.is_continuation());
        assert!(!StepRole::When.is_continuation());
    }

    #[test]
    fn api_request_upcases_method() {
        let request = ApiRequest::new("post", "https://api.example.com/users")
            .with_body(json!({"name": "Leanne"}));
        assert_eq!(request.method, "POST");
        assert!(request.body.is_some());
    }

    #[test]
    fn step_result_action_flags() {
        let result = StepResult {
            kind: StepKind::Validation,
            role: StepRole::Then,
            text: "the response status code should be 200".into(),
            payload: Some(ResolvedPayload::Validation {
                assertion: "the response status code should be 200".into(),
            }),
            outcome: StepOutcome::default(),
            timestamp: Utc::now(),
            duration_ms: 0,
        };
        assert!(!result.is_action());
        assert!(result.succeeded());

        let failed = StepOutcome::failed(StepError::executor("connection refused"));
        assert_eq!(
            failed.error.as_ref().map(|e| e.kind),
            Some(StepErrorKind::Executor)
        );
    }
}
