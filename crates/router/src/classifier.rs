use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepchain_core_types::{StepKind, StepRole};
use thiserror::Error;

/// Errors emitted by the classification lanes.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The LLM lane could not be reached or timed out; callers degrade to
    /// the keyword fallback, this is never fatal.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The LLM answered, but not with a usable verdict.
    #[error("classifier returned an invalid verdict: {0}")]
    InvalidVerdict(String),
}

/// Which lane produced a verdict.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierOrigin {
    /// Fixed role policy (Given acknowledgments, Then assertions).
    Policy,
    Llm,
    Keyword,
}

/// A classification verdict: the lane plus the classifier's confidence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: StepKind,
    pub confidence: f32,
    pub origin: ClassifierOrigin,
}

impl Classification {
    pub fn new(kind: StepKind, confidence: f32, origin: ClassifierOrigin) -> Self {
        Self {
            kind,
            confidence,
            origin,
        }
    }
}

/// Everything a classifier sees about the step under decision.
#[derive(Clone, Debug)]
pub struct ClassifyRequest {
    pub text: String,
    pub role: StepRole,
    /// Kinds of the most recent prior steps, newest last.
    pub recent_kinds: Vec<StepKind>,
}

impl ClassifyRequest {
    pub fn new(text: impl Into<String>, role: StepRole, recent_kinds: Vec<StepKind>) -> Self {
        Self {
            text: text.into(),
            role,
            recent_kinds,
        }
    }
}

/// Capability trait for the primary classification lane, so multiple vendors
/// (or a deterministic mock) can plug into the router.
#[async_trait]
pub trait StepClassifier: Send + Sync {
    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification, RouterError>;
}
