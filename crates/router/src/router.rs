use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use stepchain_core_types::{StepKind, StepRole};
use tracing::{debug, warn};

use crate::classifier::{Classification, ClassifierOrigin, ClassifyRequest, StepClassifier};
use crate::keywords::KeywordClassifier;

/// Verbs that make a `Given` step a real action instead of a context
/// acknowledgment.
static ACTION_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(get|post|put|delete|patch|send|call|click|open|navigate|visit|type|fill|enter|submit|login|log in|sign in|upload|download)\b")
        .expect("action verb regex")
});

/// Assertion phrasing that pins a continuation step to the validation lane.
static ASSERTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(should|must|expect|verify|assert|equals?|contains?|matches)\b")
        .expect("assertion regex")
});

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Minimum LLM confidence to accept its verdict.
    pub confidence_threshold: f32,
    /// Hard bound on the LLM lane; the keyword lane must stay reachable
    /// even when the model call stalls.
    pub llm_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            llm_timeout: Duration::from_secs(8),
        }
    }
}

/// Two-lane classifier with a fixed role policy in front.
///
/// Policy first, then the LLM lane (bounded, threshold-gated), then the
/// deterministic keyword fallback. All three produce the same three-valued
/// verdict.
pub struct Router {
    llm: Option<Arc<dyn StepClassifier>>,
    fallback: KeywordClassifier,
    config: RouterConfig,
}

impl Router {
    pub fn new(llm: Option<Arc<dyn StepClassifier>>, config: RouterConfig) -> Self {
        Self {
            llm,
            fallback: KeywordClassifier::new(),
            config,
        }
    }

    /// Keyword-only router, for offline runs and tests.
    pub fn keyword_only() -> Self {
        Self::new(None, RouterConfig::default())
    }

    pub async fn route(&self, request: &ClassifyRequest) -> Classification {
        if let Some(verdict) = self.role_policy(request) {
            return verdict;
        }

        if let Some(llm) = &self.llm {
            match tokio::time::timeout(self.config.llm_timeout, llm.classify(request)).await {
                Ok(Ok(verdict)) if verdict.confidence >= self.config.confidence_threshold => {
                    debug!(
                        kind = %verdict.kind,
                        confidence = verdict.confidence,
                        "accepted LLM classification"
                    );
                    return verdict;
                }
                Ok(Ok(verdict)) => {
                    debug!(
                        kind = %verdict.kind,
                        confidence = verdict.confidence,
                        threshold = self.config.confidence_threshold,
                        "LLM confidence below threshold, using keyword fallback"
                    );
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "LLM classifier unavailable, using keyword fallback");
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.llm_timeout.as_millis() as u64,
                        "LLM classifier timed out, using keyword fallback"
                    );
                }
            }
        }

        self.fallback.classify(&request.text)
    }

    /// Role policy:
    /// - `Given` without an explicit action verb is an acknowledgment, not a
    ///   call; it produces a synthetic validation result.
    /// - `Then` always inspects prior results and never triggers a new call.
    /// - `And`/`But` phrased as an assertion follow the same rule; an
    ///   `And I click ...` continuation still classifies normally.
    fn role_policy(&self, request: &ClassifyRequest) -> Option<Classification> {
        let policy = |kind| Some(Classification::new(kind, 1.0, ClassifierOrigin::Policy));
        match request.role {
            StepRole::Given if !ACTION_VERB_RE.is_match(&request.text) => {
                policy(StepKind::Validation)
            }
            StepRole::Then => policy(StepKind::Validation),
            role if role.is_continuation() && ASSERTION_RE.is_match(&request.text) => {
                policy(StepKind::Validation)
            }
            _ => None,
        }
    }
}
