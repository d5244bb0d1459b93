//! Classifier/router for scenario steps.
//!
//! Decides whether a step is an API call, a browser instruction, or a pure
//! assertion. The primary lane delegates to an LLM-backed classifier behind
//! the [`StepClassifier`] trait; when that lane is unavailable, times out,
//! or reports low confidence, a deterministic keyword scorer takes over.
//! Both lanes produce the same three-valued verdict so the dispatcher sees
//! one uniform contract. Classification is read-only over the step text.

mod classifier;
mod keywords;
mod llm;
mod router;

pub use classifier::{
    Classification, ClassifierOrigin, ClassifyRequest, RouterError, StepClassifier,
};
pub use keywords::KeywordClassifier;
pub use llm::{LlmClassifier, LlmClassifierConfig};
pub use router::{Router, RouterConfig};
