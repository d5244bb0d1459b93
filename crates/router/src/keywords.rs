use stepchain_core_types::StepKind;

use crate::classifier::{Classification, ClassifierOrigin};

/// Browser-indicative phrases, matched against the lower-cased step text.
const BROWSER_KEYWORDS: &[&str] = &[
    "click",
    "tap",
    "press",
    "navigate",
    "go to",
    "open the",
    "visit",
    "browse",
    "type",
    "fill",
    "scroll",
    "button",
    "link",
    "page",
    "field",
    "form",
    "dropdown",
    "checkbox",
    "menu",
    "modal",
    "screenshot",
    "browser",
    "tab",
    "see on the",
    "login page",
];

/// API-indicative phrases.
const API_KEYWORDS: &[&str] = &[
    "get ",
    "post ",
    "put ",
    "delete ",
    "patch ",
    "endpoint",
    "api",
    "request",
    "response",
    "status code",
    "json",
    "header",
    "payload",
    "bearer",
    "token",
    "http",
];

/// Deterministic fallback classifier.
///
/// Each keyword list contributes +1 per match found in the lower-cased step
/// text. Ties break in favour of `api`: misrouting a validation into a live
/// browser session is riskier than an extra cheap API call.
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        let browser_score = score(&lowered, BROWSER_KEYWORDS);
        let api_score = score(&lowered, API_KEYWORDS);

        let kind = if browser_score > api_score {
            StepKind::Browser
        } else {
            StepKind::Api
        };

        Classification::new(
            kind,
            confidence(browser_score, api_score),
            ClassifierOrigin::Keyword,
        )
    }
}

fn score(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

/// Map the score margin into 0.5..=0.9 so the router can log a meaningful
/// figure. The fallback verdict is always accepted regardless.
fn confidence(browser_score: usize, api_score: usize) -> f32 {
    let total = (browser_score + api_score).max(1) as f32;
    let margin = browser_score.abs_diff(api_score) as f32 / total;
    0.5 + 0.4 * margin.min(1.0)
}
