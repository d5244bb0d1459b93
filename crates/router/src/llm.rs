use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use stepchain_core_types::StepKind;

use crate::classifier::{
    Classification, ClassifierOrigin, ClassifyRequest, RouterError, StepClassifier,
};

const RUBRIC: &str = "You classify one natural-language test step into exactly one lane. \
Lanes: 'api' (the step performs an HTTP call against a service), 'browser' (the step drives \
a web page: navigation, clicks, typing, reading the screen), 'validation' (the step only \
asserts over results already produced; it must not trigger any new call). \
Use the step role and the kinds of recent steps as context. \
Respond with a JSON object: {\"kind\": \"api|browser|validation\", \"confidence\": 0.0-1.0}.";

/// Connection settings for the chat-completions classifier.
#[derive(Debug, Clone)]
pub struct LlmClassifierConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// LLM-backed classification lane speaking the chat-completions protocol.
pub struct LlmClassifier {
    client: Client,
    config: LlmClassifierConfig,
}

impl LlmClassifier {
    pub fn new(config: LlmClassifierConfig) -> Result<Self, RouterError> {
        if config.api_key.trim().is_empty() {
            return Err(RouterError::Unavailable(
                "missing API key for LLM classifier".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                RouterError::Unavailable(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { client, config })
    }

    fn user_prompt(request: &ClassifyRequest) -> String {
        let recent = if request.recent_kinds.is_empty() {
            "none".to_string()
        } else {
            request
                .recent_kinds
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "Step role: {}\nRecent step kinds: {recent}\nStep text: {}",
            request.role, request.text
        )
    }
}

#[async_trait]
impl StepClassifier for LlmClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> Result<Classification, RouterError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: RUBRIC.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::user_prompt(request),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| RouterError::Unavailable(format!("classifier request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(RouterError::Unavailable(format!(
                "classifier returned {status}: {text}"
            )));
        }

        let response: ChatCompletionResponse = response.json().await.map_err(|err| {
            RouterError::InvalidVerdict(format!("classifier response invalid: {err}"))
        })?;

        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| {
                RouterError::InvalidVerdict("classifier response missing content".to_string())
            })?;

        let json = extract_json_object(content).ok_or_else(|| {
            RouterError::InvalidVerdict(format!("no JSON verdict in '{content}'"))
        })?;

        let verdict: Verdict = serde_json::from_str(json)
            .map_err(|err| RouterError::InvalidVerdict(format!("bad verdict JSON: {err}")))?;

        let kind = match verdict.kind.as_str() {
            "api" => StepKind::Api,
            "browser" => StepKind::Browser,
            "validation" => StepKind::Validation,
            other => {
                return Err(RouterError::InvalidVerdict(format!(
                    "unknown lane '{other}'"
                )))
            }
        };

        Ok(Classification::new(
            kind,
            verdict.confidence.clamp(0.0, 1.0),
            ClassifierOrigin::Llm,
        ))
    }
}

/// Pull the first balanced `{...}` object out of a chat reply, tolerating
/// prose or code fences around it.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in content[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    kind: String,
    #[serde(default)]
    confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_reply() {
        let content = "Here you go:\n```json\n{\"kind\": \"browser\", \"confidence\": 0.9}\n```";
        let json = extract_json_object(content).unwrap();
        let verdict: Verdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.kind, "browser");
    }

    #[test]
    fn missing_object_is_none() {
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = LlmClassifier::new(LlmClassifierConfig {
            api_base: "https://api.openai.com/v1".into(),
            api_key: "  ".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            timeout: Duration::from_secs(5),
        })
        .err()
        .unwrap();
        assert!(matches!(err, RouterError::Unavailable(_)));
    }
}
