use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use stepchain_context::ScenarioContext;
use stepchain_core_types::{
    ApiRequest, BrowserInstruction, ResolvedPayload, StepDef, StepError, StepErrorKind,
    StepKind, StepOutcome, StepResult,
};
use stepchain_resolver::{resolve_string, resolve_value, ResolveError};
use stepchain_router::{ClassifyRequest, Router};
use tracing::{debug, info, warn};

use crate::executors::{ApiExecutor, BrowserExecutor};
use crate::validate;

/// `<METHOD> <url> [with data {json}]` for steps that spell the request out
/// in prose instead of a structured payload.
static INLINE_REQUEST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(GET|POST|PUT|DELETE|PATCH)\b\s+(\S+)").expect("inline request regex")
});

/// Steps whose browser reply may carry credentials worth keeping.
static CREDENTIAL_FLOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(login|log in|sign in|authenticate|credentials)\b")
        .expect("credential flow regex")
});

/// Token spelled out in a browser reply, either labelled or as a bare JWT.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)"?(?:access_|auth_)?token"?\s*[:=]\s*"?([A-Za-z0-9._~+/-]+=*)"?|(eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+)"#,
    )
    .expect("token regex")
});

/// Routes one step at a time: classify, resolve, execute, record.
///
/// Failures of any stage land in the recorded outcome's `error` slot; the
/// returned result is also pushed onto the context's stack so later steps
/// can reference it.
pub struct Dispatcher {
    router: Router,
    api: Arc<dyn ApiExecutor>,
    browser: Arc<dyn BrowserExecutor>,
}

impl Dispatcher {
    pub fn new(router: Router, api: Arc<dyn ApiExecutor>, browser: Arc<dyn BrowserExecutor>) -> Self {
        Self {
            router,
            api,
            browser,
        }
    }

    /// Execute one step against the scenario context.
    ///
    /// The stack is read during resolution exactly as it stood on entry; the
    /// step's own result is appended only at the end.
    pub async fn execute(&self, step: &StepDef, context: &mut ScenarioContext) -> StepResult {
        let started = Instant::now();
        let timestamp = Utc::now();

        let recent_kinds = context.stack.iter().map(|result| result.kind).collect();
        let verdict = self
            .router
            .route(&ClassifyRequest::new(
                step.text.as_str(),
                step.role,
                recent_kinds,
            ))
            .await;
        debug!(
            step = %step.text,
            kind = %verdict.kind,
            origin = ?verdict.origin,
            "classified step"
        );

        let (payload, outcome) = match verdict.kind {
            StepKind::Api => self.run_api(step, context).await,
            StepKind::Browser => self.run_browser(step, context).await,
            StepKind::Validation => validate::run(&step.text, step.role, context),
        };

        if let Some(error) = &outcome.error {
            warn!(step = %step.text, kind = ?error.kind, error = %error.message, "step failed");
        } else {
            info!(step = %step.text, lane = %verdict.kind, "step completed");
        }

        let result = StepResult {
            kind: verdict.kind,
            role: step.role,
            text: step.text.clone(),
            payload,
            outcome,
            timestamp,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        context.stack.push(result.clone());
        result
    }

    async fn run_api(
        &self,
        step: &StepDef,
        context: &ScenarioContext,
    ) -> (Option<ResolvedPayload>, StepOutcome) {
        let mut request = match build_api_request(step, context) {
            Ok(request) => request,
            Err(error) => return (None, StepOutcome::failed(error)),
        };

        // A captured login token fills in Authorization unless the step set
        // its own.
        if let Some(token) = &context.auth_token {
            request
                .headers
                .entry("Authorization".to_string())
                .or_insert_with(|| format!("Bearer {token}"));
        }

        let payload = ResolvedPayload::Api(request.clone());
        match self.api.call(&request).await {
            Ok(response) => (
                Some(payload),
                StepOutcome {
                    status: Some(response.status),
                    headers: response.headers,
                    body: response.body,
                    error: None,
                },
            ),
            Err(err) => (
                Some(payload),
                StepOutcome::failed(StepError::executor(err.to_string())),
            ),
        }
    }

    async fn run_browser(
        &self,
        step: &StepDef,
        context: &mut ScenarioContext,
    ) -> (Option<ResolvedPayload>, StepOutcome) {
        let text = match resolve_string(&step.text, context) {
            Ok(text) => text,
            Err(err) => return (None, StepOutcome::failed(resolve_error(&err))),
        };

        let element = step
            .payload
            .as_ref()
            .and_then(|payload| payload.get("element"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let instruction = BrowserInstruction {
            instruction: text,
            element,
        };
        let payload = ResolvedPayload::Browser(instruction.clone());

        match self.browser.run(&instruction).await {
            Ok(reply) => {
                if !reply.fields.is_empty() {
                    debug!(count = reply.fields.len(), "captured UI fields");
                    context.ui_fields.extend(reply.fields);
                }
                if CREDENTIAL_FLOW_RE.is_match(&instruction.instruction) {
                    let token = reply.token.clone().or_else(|| extract_token(&reply.text));
                    if let Some(token) = token {
                        info!("captured bearer token from login flow");
                        context.auth_token = Some(token);
                    }
                }
                (
                    Some(payload),
                    StepOutcome {
                        status: None,
                        headers: Default::default(),
                        body: Some(Value::String(reply.text)),
                        error: None,
                    },
                )
            }
            Err(err) => (
                Some(payload),
                StepOutcome::failed(StepError::executor(err.to_string())),
            ),
        }
    }
}

/// Build the outgoing request from the step's structured payload, or parse
/// it out of the (resolved) step text when no payload was given.
fn build_api_request(step: &StepDef, context: &ScenarioContext) -> Result<ApiRequest, StepError> {
    if let Some(payload) = &step.payload {
        let resolved = resolve_value(payload, context).map_err(|err| resolve_error(&err))?;
        let mut request: ApiRequest = serde_json::from_value(resolved).map_err(|err| {
            StepError::new(
                StepErrorKind::Expression,
                format!("payload is not a valid API request: {err}"),
            )
        })?;
        // Deserialization bypasses the constructor, so the method-casing
        // invariant is re-applied here.
        request.method = request.method.to_ascii_uppercase();
        return Ok(request);
    }

    let text = resolve_string(&step.text, context).map_err(|err| resolve_error(&err))?;
    let captures = INLINE_REQUEST_RE.captures(&text).ok_or_else(|| {
        StepError::new(
            StepErrorKind::Expression,
            format!("no HTTP method and endpoint found in '{text}'"),
        )
    })?;

    let mut request = ApiRequest::new(&captures[1], captures[2].trim_end_matches(&[',', '.'][..]));
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            let body: Value = serde_json::from_str(&text[start..=end]).map_err(|err| {
                StepError::new(
                    StepErrorKind::Expression,
                    format!("inline request body is not valid JSON: {err}"),
                )
            })?;
            request = request.with_body(body);
        }
    }
    Ok(request)
}

/// Map a resolution failure onto the step-error taxonomy.
pub(crate) fn resolve_error(err: &ResolveError) -> StepError {
    let kind = match err {
        ResolveError::FieldNotFound { .. } => StepErrorKind::FieldNotFound,
        ResolveError::IndexOutOfRange { .. } => StepErrorKind::IndexOutOfRange,
        ResolveError::NotAnArray(_) => StepErrorKind::NotAnArray,
        ResolveError::Syntax(_) | ResolveError::UnknownRoot(_) | ResolveError::Coercion { .. } => {
            StepErrorKind::Expression
        }
    };
    StepError::new(kind, err.to_string())
}

fn extract_token(text: &str) -> Option<String> {
    TOKEN_RE.captures(text).and_then(|captures| {
        captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().to_string())
    })
}
