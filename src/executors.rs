//! Live executors behind the dispatcher's lane traits: a reqwest-backed API
//! executor and an HTTP bridge to an external browser-automation service.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepchain_core_types::{ApiRequest, BrowserInstruction};
use stepchain_dispatcher::{ApiResponse, ApiExecutor, BrowserExecutor, BrowserReply, ExecutorError};
use tracing::debug;
use url::Url;

/// API lane over reqwest. Non-2xx statuses are ordinary responses; only
/// transport failures become executor errors.
pub struct HttpApiExecutor {
    client: Client,
}

impl HttpApiExecutor {
    pub fn new(timeout: std::time::Duration) -> Result<Self, ExecutorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ExecutorError::Network(format!("building HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiExecutor for HttpApiExecutor {
    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, ExecutorError> {
        let url = Url::parse(&request.endpoint).map_err(|err| {
            ExecutorError::InvalidRequest(format!("endpoint '{}': {err}", request.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExecutorError::InvalidRequest(format!(
                "endpoint '{}' must be absolute http(s)",
                request.endpoint
            )));
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            ExecutorError::InvalidRequest(format!("unsupported method '{}'", request.method))
        })?;

        debug!(method = %method, url = %url, "sending API request");
        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| ExecutorError::Network(err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect::<BTreeMap<_, _>>();

        let text = response
            .text()
            .await
            .map_err(|err| ExecutorError::Network(format!("reading response body: {err}")))?;
        let body = if text.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Serialize)]
struct BridgeInstruction<'a> {
    instruction: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    element: Option<&'a str>,
}

#[derive(Deserialize, Default)]
struct BridgeReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    fields: HashMap<String, String>,
    #[serde(default)]
    token: Option<String>,
}

/// Browser lane speaking to an external automation bridge over HTTP. The
/// bridge runs the actual browser; this side only relays instructions and
/// collects what the page yielded.
#[derive(Debug)]
pub struct BridgeBrowserExecutor {
    client: Client,
    base_url: String,
}

impl BridgeBrowserExecutor {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, ExecutorError> {
        Url::parse(base_url).map_err(|err| {
            ExecutorError::InvalidRequest(format!("bridge URL '{base_url}': {err}"))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ExecutorError::Network(format!("building HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BrowserExecutor for BridgeBrowserExecutor {
    async fn run(&self, instruction: &BrowserInstruction) -> Result<BrowserReply, ExecutorError> {
        let reply = self
            .client
            .post(format!("{}/instruction", self.base_url))
            .json(&BridgeInstruction {
                instruction: &instruction.instruction,
                element: instruction.element.as_deref(),
            })
            .send()
            .await
            .map_err(|err| ExecutorError::Network(err.to_string()))?;

        if !reply.status().is_success() {
            let status = reply.status();
            let text = reply.text().await.unwrap_or_default();
            return Err(ExecutorError::Instruction(format!(
                "bridge returned {status}: {text}"
            )));
        }

        let reply: BridgeReply = reply
            .json()
            .await
            .map_err(|err| ExecutorError::Instruction(format!("bad bridge reply: {err}")))?;
        Ok(BrowserReply {
            text: reply.text,
            fields: reply.fields,
            token: reply.token,
        })
    }

    async fn close_session(&self) -> Result<(), ExecutorError> {
        self.client
            .post(format!("{}/session/close", self.base_url))
            .send()
            .await
            .map_err(|err| ExecutorError::Network(err.to_string()))?;
        Ok(())
    }
}

/// Stand-in browser lane for runs with no bridge configured. Browser steps
/// fail loudly instead of being skipped.
pub struct NoopBrowserExecutor;

#[async_trait]
impl BrowserExecutor for NoopBrowserExecutor {
    async fn run(&self, instruction: &BrowserInstruction) -> Result<BrowserReply, ExecutorError> {
        Err(ExecutorError::Instruction(format!(
            "no browser bridge configured, cannot run '{}'",
            instruction.instruction
        )))
    }

    async fn close_session(&self) -> Result<(), ExecutorError> {
        Ok(())
    }
}
