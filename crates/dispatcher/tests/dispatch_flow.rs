//! End-to-end dispatcher flows against mock executors: context chaining
//! across steps, token capture and injection, and the no-call guarantee for
//! validation steps.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use stepchain_context::ScenarioMeta;
use stepchain_core_types::{
    ApiRequest, BrowserInstruction, StepDef, StepErrorKind, StepKind, StepRole,
};
use stepchain_dispatcher::{
    ApiExecutor, ApiResponse, BrowserExecutor, BrowserReply, ContextManager, Dispatcher,
    ExecutorError,
};
use stepchain_router::Router;

/// Serves canned responses keyed by `METHOD endpoint` and records every
/// request it saw.
#[derive(Default)]
struct MockApi {
    routes: HashMap<String, (u16, Value)>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockApi {
    fn with_route(mut self, method: &str, endpoint: &str, status: u16, body: Value) -> Self {
        self.routes
            .insert(format!("{method} {endpoint}"), (status, body));
        self
    }

    fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiExecutor for MockApi {
    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, ExecutorError> {
        self.calls.lock().unwrap().push(request.clone());
        let key = format!("{} {}", request.method, request.endpoint);
        match self.routes.get(&key) {
            Some((status, body)) => Ok(ApiResponse {
                status: *status,
                headers: BTreeMap::new(),
                body: Some(body.clone()),
            }),
            None => Err(ExecutorError::Network(format!("no route for {key}"))),
        }
    }
}

#[derive(Default)]
struct MockBrowser {
    replies: Mutex<Vec<BrowserReply>>,
    runs: AtomicUsize,
    closed: AtomicUsize,
}

impl MockBrowser {
    fn with_reply(self, reply: BrowserReply) -> Self {
        self.replies.lock().unwrap().push(reply);
        self
    }
}

#[async_trait]
impl BrowserExecutor for MockBrowser {
    async fn run(&self, _: &BrowserInstruction) -> Result<BrowserReply, ExecutorError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Ok(BrowserReply {
                text: "done".into(),
                ..BrowserReply::default()
            })
        } else {
            Ok(replies.remove(0))
        }
    }

    async fn close_session(&self) -> Result<(), ExecutorError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn dispatcher(api: Arc<MockApi>, browser: Arc<MockBrowser>) -> Dispatcher {
    Dispatcher::new(Router::keyword_only(), api, browser)
}

#[tokio::test]
async fn chained_scenario_resolves_against_prior_responses() {
    let api = Arc::new(
        MockApi::default()
            .with_route(
                "GET",
                "https://api.example.com/users/1",
                200,
                json!({"id": 1, "name": "Leanne"}),
            )
            .with_route(
                "POST",
                "https://api.example.com/posts",
                201,
                json!({"postId": 101, "userId": 1}),
            ),
    );
    let browser = Arc::new(MockBrowser::default());
    let dispatcher = dispatcher(api.clone(), browser.clone());
    let manager = ContextManager::new(browser.clone());
    let mut context = manager.open(ScenarioMeta::default()).unwrap();

    let fetch = StepDef::new(StepRole::When, "I GET https://api.example.com/users/1");
    let result = dispatcher.execute(&fetch, &mut context).await;
    assert_eq!(result.kind, StepKind::Api);
    assert_eq!(result.outcome.status, Some(200));

    // Placeholder resolves against the response pushed by the first step.
    let create = StepDef::new(StepRole::When, "I POST https://api.example.com/posts")
        .with_payload(json!({
            "method": "POST",
            "endpoint": "https://api.example.com/posts",
            "body": {"userId": "${response.id}", "title": "hello"}
        }));
    let result = dispatcher.execute(&create, &mut context).await;
    assert_eq!(result.outcome.status, Some(201));

    let sent = api.calls();
    assert_eq!(sent.len(), 2);
    // Whole-string placeholder kept the number a number.
    assert_eq!(
        sent[1].body.as_ref().unwrap()["userId"],
        json!(1),
        "resolved body: {:?}",
        sent[1].body
    );

    let check = StepDef::new(
        StepRole::Then,
        "the previous response field id should equal the response field userId",
    );
    let result = dispatcher.execute(&check, &mut context).await;
    assert_eq!(result.kind, StepKind::Validation);
    assert!(result.succeeded(), "outcome: {:?}", result.outcome);

    assert_eq!(context.stack.len(), 3);
    manager.close(context).await;
    assert_eq!(browser.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn validation_steps_never_reach_an_executor() {
    let api = Arc::new(MockApi::default().with_route(
        "GET",
        "https://api.example.com/health",
        200,
        json!({"ok": true}),
    ));
    let browser = Arc::new(MockBrowser::default());
    let dispatcher = dispatcher(api.clone(), browser.clone());
    let mut context = ContextManager::new(browser.clone())
        .open(ScenarioMeta::default())
        .unwrap();

    let ping = StepDef::new(StepRole::When, "I GET https://api.example.com/health");
    dispatcher.execute(&ping, &mut context).await;

    let steps = [
        StepDef::new(StepRole::Then, "the response status code should be 200"),
        StepDef::new(StepRole::And, "the response field ok should be true"),
        StepDef::new(StepRole::Given, "the service is healthy"),
    ];
    for step in &steps {
        let result = dispatcher.execute(step, &mut context).await;
        assert_eq!(result.kind, StepKind::Validation, "step: {}", step.text);
        assert!(result.succeeded(), "step: {} -> {:?}", step.text, result.outcome);
    }

    assert_eq!(api.calls().len(), 1, "validation steps must not call the API");
    assert_eq!(browser.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn login_flow_token_is_injected_into_later_api_calls() {
    let api = Arc::new(MockApi::default().with_route(
        "GET",
        "https://api.example.com/me",
        200,
        json!({"id": 9}),
    ));
    let browser = Arc::new(MockBrowser::default().with_reply(BrowserReply {
        text: "logged in".into(),
        fields: HashMap::from([("email".to_string(), "leanne@example.com".to_string())]),
        token: Some("jwt-abc".to_string()),
    }));
    let dispatcher = dispatcher(api.clone(), browser.clone());
    let mut context = ContextManager::new(browser.clone())
        .open(ScenarioMeta::default())
        .unwrap();

    let login = StepDef::new(StepRole::When, "I login by clicking the Sign In button");
    let result = dispatcher.execute(&login, &mut context).await;
    assert_eq!(result.kind, StepKind::Browser);
    assert_eq!(context.auth_token.as_deref(), Some("jwt-abc"));
    assert_eq!(
        context.ui_fields.get("email").map(String::as_str),
        Some("leanne@example.com")
    );

    let me = StepDef::new(StepRole::When, "I GET https://api.example.com/me");
    dispatcher.execute(&me, &mut context).await;
    let sent = api.calls();
    assert_eq!(
        sent[0].headers.get("Authorization").map(String::as_str),
        Some("Bearer jwt-abc")
    );

    // Captured UI fields are readable through the ui accessor.
    let check = StepDef::new(StepRole::Then, "the response field id should be 9");
    let result = dispatcher.execute(&check, &mut context).await;
    assert!(result.succeeded(), "outcome: {:?}", result.outcome);
}

#[tokio::test]
async fn failures_are_recorded_as_data_and_examined_by_assertions() {
    let api = Arc::new(MockApi::default());
    let browser = Arc::new(MockBrowser::default());
    let dispatcher = dispatcher(api.clone(), browser.clone());
    let mut context = ContextManager::new(browser)
        .open(ScenarioMeta::default())
        .unwrap();

    // No route registered, so the executor errors out.
    let step = StepDef::new(StepRole::When, "I GET https://api.example.com/missing");
    let result = dispatcher.execute(&step, &mut context).await;
    assert_eq!(
        result.outcome.error.as_ref().map(|e| e.kind),
        Some(StepErrorKind::Executor)
    );
    // The failed result is still on the stack for later assertions.
    assert_eq!(context.stack.len(), 1);

    let expect = StepDef::new(StepRole::Then, "the request should fail");
    let result = dispatcher.execute(&expect, &mut context).await;
    assert!(result.succeeded(), "outcome: {:?}", result.outcome);
    let body = result.outcome.body.unwrap();
    assert_eq!(body["passed"], json!(true));
    assert_eq!(body["examined"], json!([0]));
}

#[tokio::test]
async fn unresolvable_placeholder_fails_the_step_without_a_call() {
    let api = Arc::new(MockApi::default());
    let browser = Arc::new(MockBrowser::default());
    let dispatcher = dispatcher(api.clone(), browser.clone());
    let mut context = ContextManager::new(browser)
        .open(ScenarioMeta::default())
        .unwrap();

    let step = StepDef::new(StepRole::When, "I POST https://api.example.com/posts")
        .with_payload(json!({
            "method": "POST",
            "endpoint": "https://api.example.com/posts",
            "body": {"userId": "${previous_response.id}"}
        }));
    let result = dispatcher.execute(&step, &mut context).await;
    assert_eq!(
        result.outcome.error.as_ref().map(|e| e.kind),
        Some(StepErrorKind::IndexOutOfRange)
    );
    assert!(result.payload.is_none());
    assert!(api.calls().is_empty(), "nothing should have been sent");
}
