//! Assertion vocabulary for validation-lane steps.
//!
//! Validation steps never call an executor. They read prior results through
//! the same accessors the resolver exposes, compute a verdict, and record
//! which stack entries they examined. The runner uses the examined indices
//! to decide whether an earlier failure was expected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use stepchain_context::ScenarioContext;
use stepchain_core_types::{ResolvedPayload, StepError, StepOutcome, StepRole};
use stepchain_resolver::{resolve_string, resolve_template};

use crate::dispatch::resolve_error;

static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:the\s+(?P<acc>{ACCESSOR_PHRASE})\s+)?status(?:\s+code)?\s+(?:should\s+(?:be|equal)\s+|of\s+|is\s+)?(?P<code>\d{{3}})\b"
    ))
    .expect("status assertion regex")
});

static SHOULD_FAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bshould\s+fail\b|\bshould\s+(?:return|result\s+in|raise)\s+an?\s+error\b")
        .expect("failure assertion regex")
});

const ACCESSOR_PHRASE: &str =
    r"(?:previous\s+|second[\s-]to[\s-]last\s+|third[\s-]to[\s-]last\s+)?response";

static FIELD_EQ_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\bthe\s+(?P<left>{ACCESSOR_PHRASE})\s+field\s+(?P<lf>[\w.\[\]]+)\s+should\s+(?:be\s+equal\s+to|equal|match)\s+the\s+(?P<right>{ACCESSOR_PHRASE})\s+field\s+(?P<rf>[\w.\[\]]+)"
    ))
    .expect("field equality regex")
});

static FIELD_LIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)\bthe\s+(?P<acc>{ACCESSOR_PHRASE})\s+field\s+(?P<f>[\w.\[\]]+)\s+should\s+(?P<op>be|equal|contain)\s+"?(?P<val>[^"]+?)"?\s*$"#
    ))
    .expect("field literal regex")
});

static LENGTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\bthe\s+(?P<acc>{ACCESSOR_PHRASE})(?:\s+field\s+(?P<f>[\w.\[\]]+))?\s+should\s+(?:have|return|contain)\s+(?P<n>\d+)\s+(?:items?|elements?|entries|results?|records?)\b"
    ))
    .expect("length assertion regex")
});

static CONTAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)\bthe\s+(?P<acc>{ACCESSOR_PHRASE})\s+should\s+contain\s+"(?P<needle>[^"]+)""#
    ))
    .expect("contains assertion regex")
});

/// Outcome of one validation step, recorded as the result body.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    /// Absolute stack indices of the results this assertion inspected.
    pub examined: Vec<usize>,
    pub detail: String,
}

impl ValidationVerdict {
    fn pass(detail: impl Into<String>, examined: Vec<usize>) -> Self {
        Self {
            passed: true,
            examined,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>, examined: Vec<usize>) -> Self {
        Self {
            passed: false,
            examined,
            detail: detail.into(),
        }
    }

    fn into_outcome(self) -> StepOutcome {
        let error = if self.passed {
            None
        } else {
            Some(StepError::assertion(self.detail.clone()))
        };
        StepOutcome {
            status: None,
            headers: Default::default(),
            body: Some(json!({
                "passed": self.passed,
                "examined": self.examined,
                "detail": self.detail,
            })),
            error,
        }
    }
}

/// Evaluate one validation step and package the verdict as a step outcome.
pub(crate) fn run(
    text: &str,
    role: StepRole,
    context: &ScenarioContext,
) -> (Option<ResolvedPayload>, StepOutcome) {
    let payload = Some(ResolvedPayload::Validation {
        assertion: text.to_string(),
    });

    // Placeholders in assertion text resolve against the same stack the
    // assertion inspects.
    let resolved = match resolve_string(text, context) {
        Ok(resolved) => resolved,
        Err(err) => return (payload, StepOutcome::failed(resolve_error(&err))),
    };

    let verdict = evaluate(&resolved, role, context);
    (payload, verdict.into_outcome())
}

fn evaluate(text: &str, role: StepRole, context: &ScenarioContext) -> ValidationVerdict {
    // `Given` steps in this lane are context acknowledgments, not checks.
    if role == StepRole::Given {
        return ValidationVerdict::pass("context acknowledged", vec![]);
    }

    if let Some(captures) = FIELD_EQ_RE.captures(text) {
        return check_field_equality(&captures, context);
    }
    if let Some(captures) = LENGTH_RE.captures(text) {
        return check_length(&captures, context);
    }
    if let Some(captures) = FIELD_LIT_RE.captures(text) {
        return check_field_literal(&captures, context);
    }
    if let Some(captures) = CONTAIN_RE.captures(text) {
        return check_contains(&captures, context);
    }
    if let Some(captures) = STATUS_RE.captures(text) {
        return check_status(&captures, context);
    }
    if SHOULD_FAIL_RE.is_match(text) {
        return check_expected_failure(context);
    }

    // Unrecognized phrasing is acknowledged rather than failed, so prose
    // steps that only narrate intent do not break a scenario.
    ValidationVerdict::pass("no assertion pattern matched; acknowledged", vec![])
}

/// Map an accessor phrase ("previous response", ...) to the resolver keyword
/// and its depth offset from the top of the stack.
fn accessor(phrase: &str) -> (&'static str, usize) {
    let lowered = phrase.to_lowercase();
    if lowered.contains("third") {
        ("third_to_last_response", 3)
    } else if lowered.contains("second") {
        ("second_to_last_response", 2)
    } else if lowered.contains("previous") {
        ("previous_response", 1)
    } else {
        ("response", 0)
    }
}

/// Absolute stack index of the action the accessor points at, or a failed
/// verdict when there are not enough prior actions.
fn examined_index(
    phrase: &str,
    offset: usize,
    context: &ScenarioContext,
) -> Result<usize, ValidationVerdict> {
    context
        .stack
        .nth_action_from_end(offset)
        .map(|(index, _)| index)
        .ok_or_else(|| {
            ValidationVerdict::fail(
                format!(
                    "'{phrase}' needs {} prior result(s), stack holds {}",
                    offset + 1,
                    context.stack.action_count()
                ),
                vec![],
            )
        })
}

fn eval_field(
    keyword: &str,
    field: &str,
    context: &ScenarioContext,
) -> Result<Value, ValidationVerdict> {
    let expr = format!("${{{keyword}.{field}}}");
    resolve_template(&expr, context)
        .map_err(|err| ValidationVerdict::fail(err.to_string(), vec![]))
}

fn check_field_equality(captures: &regex::Captures<'_>, context: &ScenarioContext) -> ValidationVerdict {
    let (left_keyword, left_offset) = accessor(&captures["left"]);
    let (right_keyword, right_offset) = accessor(&captures["right"]);

    let left_index = match examined_index(&captures["left"], left_offset, context) {
        Ok(index) => index,
        Err(verdict) => return verdict,
    };
    let right_index = match examined_index(&captures["right"], right_offset, context) {
        Ok(index) => index,
        Err(verdict) => return verdict,
    };
    let examined = vec![left_index, right_index];

    let left = match eval_field(left_keyword, &captures["lf"], context) {
        Ok(value) => value,
        Err(mut verdict) => {
            verdict.examined = examined;
            return verdict;
        }
    };
    let right = match eval_field(right_keyword, &captures["rf"], context) {
        Ok(value) => value,
        Err(mut verdict) => {
            verdict.examined = examined;
            return verdict;
        }
    };

    if loosely_equal(&left, &right) {
        ValidationVerdict::pass(
            format!("{left_keyword}.{} == {right_keyword}.{}", &captures["lf"], &captures["rf"]),
            examined,
        )
    } else {
        ValidationVerdict::fail(
            format!(
                "{left_keyword}.{} is {left}, {right_keyword}.{} is {right}",
                &captures["lf"], &captures["rf"]
            ),
            examined,
        )
    }
}

fn check_field_literal(captures: &regex::Captures<'_>, context: &ScenarioContext) -> ValidationVerdict {
    let (keyword, offset) = accessor(&captures["acc"]);
    let index = match examined_index(&captures["acc"], offset, context) {
        Ok(index) => index,
        Err(verdict) => return verdict,
    };
    let examined = vec![index];

    let actual = match eval_field(keyword, &captures["f"], context) {
        Ok(value) => value,
        Err(mut verdict) => {
            verdict.examined = examined;
            return verdict;
        }
    };

    let raw = captures["val"].trim();
    let expected: Value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let matched = if &captures["op"] == "contain" {
        match (&actual, &expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| loosely_equal(item, needle)),
            _ => loosely_equal(&actual, &expected),
        }
    } else {
        loosely_equal(&actual, &expected)
    };

    if matched {
        ValidationVerdict::pass(
            format!("{keyword}.{} matched {expected}", &captures["f"]),
            examined,
        )
    } else {
        ValidationVerdict::fail(
            format!("{keyword}.{} is {actual}, expected {expected}", &captures["f"]),
            examined,
        )
    }
}

fn check_length(captures: &regex::Captures<'_>, context: &ScenarioContext) -> ValidationVerdict {
    let (keyword, offset) = accessor(&captures["acc"]);
    let index = match examined_index(&captures["acc"], offset, context) {
        Ok(index) => index,
        Err(verdict) => return verdict,
    };
    let examined = vec![index];

    let path = match captures.name("f") {
        Some(field) => format!("{keyword}.{}", field.as_str()),
        None => keyword.to_string(),
    };
    let expr = format!("${{array_length({path})}}");
    let actual = match resolve_template(&expr, context) {
        Ok(value) => value,
        Err(err) => {
            let mut verdict = ValidationVerdict::fail(err.to_string(), vec![]);
            verdict.examined = examined;
            return verdict;
        }
    };

    let expected: u64 = match captures["n"].parse() {
        Ok(n) => n,
        Err(err) => return ValidationVerdict::fail(format!("bad expected count: {err}"), examined),
    };

    if actual.as_u64() == Some(expected) {
        ValidationVerdict::pass(format!("{path} has {expected} item(s)"), examined)
    } else {
        ValidationVerdict::fail(
            format!("{path} has {actual} item(s), expected {expected}"),
            examined,
        )
    }
}

fn check_contains(captures: &regex::Captures<'_>, context: &ScenarioContext) -> ValidationVerdict {
    let (_, offset) = accessor(&captures["acc"]);
    let index = match examined_index(&captures["acc"], offset, context) {
        Ok(index) => index,
        Err(verdict) => return verdict,
    };
    let examined = vec![index];

    let needle = &captures["needle"];
    let body = context
        .stack
        .get(index)
        .and_then(|result| result.outcome.body.as_ref());
    let haystack = match body {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    if haystack.contains(needle) {
        ValidationVerdict::pass(format!("response contains '{needle}'"), examined)
    } else {
        ValidationVerdict::fail(format!("response does not contain '{needle}'"), examined)
    }
}

fn check_status(captures: &regex::Captures<'_>, context: &ScenarioContext) -> ValidationVerdict {
    // "the status code should be 200" with no accessor phrase checks the
    // most recent action.
    let phrase = captures.name("acc").map_or("response", |m| m.as_str());
    let (_, offset) = accessor(phrase);
    let index = match examined_index(phrase, offset, context) {
        Ok(index) => index,
        Err(verdict) => return verdict,
    };
    let Some(action) = context.stack.get(index) else {
        return ValidationVerdict::fail("no prior action to check a status against", vec![]);
    };
    let expected: u16 = match captures["code"].parse() {
        Ok(status) => status,
        Err(err) => return ValidationVerdict::fail(format!("bad expected status: {err}"), vec![index]),
    };

    match action.outcome.status {
        Some(actual) if actual == expected => {
            ValidationVerdict::pass(format!("status is {expected}"), vec![index])
        }
        Some(actual) => ValidationVerdict::fail(
            format!("status is {actual}, expected {expected}"),
            vec![index],
        ),
        None => ValidationVerdict::fail(
            format!("last action produced no status (expected {expected})"),
            vec![index],
        ),
    }
}

/// "the request should fail": passes only when the most recent action
/// recorded an error. Passing marks that failure as examined, which stops
/// the runner from treating it as unexpected.
fn check_expected_failure(context: &ScenarioContext) -> ValidationVerdict {
    let Some((index, action)) = context.stack.last_action() else {
        return ValidationVerdict::fail("no prior action to expect a failure from", vec![]);
    };
    match &action.outcome.error {
        Some(error) => ValidationVerdict::pass(
            format!("prior action failed as expected: {}", error.message),
            vec![index],
        ),
        None => ValidationVerdict::fail("prior action succeeded, but a failure was expected", vec![index]),
    }
}

/// Numeric equality across JSON number/string representations; everything
/// else compares structurally.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use stepchain_context::ScenarioMeta;
    use stepchain_core_types::{ApiRequest, StepKind, StepResult};

    fn push_api(context: &mut ScenarioContext, status: u16, body: Value) {
        context.stack.push(StepResult {
            kind: StepKind::Api,
            role: StepRole::When,
            text: "GET /things".into(),
            payload: Some(ResolvedPayload::Api(ApiRequest::new(
                "GET",
                "https://api.example.com/things",
            ))),
            outcome: StepOutcome {
                status: Some(status),
                body: Some(body),
                ..StepOutcome::default()
            },
            timestamp: Utc::now(),
            duration_ms: 1,
        });
    }

    fn push_failed_api(context: &mut ScenarioContext) {
        context.stack.push(StepResult {
            kind: StepKind::Api,
            role: StepRole::When,
            text: "GET /down".into(),
            payload: Some(ResolvedPayload::Api(ApiRequest::new(
                "GET",
                "https://api.example.com/down",
            ))),
            outcome: StepOutcome::failed(StepError::executor("connection refused")),
            timestamp: Utc::now(),
            duration_ms: 1,
        });
    }

    fn fresh_context() -> ScenarioContext {
        ScenarioContext::new(ScenarioMeta::default())
    }

    #[test]
    fn status_assertion_checks_the_last_action() {
        let mut context = fresh_context();
        push_api(&mut context, 404, json!({"error": "not found"}));

        let verdict = evaluate("the response status code should be 404", StepRole::Then, &context);
        assert!(verdict.passed);
        assert_eq!(verdict.examined, vec![0]);

        let verdict = evaluate("the response status code should be 200", StepRole::Then, &context);
        assert!(!verdict.passed);
    }

    #[test]
    fn status_assertion_honors_the_accessor_phrase() {
        let mut context = fresh_context();
        push_api(&mut context, 404, json!({"error": "not found"}));
        push_api(&mut context, 200, json!({"ok": true}));

        let verdict = evaluate(
            "the previous response status code should be 404",
            StepRole::Then,
            &context,
        );
        assert!(verdict.passed, "{}", verdict.detail);
        assert_eq!(verdict.examined, vec![0]);

        let verdict = evaluate(
            "the response status code should be 200",
            StepRole::Then,
            &context,
        );
        assert!(verdict.passed, "{}", verdict.detail);
        assert_eq!(verdict.examined, vec![1]);

        let verdict = evaluate(
            "the previous response status code should be 200",
            StepRole::Then,
            &context,
        );
        assert!(!verdict.passed);
    }

    #[test]
    fn field_literal_assertion_coerces_numbers() {
        let mut context = fresh_context();
        push_api(&mut context, 200, json!({"id": 1, "name": "Leanne"}));

        let verdict = evaluate("the response field id should be 1", StepRole::Then, &context);
        assert!(verdict.passed, "{}", verdict.detail);

        let verdict = evaluate(
            "the response field name should be \"Leanne\"",
            StepRole::Then,
            &context,
        );
        assert!(verdict.passed, "{}", verdict.detail);
    }

    #[test]
    fn cross_stack_equality_examines_both_entries() {
        let mut context = fresh_context();
        push_api(&mut context, 201, json!({"userId": 7}));
        push_api(&mut context, 200, json!({"id": 7, "name": "Leanne"}));

        let verdict = evaluate(
            "the previous response field userId should equal the response field id",
            StepRole::Then,
            &context,
        );
        assert!(verdict.passed, "{}", verdict.detail);
        assert_eq!(verdict.examined, vec![0, 1]);
    }

    #[test]
    fn length_assertion_uses_array_length() {
        let mut context = fresh_context();
        push_api(&mut context, 200, json!({"items": [1, 2, 3]}));

        let verdict = evaluate(
            "the response field items should have 3 elements",
            StepRole::Then,
            &context,
        );
        assert!(verdict.passed, "{}", verdict.detail);

        let verdict = evaluate(
            "the response field items should have 4 elements",
            StepRole::Then,
            &context,
        );
        assert!(!verdict.passed);
    }

    #[test]
    fn expected_failure_passes_only_on_a_failed_action() {
        let mut context = fresh_context();
        push_failed_api(&mut context);

        let verdict = evaluate("the request should fail", StepRole::Then, &context);
        assert!(verdict.passed);
        assert_eq!(verdict.examined, vec![0]);

        let mut ok = fresh_context();
        push_api(&mut ok, 200, json!({}));
        let verdict = evaluate("the request should fail", StepRole::Then, &ok);
        assert!(!verdict.passed);
    }

    #[test]
    fn shallow_stack_fails_the_accessor() {
        let mut context = fresh_context();
        push_api(&mut context, 200, json!({"id": 1}));

        let verdict = evaluate(
            "the previous response field id should be 1",
            StepRole::Then,
            &context,
        );
        assert!(!verdict.passed);
        assert!(verdict.detail.contains("prior result"));
    }

    #[test]
    fn given_steps_are_acknowledged_without_inspection() {
        let context = fresh_context();
        let verdict = evaluate("the API is available", StepRole::Given, &context);
        assert!(verdict.passed);
        assert!(verdict.examined.is_empty());
    }

    #[test]
    fn unrecognized_then_phrasing_is_acknowledged() {
        let mut context = fresh_context();
        push_api(&mut context, 200, json!({}));
        let verdict = evaluate("everything looks fine", StepRole::Then, &context);
        assert!(verdict.passed);
    }
}
