use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use stepchain_context::ScenarioContext;

use crate::errors::ResolveError;
use crate::expr::{scalar_to_string, Expr};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(?P<inner>[^}]+)\}").expect("placeholder regex"));

pub fn contains_placeholder(input: &str) -> bool {
    PLACEHOLDER_RE.is_match(input)
}

/// Resolve a raw string into a JSON value.
///
/// When the string is exactly one placeholder the resolved value replaces it
/// wholesale, keeping its JSON type; a numeric-looking string result is
/// additionally coerced to a number, because consuming APIs expect numeric
/// ids even when the template sits inside a quoted source value. Any other
/// string resolves each placeholder independently and concatenates the
/// rendered pieces.
pub fn resolve_template(input: &str, context: &ScenarioContext) -> Result<Value, ResolveError> {
    if let Some(inner) = sole_placeholder(input) {
        let value = Expr::parse(inner)?.eval(context)?;
        return Ok(coerce_numeric_string(value));
    }

    if !contains_placeholder(input) {
        return Ok(Value::String(input.to_string()));
    }

    let mut rendered = String::with_capacity(input.len());
    let mut cursor = 0;
    for caps in PLACEHOLDER_RE.captures_iter(input) {
        let whole = caps.get(0).expect("placeholder match");
        rendered.push_str(&input[cursor..whole.start()]);
        let value = Expr::parse(&caps["inner"])?.eval(context)?;
        rendered.push_str(&scalar_to_string(&value));
        cursor = whole.end();
    }
    rendered.push_str(&input[cursor..]);
    Ok(Value::String(rendered))
}

/// Resolve a raw string, always producing a string (instruction texts,
/// assertion texts).
pub fn resolve_string(input: &str, context: &ScenarioContext) -> Result<String, ResolveError> {
    Ok(scalar_to_string(&resolve_template(input, context)?))
}

/// Walk a structured payload and substitute every embedded placeholder,
/// preserving JSON types for whole-value replacements. Pure with respect to
/// the context; the stack is never mutated.
pub fn resolve_value(value: &Value, context: &ScenarioContext) -> Result<Value, ResolveError> {
    match value {
        Value::String(text) => resolve_template(text, context),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_value(item, context)?);
            }
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, context)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn sole_placeholder(input: &str) -> Option<&str> {
    let caps = PLACEHOLDER_RE.captures(input.trim())?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == input.trim().len() {
        caps.name("inner").map(|m| m.as_str())
    } else {
        None
    }
}

fn coerce_numeric_string(value: Value) -> Value {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Value::from(int);
            }
            if trimmed.contains('.') || trimmed.contains('e') || trimmed.contains('E') {
                if let Some(number) = trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .and_then(serde_json::Number::from_f64)
                {
                    return Value::Number(number);
                }
            }
            Value::String(text)
        }
        other => other,
    }
}
