use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use stepchain_context::ScenarioContext;

use crate::errors::ResolveError;

/// Accessor keywords recognised at the root of a path.
///
/// The relative accessors index the stack as it stood before the current
/// step was appended, counting action entries only: `response` is the most
/// recent action, `previous_response` the one before it, and so on.
/// Validation verdicts on the stack are skipped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Response,
    PreviousResponse,
    SecondToLastResponse,
    ThirdToLastResponse,
    /// Fields captured from rendered pages, `${ui.email}` style.
    UiFields,
}

impl Accessor {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "response" => Some(Self::Response),
            "previous_response" => Some(Self::PreviousResponse),
            "second_to_last_response" => Some(Self::SecondToLastResponse),
            "third_to_last_response" => Some(Self::ThirdToLastResponse),
            "ui" => Some(Self::UiFields),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::PreviousResponse => "previous_response",
            Self::SecondToLastResponse => "second_to_last_response",
            Self::ThirdToLastResponse => "third_to_last_response",
            Self::UiFields => "ui",
        }
    }

    /// Steps back through the action entries, for the stack-backed
    /// accessors.
    fn offset(self) -> Option<usize> {
        match self {
            Self::Response => Some(0),
            Self::PreviousResponse => Some(1),
            Self::SecondToLastResponse => Some(2),
            Self::ThirdToLastResponse => Some(3),
            Self::UiFields => None,
        }
    }
}

/// One step of a path after the root: dotted field access or `[i]` index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// Registered functions callable inside a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    ArrayLength,
    ToNumber,
    ToString,
}

impl Function {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "array_length" => Some(Self::ArrayLength),
            "to_number" => Some(Self::ToNumber),
            "to_string" => Some(Self::ToString),
            _ => None,
        }
    }
}

/// A parsed placeholder body. Expressions are parsed lazily at resolution
/// time and live only for the duration of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Path {
        root: Accessor,
        segments: Vec<Segment>,
        raw: String,
    },
    Call {
        function: Function,
        arg: Box<Expr>,
        raw: String,
    },
}

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>[a-z_][a-z0-9_]*)\s*\((?P<arg>.*)\)$").expect("call regex"));
static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<ident>[A-Za-z_][A-Za-z0-9_\-]*)(?P<indices>(\[\d+\])*)$")
        .expect("segment regex")
});
static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("index regex"));

impl Expr {
    /// Parse the inside of a `${...}` placeholder.
    pub fn parse(inner: &str) -> Result<Self, ResolveError> {
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::Syntax(inner.to_string()));
        }

        if let Some(caps) = CALL_RE.captures(trimmed) {
            let name = caps.name("name").expect("name group").as_str();
            // A bare accessor word never looks like a call, so a match here
            // is a function application.
            if let Some(function) = Function::parse(name) {
                let arg = Expr::parse(caps.name("arg").expect("arg group").as_str())?;
                return Ok(Expr::Call {
                    function,
                    arg: Box::new(arg),
                    raw: trimmed.to_string(),
                });
            }
            return Err(ResolveError::Syntax(trimmed.to_string()));
        }

        Self::parse_path(trimmed)
    }

    fn parse_path(raw: &str) -> Result<Self, ResolveError> {
        let mut parts = raw.split('.');
        let head = parts.next().unwrap_or_default().trim();

        let (root_word, head_indices) = split_indices(head)?;
        let root = Accessor::parse(&root_word)
            .ok_or_else(|| ResolveError::UnknownRoot(root_word.clone()))?;

        let mut segments = head_indices;
        for part in parts {
            let part = part.trim();
            let caps = SEGMENT_RE
                .captures(part)
                .ok_or_else(|| ResolveError::Syntax(raw.to_string()))?;
            segments.push(Segment::Field(caps["ident"].to_string()));
            for index in INDEX_RE.captures_iter(&caps["indices"]) {
                let value = index[1]
                    .parse::<usize>()
                    .map_err(|_| ResolveError::Syntax(raw.to_string()))?;
                segments.push(Segment::Index(value));
            }
        }

        Ok(Expr::Path {
            root,
            segments,
            raw: raw.to_string(),
        })
    }

    pub fn raw(&self) -> &str {
        match self {
            Expr::Path { raw, .. } | Expr::Call { raw, .. } => raw,
        }
    }

    /// Evaluate against the context. Pure: the stack is only read.
    pub fn eval(&self, context: &ScenarioContext) -> Result<Value, ResolveError> {
        match self {
            Expr::Path {
                root,
                segments,
                raw,
            } => {
                let mut value = root_value(*root, context)?;
                for segment in segments {
                    value = descend(value, segment, raw)?;
                }
                Ok(value)
            }
            Expr::Call { function, arg, raw } => {
                let value = arg.eval(context)?;
                apply_function(*function, value, raw)
            }
        }
    }
}

fn split_indices(head: &str) -> Result<(String, Vec<Segment>), ResolveError> {
    let caps = SEGMENT_RE
        .captures(head)
        .ok_or_else(|| ResolveError::Syntax(head.to_string()))?;
    let mut indices = Vec::new();
    for index in INDEX_RE.captures_iter(&caps["indices"]) {
        let value = index[1]
            .parse::<usize>()
            .map_err(|_| ResolveError::Syntax(head.to_string()))?;
        indices.push(Segment::Index(value));
    }
    Ok((caps["ident"].to_string(), indices))
}

/// Resolve the accessor root to a value: the referenced action's outcome
/// body for stack-backed accessors, the captured-field map for `ui`.
///
/// Only action entries count. Validation verdicts sit on the stack too, but
/// a verdict pushed between two calls must not shift what `response` means.
fn root_value(root: Accessor, context: &ScenarioContext) -> Result<Value, ResolveError> {
    match root.offset() {
        Some(offset) => {
            let (_, result) = context.stack.nth_action_from_end(offset).ok_or_else(|| {
                ResolveError::IndexOutOfRange {
                    accessor: root.keyword().to_string(),
                    needed: offset + 1,
                    depth: context.stack.action_count(),
                }
            })?;
            Ok(result.outcome.body.clone().unwrap_or(Value::Null))
        }
        None => {
            let map: Map<String, Value> = context
                .ui_fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            Ok(Value::Object(map))
        }
    }
}

fn descend(value: Value, segment: &Segment, raw: &str) -> Result<Value, ResolveError> {
    match segment {
        Segment::Field(name) => match value {
            Value::Object(mut map) => map.remove(name).ok_or_else(|| ResolveError::FieldNotFound {
                expr: raw.to_string(),
                segment: name.clone(),
            }),
            _ => Err(ResolveError::FieldNotFound {
                expr: raw.to_string(),
                segment: name.clone(),
            }),
        },
        Segment::Index(index) => match value {
            Value::Array(mut items) => {
                if *index < items.len() {
                    Ok(items.swap_remove(*index))
                } else {
                    Err(ResolveError::FieldNotFound {
                        expr: raw.to_string(),
                        segment: format!("[{index}]"),
                    })
                }
            }
            _ => Err(ResolveError::FieldNotFound {
                expr: raw.to_string(),
                segment: format!("[{index}]"),
            }),
        },
    }
}

fn apply_function(function: Function, value: Value, raw: &str) -> Result<Value, ResolveError> {
    match function {
        Function::ArrayLength => match value {
            Value::Array(items) => Ok(Value::from(items.len() as u64)),
            _ => Err(ResolveError::NotAnArray(raw.to_string())),
        },
        Function::ToNumber => match value {
            Value::Number(_) => Ok(value),
            Value::String(text) => {
                let trimmed = text.trim();
                if let Ok(int) = trimmed.parse::<i64>() {
                    return Ok(Value::from(int));
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| ResolveError::Coercion {
                        expr: raw.to_string(),
                        message: format!("'{text}' is not numeric"),
                    })
            }
            other => Err(ResolveError::Coercion {
                expr: raw.to_string(),
                message: format!("cannot convert {other} to a number"),
            }),
        },
        Function::ToString => match value {
            Value::String(_) => Ok(value),
            other => Ok(Value::String(scalar_to_string(&other))),
        },
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
