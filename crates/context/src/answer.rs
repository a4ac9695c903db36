//! Typed answers.
//!
//! An [`AnswerType`] describes the shape of the reply a caller wants. It
//! renders the instruction prefixed to the question, and decodes the raw
//! reply into an [`AnswerValue`]. Replies starting with `Error:` are the
//! assistant declining and become [`AnswerError::Refused`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("Unable to process request with error: {0}")]
    Refused(String),

    #[error("Failed to parse {kind}: [{text}]")]
    Parse { kind: &'static str, text: String },

    #[error("Failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported answer type: {0}")]
    Unsupported(String),
}

/// One field of a record answer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    /// Placeholder value shown to the model in the example object.
    pub example: Value,
    /// Natural-language description of what goes in the field.
    pub hint: Option<String>,
}

impl RecordField {
    pub fn new(name: impl Into<String>, example: Value) -> Self {
        Self {
            name: name.into(),
            example,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// The expected shape of a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerType {
    Bool,
    Int,
    UInt,
    Float,
    Text,
    List(Box<AnswerType>),
    Record(Vec<RecordField>),
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<AnswerValue>),
    Record(Map<String, Value>),
}

impl AnswerType {
    pub fn list_of(inner: AnswerType) -> Self {
        Self::List(Box::new(inner))
    }

    /// The instruction prefixed to the question, ending in `": "`.
    ///
    /// Plain text needs no instruction and yields an empty string.
    pub fn instruction(&self) -> Result<String, AnswerError> {
        let (inner, plurality) = match self {
            Self::List(inner) if matches!(**inner, Self::Record(_)) => {
                (inner.as_ref(), " (provide answer as a JSON array)")
            }
            Self::List(inner) => (inner.as_ref(), " (separate multiple answers with commas)"),
            other => (other, ""),
        };

        let base = match inner {
            Self::Bool => r#"Answer this with exactly "true" or "false" only, no punctuation"#.to_string(),
            Self::Int => "Answer this with an integer only, no punctuation or explanation".to_string(),
            Self::UInt => {
                "Answer this with a positive integer only, no punctuation or explanation".to_string()
            }
            Self::Float => "Answer this with a number only, no punctuation or explanation".to_string(),
            Self::Text if plurality.is_empty() => return Ok(String::new()),
            Self::Text => "Answer this".to_string(),
            Self::Record(fields) => record_instruction(fields)?,
            Self::List(_) => return Err(AnswerError::Unsupported("nested list".into())),
        };

        Ok(format!("{base}{plurality}: "))
    }

    /// Decode a raw reply.
    pub fn parse(&self, text: &str) -> Result<AnswerValue, AnswerError> {
        if let Some(reason) = text.strip_prefix("Error:") {
            return Err(AnswerError::Refused(reason.trim_start().to_string()));
        }

        match self {
            Self::Bool => parse_bool(text).map(AnswerValue::Bool),
            Self::Int => number_in(text)
                .and_then(|n| n.parse().ok())
                .map(AnswerValue::Int)
                .ok_or_else(|| parse_error("int", text)),
            Self::UInt => number_in(text)
                .and_then(|n| n.parse().ok())
                .map(AnswerValue::UInt)
                .ok_or_else(|| parse_error("unsigned int", text)),
            Self::Float => number_in(text)
                .and_then(|n| n.parse().ok())
                .map(AnswerValue::Float)
                .ok_or_else(|| parse_error("float", text)),
            Self::Text => Ok(AnswerValue::Text(text.to_string())),
            Self::Record(_) => match serde_json::from_str(json_slice(text, '{', '}'))? {
                Value::Object(map) => Ok(AnswerValue::Record(map)),
                _ => Err(parse_error("record", text)),
            },
            Self::List(inner) => match inner.as_ref() {
                Self::Record(_) => match serde_json::from_str(json_slice(text, '[', ']'))? {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(map) => Ok(AnswerValue::Record(map)),
                            _ => Err(parse_error("record", text)),
                        })
                        .collect::<Result<Vec<_>, _>>()
                        .map(AnswerValue::List),
                    _ => Err(parse_error("list", text)),
                },
                Self::List(_) => Err(AnswerError::Unsupported("nested list".into())),
                scalar => text
                    .split(',')
                    .map(|item| scalar.parse(item.trim()))
                    .collect::<Result<Vec<_>, _>>()
                    .map(AnswerValue::List),
            },
        }
    }
}

impl AnswerValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::UInt(u) => Value::from(*u),
            Self::Float(f) => Value::from(*f),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Record(map) => Value::Object(map.clone()),
        }
    }

    /// Deserialize into a caller type, e.g. a struct matching a record.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, AnswerError> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

fn record_instruction(fields: &[RecordField]) -> Result<String, AnswerError> {
    let example: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.clone(), f.example.clone()))
        .collect();

    let mut prompt = format!(
        "Provide the answer as a JSON object or array that looks like the following\n{}",
        serde_json::to_string(&example)?
    );

    let hints: Vec<String> = fields
        .iter()
        .filter_map(|f| f.hint.as_ref().map(|h| format!("{} {}", f.name, h)))
        .collect();
    if !hints.is_empty() {
        prompt.push_str("\n where ");
        prompt.push_str(&hints.join("; "));
    }

    Ok(prompt)
}

fn parse_error(kind: &'static str, text: &str) -> AnswerError {
    AnswerError::Parse {
        kind,
        text: text.to_string(),
    }
}

fn parse_bool(text: &str) -> Result<bool, AnswerError> {
    match text.trim().trim_matches(|c| matches!(c, '.' | ',' | '!' | '?')) {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(parse_error("bool", text)),
    }
}

/// First run of optional minus signs followed by digits and dots.
fn number_in(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let is_body = |b: u8| b.is_ascii_digit() || b == b'.';

    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while i < bytes.len() && bytes[i] == b'-' {
            i += 1;
        }
        let body = i;
        while i < bytes.len() && is_body(bytes[i]) {
            i += 1;
        }
        if i > body {
            // keep a single leading minus
            let sign = if body > start { body - 1 } else { body };
            return text.get(sign..i);
        }
        if i == start {
            i += 1;
        }
    }
    None
}

/// Trim surrounding prose from a JSON reply; empty becomes `{}` / `[]`.
fn json_slice(text: &str, open: char, close: char) -> &str {
    let from = text.find(open).unwrap_or(0);
    let text = &text[from..];
    let to = text.rfind(close).map_or(text.len(), |i| i + close.len_utf8());
    let text = &text[..to];
    if text.trim().is_empty() {
        if open == '{' { "{}" } else { "[]" }
    } else {
        text
    }
}
