//! Decoding of raw framework events into typed observation cards.
//!
//! `content` and `metadata` arrive as untyped JSON. [`decode`] is the single
//! place that inspects their shape; [`normalize`] wraps it so callers always
//! get exactly one [`Observation`] back, even for garbage input.

use crate::art::RawObservation;
use chrono::{Local, TimeZone, Utc};
use rand::Rng;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

pub const UNKNOWN_TOOL: &str = "unknown_tool";
pub const NORMALIZE_FAILURE_MESSAGE: &str = "Error processing observation data.";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Intent,
    Plan,
    ToolCall,
    ToolExecution,
    Synthesis,
    Error,
    Unknown,
}

impl ObservationKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "INTENT" => Self::Intent,
            "PLAN" => Self::Plan,
            "TOOL_CALL" => Self::ToolCall,
            "TOOL_EXECUTION" => Self::ToolExecution,
            "SYNTHESIS" => Self::Synthesis,
            "ERROR" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intent => "INTENT",
            Self::Plan => "PLAN",
            Self::ToolCall => "TOOL_CALL",
            Self::ToolExecution => "TOOL_EXECUTION",
            Self::Synthesis => "SYNTHESIS",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Intent => "Intent",
            Self::Plan => "Plan",
            Self::ToolCall => "Tool Call",
            Self::ToolExecution => "Tool Execution",
            Self::Synthesis => "Synthesis",
            Self::Error => "Error",
            Self::Unknown => "Unknown Observation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Error,
    Unknown,
}

impl ExecutionStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "success" => Self::Success,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObservationData {
    Intent {
        intent: String,
    },
    Plan {
        plan: String,
        raw_output: String,
    },
    ToolCall {
        calls: Vec<ToolCallRecord>,
    },
    ToolExecution {
        call_id: Option<String>,
        tool_name: Option<String>,
        status: ExecutionStatus,
        output: Value,
    },
    Synthesis {
        text: String,
    },
    Error {
        message: String,
        details: Value,
    },
}

impl ObservationData {
    pub fn kind(&self) -> ObservationKind {
        match self {
            Self::Intent { .. } => ObservationKind::Intent,
            Self::Plan { .. } => ObservationKind::Plan,
            Self::ToolCall { .. } => ObservationKind::ToolCall,
            Self::ToolExecution { .. } => ObservationKind::ToolExecution,
            Self::Synthesis { .. } => ObservationKind::Synthesis,
            Self::Error { .. } => ObservationKind::Error,
        }
    }

    /// JSON view of the card, used when the whole card is copied.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Intent { intent } => serde_json::json!({ "intent": intent }),
            Self::Plan { plan, raw_output } => {
                serde_json::json!({ "plan": plan, "rawOutput": raw_output })
            }
            Self::ToolCall { calls } => serde_json::json!({
                "toolCalls": calls
                    .iter()
                    .map(|call| serde_json::json!({
                        "callId": call.call_id,
                        "toolName": call.tool_name,
                        "arguments": call.arguments,
                    }))
                    .collect::<Vec<_>>(),
            }),
            Self::ToolExecution {
                call_id,
                tool_name,
                status,
                output,
            } => serde_json::json!({
                "callId": call_id,
                "toolName": tool_name,
                "status": status.as_str(),
                "output": output,
            }),
            Self::Synthesis { text } => serde_json::json!({ "rawOutput": text }),
            Self::Error { message, details } => {
                serde_json::json!({ "message": message, "details": details })
            }
        }
    }

    /// Text placed on the clipboard by the card's main copy button.
    pub fn copy_payload(&self) -> String {
        match self {
            Self::Plan { raw_output, plan } => {
                if raw_output.is_empty() {
                    plan.clone()
                } else {
                    raw_output.clone()
                }
            }
            Self::Synthesis { text } => text.clone(),
            other => pretty(&other.to_json()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: String,
    pub data: ObservationData,
    pub timestamp: Option<String>,
}

impl Observation {
    pub fn kind(&self) -> ObservationKind {
        self.data.kind()
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("observation has no category")]
    MissingCategory,

    #[error("failed to serialize observation content: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Converts one raw event into exactly one observation. Decode failures come
/// back as an `ERROR` card carrying the raw event.
pub fn normalize(raw: &RawObservation) -> Observation {
    match decode(raw) {
        Ok(data) => Observation {
            id: observation_id("obs", raw.timestamp.unwrap_or_else(now_millis)),
            data,
            timestamp: Some(display_time(raw.timestamp)),
        },
        Err(err) => {
            warn!(category = %raw.kind, error = %err, "failed to normalize observation");
            Observation {
                id: observation_id("err", now_millis()),
                data: ObservationData::Error {
                    message: NORMALIZE_FAILURE_MESSAGE.to_string(),
                    details: serde_json::to_value(raw).unwrap_or(Value::Null),
                },
                timestamp: Some(display_time(None)),
            }
        }
    }
}

pub fn decode(raw: &RawObservation) -> Result<ObservationData, NormalizeError> {
    let category = raw.kind.trim();
    if category.is_empty() {
        return Err(NormalizeError::MissingCategory);
    }

    let content = &raw.content;
    let data = match ObservationKind::parse(category) {
        ObservationKind::Intent => ObservationData::Intent {
            intent: text_or(content, "intent", "Unknown Intent")?,
        },
        ObservationKind::Plan => ObservationData::Plan {
            plan: text_or(content, "plan", "No plan details")?,
            raw_output: stringify(content)?,
        },
        ObservationKind::ToolCall => ObservationData::ToolCall {
            calls: tool_calls(content),
        },
        ObservationKind::ToolExecution => {
            let metadata = raw.metadata.as_ref().unwrap_or(&Value::Null);
            let status = field(content, "status")
                .map(stringify)
                .transpose()?
                .map(|raw_status| ExecutionStatus::from_raw(&raw_status))
                .unwrap_or(ExecutionStatus::Unknown);
            let output = non_null_field(content, "output")
                .or_else(|| non_null_field(content, "error"))
                .cloned()
                .unwrap_or_else(|| {
                    if content.is_null() {
                        Value::Object(Map::new())
                    } else {
                        content.clone()
                    }
                });

            ObservationData::ToolExecution {
                call_id: field(metadata, "callId").map(stringify).transpose()?,
                tool_name: field(metadata, "toolName").map(stringify).transpose()?,
                status,
                output,
            }
        }
        ObservationKind::Synthesis => ObservationData::Synthesis {
            text: text_or(content, "thoughts", "No synthesis details")?,
        },
        ObservationKind::Error => {
            let message = match content {
                Value::Object(_) => match field(content, "message") {
                    Some(message) => stringify(message)?,
                    None => serde_json::to_string(content)?,
                },
                other => stringify(other)?,
            };
            ObservationData::Error {
                message: format!("Agent Error: {message}"),
                details: content.clone(),
            }
        }
        ObservationKind::Unknown => {
            warn!(category, "unhandled observation category");
            ObservationData::Synthesis {
                text: format!("[{category}] {}", serde_json::to_string(content)?),
            }
        }
    };

    Ok(data)
}

/// Null, `false`, zero and the empty string count as absent.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_object()
        .and_then(|object| object.get(key))
        .filter(|value| is_truthy(value))
}

/// Like [`field`] but only a missing key or null falls through, so `""`,
/// `false` and `0` are kept.
fn non_null_field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_object()
        .and_then(|object| object.get(key))
        .filter(|value| !value.is_null())
}

/// Strings stay verbatim, everything else becomes compact JSON.
fn stringify(value: &Value) -> Result<String, serde_json::Error> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => serde_json::to_string(other),
    }
}

fn text_or(content: &Value, key: &str, placeholder: &str) -> Result<String, NormalizeError> {
    if let Some(value) = field(content, key) {
        return Ok(stringify(value)?);
    }
    if is_truthy(content) {
        return Ok(stringify(content)?);
    }
    Ok(placeholder.to_string())
}

fn tool_calls(content: &Value) -> Vec<ToolCallRecord> {
    let list = match content {
        Value::Array(items) => Some(items),
        _ => field(content, "toolCalls")
            .or_else(|| field(content, "calls"))
            .and_then(Value::as_array),
    };

    list.map(|items| items.iter().map(tool_call).collect())
        .unwrap_or_default()
}

fn tool_call(raw: &Value) -> ToolCallRecord {
    let text = |key: &str| match field(raw, key) {
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    };

    ToolCallRecord {
        call_id: text("callId")
            .unwrap_or_else(|| format!("call-{}-{}", now_millis(), random_suffix())),
        tool_name: text("toolName").unwrap_or_else(|| UNKNOWN_TOOL.to_string()),
        arguments: raw
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

fn observation_id(prefix: &str, millis: i64) -> String {
    format!("{prefix}-{millis}-{}", random_suffix())
}

fn display_time(timestamp_millis: Option<i64>) -> String {
    timestamp_millis
        .and_then(|millis| Local.timestamp_millis_opt(millis).single())
        .unwrap_or_else(Local::now)
        .format("%H:%M:%S")
        .to_string()
}
