//! Request and result types seen by call sites

use crate::protocol::{Arguments, ScriptError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Request to execute user code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// User-authored source, before transpilation
    pub code: String,

    /// Top-level callable inside `code` to invoke
    pub function_name: String,

    /// Parameters passed positionally in insertion order
    #[serde(default)]
    pub arguments: Arguments,
}

impl ExecutionRequest {
    /// Create a request with no arguments
    pub fn new(code: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            function_name: function_name.into(),
            arguments: Arguments::new(),
        }
    }

    /// Append a single argument
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Append every field of a serializable struct (or map) as an argument,
    /// in field order.
    pub fn with_arguments<S: Serialize>(mut self, arguments: &S) -> serde_json::Result<Self> {
        match serde_json::to_value(arguments)? {
            Value::Object(map) => {
                self.arguments.extend(map);
                Ok(self)
            }
            other => Err(serde::de::Error::custom(format!(
                "arguments must serialize to an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Location in the caller's original source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 1-based
    pub line: u32,
    /// 0-based
    pub column: u32,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Where a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Transpilation rejected the code; never carries a position
    Compile,
    /// User code threw or its awaitable rejected
    Runtime,
    /// The isolation context misbehaved: no reply, or a reply of foreign origin
    Containment,
    /// No reply before the deadline
    Timeout,
    /// The context exceeded its heap budget
    ResourceLimit,
}

impl ErrorKind {
    /// Whether the failure was caused by the user's code rather than the
    /// sandbox infrastructure.
    pub fn is_user_error(self) -> bool {
        matches!(self, ErrorKind::Compile | ErrorKind::Runtime)
    }
}

/// Failure reported to a call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub error: ScriptError,
    /// Original-source location, when the failure could be traced back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, error: ScriptError) -> Self {
        Self {
            kind,
            error,
            position: None,
        }
    }

    pub fn with_position(mut self, position: Option<Position>) -> Self {
        self.position = position;
        self
    }

    pub fn message(&self) -> &str {
        &self.error.message
    }
}

/// Outcome of one `execute` call.
///
/// Serializes as `{"success": true, "returnValue": ...}` or
/// `{"success": false, "error": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult<T> {
    Success(T),
    Failure(ExecutionError),
}

impl<T> ExecutionResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn return_value(&self) -> Option<&T> {
        match self {
            ExecutionResult::Success(value) => Some(value),
            ExecutionResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, ExecutionError> {
        match self {
            ExecutionResult::Success(value) => Ok(value),
            ExecutionResult::Failure(error) => Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExecutionResult<U> {
        match self {
            ExecutionResult::Success(value) => ExecutionResult::Success(f(value)),
            ExecutionResult::Failure(error) => ExecutionResult::Failure(error),
        }
    }
}

impl<T> From<Result<T, ExecutionError>> for ExecutionResult<T> {
    fn from(result: Result<T, ExecutionError>) -> Self {
        match result {
            Ok(value) => ExecutionResult::Success(value),
            Err(error) => ExecutionResult::Failure(error),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireResultRef<'a, T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_value: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ExecutionError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    success: bool,
    #[serde(default)]
    return_value: Value,
    #[serde(default)]
    error: Option<ExecutionError>,
}

impl<T: Serialize> Serialize for ExecutionResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireResultRef {
            success: self.is_success(),
            return_value: self.return_value(),
            error: self.error(),
        }
        .serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ExecutionResult<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireResult::deserialize(deserializer)?;
        if wire.success {
            serde_json::from_value(wire.return_value)
                .map(ExecutionResult::Success)
                .map_err(serde::de::Error::custom)
        } else {
            wire.error
                .map(ExecutionResult::Failure)
                .ok_or_else(|| serde::de::Error::missing_field("error"))
        }
    }
}
