//! Wire types exchanged across the isolation boundary.
//!
//! One [`Envelope`] is sent into a sandbox per invocation and at most one
//! [`Reply`] comes back. The sandbox's delivery mechanism stamps the reply with
//! the [`SandboxId`] of the context that produced it, which the host compares
//! against the id it allocated for the call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered mapping of parameter name to JSON value.
///
/// Insertion order is preserved and becomes the positional order of the call.
pub type Arguments = serde_json::Map<String, Value>;

/// Identity of a single sandbox context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxId(pub uuid::Uuid);

impl SandboxId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The packet sent into a sandbox.
///
/// `code` is the complete body of the callable the executor constructs: the
/// transpiled user code followed by the synthesized invocation trailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub code: String,
    pub function_name: String,
    pub arguments: Arguments,
}

impl Envelope {
    /// Parameter names in call order
    pub fn arg_names(&self) -> impl Iterator<Item = &str> {
        self.arguments.keys().map(String::as_str)
    }
}

/// Plain-data description of an error raised inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptError {
    /// Error class name, e.g. `TypeError`
    pub name: String,
    pub message: String,
    /// Raw execution trace as reported by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

/// The single answer a sandbox posts back for an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScriptError>,
}

impl Reply {
    pub fn success(return_value: Value) -> Self {
        Self {
            success: true,
            return_value: Some(return_value),
            error: None,
        }
    }

    pub fn failure(error: ScriptError) -> Self {
        Self {
            success: false,
            return_value: None,
            error: Some(error),
        }
    }

    /// Collapse the reply into the value or the error it carries.
    ///
    /// A missing return value reads as `null`; a failure without an error
    /// payload still yields a (generic) error.
    pub fn into_outcome(self) -> Result<Value, ScriptError> {
        if self.success {
            Ok(self.return_value.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| {
                ScriptError::new("Error", "sandbox reported failure without an error")
            }))
        }
    }
}

/// A reply together with the identity of the context that delivered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub origin: SandboxId,
    pub reply: Reply,
}
