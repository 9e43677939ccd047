//! Host-side error types

use quarry_common::{ErrorKind, ExecutionError, SandboxId, ScriptError};
use std::time::Duration;

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Failures observed by the host while driving a sandbox
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The isolation context could not be created or died before signalling
    /// readiness
    #[error("failed to create sandbox context: {0}")]
    ContextCreation(String),

    /// The context went away without posting a reply
    #[error("sandbox context exited without replying")]
    NoReply,

    /// A reply arrived from a context other than the one created for the call
    #[error("reply from sandbox {received} does not match pending sandbox {expected}")]
    ForeignReply {
        expected: SandboxId,
        received: SandboxId,
    },

    /// No reply before the deadline
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// The isolate hit its heap ceiling
    #[error("sandbox heap limit of {limit} bytes exceeded")]
    HeapLimitExceeded { limit: usize },

    /// Transpilation rejected the source
    #[error("{0}")]
    Transpile(String),

    /// A function or parameter name that cannot be spliced into the call
    #[error("'{0}' is not a valid identifier")]
    InvalidIdentifier(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SandboxError {
    /// Position of this failure in the call-site taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::Transpile(_) | SandboxError::InvalidIdentifier(_) => ErrorKind::Compile,
            SandboxError::Timeout(_) => ErrorKind::Timeout,
            SandboxError::HeapLimitExceeded { .. } => ErrorKind::ResourceLimit,
            SandboxError::ContextCreation(_)
            | SandboxError::NoReply
            | SandboxError::ForeignReply { .. } => ErrorKind::Containment,
            SandboxError::Serialization(_) => ErrorKind::Runtime,
            SandboxError::Config(_) | SandboxError::Io(_) => ErrorKind::Containment,
        }
    }

    fn error_name(&self) -> &'static str {
        match self {
            SandboxError::Transpile(_) | SandboxError::InvalidIdentifier(_) => "SyntaxError",
            SandboxError::Timeout(_) => "TimeoutError",
            SandboxError::HeapLimitExceeded { .. } => "RangeError",
            SandboxError::Serialization(_) => "ReturnValueError",
            _ => "SandboxError",
        }
    }

    /// Whether the failure is infrastructure rather than user code
    pub fn is_containment(&self) -> bool {
        self.kind() == ErrorKind::Containment
    }
}

impl From<SandboxError> for ExecutionError {
    fn from(err: SandboxError) -> Self {
        let kind = err.kind();
        ExecutionError::new(kind, ScriptError::new(err.error_name(), err.to_string()))
    }
}
