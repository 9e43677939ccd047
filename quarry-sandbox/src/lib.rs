//! Quarry Sandbox - isolated execution of user-supplied functions
//!
//! Takes a short TypeScript (or JavaScript) source, transpiles it, runs the
//! named function inside a fresh V8 isolate with no host authority, and hands
//! back a plain-data [`ExecutionResult`]. Runtime failures are traced back to
//! line/column positions in the original source.

mod config;
mod error;
mod limits;
mod runtime;
mod service;
mod transpile;
mod translate;

pub use config::{SandboxConfig, SourceLanguage, TranspileConfig};
pub use error::{Result, SandboxError};
pub use limits::ResourceLimits;
pub use runtime::v8::{executor::SYNTHETIC_HEADER_LINES, V8Runtime};
pub use runtime::Runtime;
pub use service::SandboxService;
pub use translate::translate;
pub use transpile::{SourceMapData, TranspilationResult, Transpiler};

/// Re-export of the shared plain-data types
pub use quarry_common::{
    Arguments, Delivery, Envelope, ErrorKind, ExecutionError, ExecutionRequest, ExecutionResult,
    Position, Reply, SandboxId, ScriptError,
};
