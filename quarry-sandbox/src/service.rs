//! Sandbox service - main entry point

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::runtime::v8::{executor, V8Runtime};
use crate::runtime::Runtime;
use crate::translate::translate;
use crate::transpile::{TranspilationResult, Transpiler};
use quarry_common::{
    Arguments, ErrorKind, ExecutionError, ExecutionRequest, ExecutionResult, Position, SandboxId,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Runs user functions in isolated contexts
///
/// Each call transpiles the source, creates a brand-new context, delivers the
/// envelope, waits for the single reply and tears the context down. Contexts
/// are never reused, so calls cannot observe each other.
#[derive(Clone)]
pub struct SandboxService {
    runtime: Arc<dyn Runtime>,
    transpiler: Transpiler,
}

impl SandboxService {
    /// Create a sandbox service with the given runtime and the default
    /// TypeScript transpiler
    pub fn new(runtime: impl Runtime + 'static) -> Self {
        Self::with_transpiler(runtime, Transpiler::default())
    }

    pub fn with_transpiler(runtime: impl Runtime + 'static, transpiler: Transpiler) -> Self {
        Self {
            runtime: Arc::new(runtime),
            transpiler,
        }
    }

    /// Build a V8-backed service from configuration
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let transpiler = Transpiler::new(&config.transpile)?;
        Ok(Self::with_transpiler(
            V8Runtime::with_limits(config.limits.clone()),
            transpiler,
        ))
    }

    /// Get the runtime name
    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    /// Run `function_name` from `code` with `arguments`, decoding the return
    /// value as `T`.
    ///
    /// Every failure attributable to the user's code, and every timeout,
    /// resource or containment failure observed after the context came up, is
    /// reported as [`ExecutionResult::Failure`]. `Err` is reserved for a context
    /// that could not be created at all.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        code: &str,
        function_name: &str,
        arguments: Arguments,
    ) -> Result<ExecutionResult<T>> {
        let sandbox_id = SandboxId::new();
        let span = tracing::info_span!(
            "execute",
            sandbox_id = %sandbox_id,
            function = %function_name,
            runtime = self.runtime.name(),
        );

        self.execute_in(sandbox_id, code, function_name, arguments)
            .instrument(span)
            .await
    }

    /// [`Self::execute`] for a prepared request
    pub async fn execute_request<T: DeserializeOwned>(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult<T>> {
        let ExecutionRequest {
            code,
            function_name,
            arguments,
        } = request;
        self.execute(&code, &function_name, arguments).await
    }

    async fn execute_in<T: DeserializeOwned>(
        &self,
        sandbox_id: SandboxId,
        code: &str,
        function_name: &str,
        arguments: Arguments,
    ) -> Result<ExecutionResult<T>> {
        tracing::info!(
            code_len = code.len(),
            arg_count = arguments.len(),
            "Executing user function"
        );

        // Identifiers are checked before transpiling so bad names never reach a context
        if let Err(e) = validate_names(function_name, &arguments) {
            return Ok(self.reject(e));
        }

        let transpiled = match self.transpiler.transpile(code) {
            Ok(transpiled) => transpiled,
            Err(e) => return Ok(self.reject(e)),
        };

        let envelope = match executor::seal(&transpiled.output, function_name, arguments) {
            Ok(envelope) => envelope,
            Err(e) => return Ok(self.reject(e)),
        };

        let delivery = match self.runtime.dispatch(sandbox_id, envelope).await {
            Ok(delivery) => delivery,
            Err(e @ SandboxError::ContextCreation(_)) => {
                tracing::error!(error = %e, "Sandbox context could not be created");
                return Err(e);
            }
            Err(e) => return Ok(self.reject(e)),
        };

        if delivery.origin != sandbox_id {
            let e = SandboxError::ForeignReply {
                expected: sandbox_id,
                received: delivery.origin,
            };
            return Ok(self.reject(e));
        }

        let value = match delivery.reply.into_outcome() {
            Ok(value) => value,
            Err(script_error) => {
                let position = position_of(script_error.stack.as_deref(), &transpiled);
                tracing::debug!(
                    kind = ?ErrorKind::Runtime,
                    error = %script_error,
                    line = position.map(|p| p.line),
                    "User function failed"
                );
                return Ok(ExecutionResult::Failure(
                    ExecutionError::new(ErrorKind::Runtime, script_error).with_position(position),
                ));
            }
        };

        match decode(value) {
            Ok(value) => {
                tracing::debug!("User function returned");
                Ok(ExecutionResult::Success(value))
            }
            Err(e) => Ok(self.reject(e)),
        }
    }

    /// Turn a host-observed failure into a call-site result, logging it at a
    /// level that matches who is to blame.
    fn reject<T>(&self, err: SandboxError) -> ExecutionResult<T> {
        let kind = err.kind();
        match kind {
            ErrorKind::Compile | ErrorKind::Runtime => {
                tracing::debug!(kind = ?kind, error = %err, "User code rejected")
            }
            ErrorKind::Timeout | ErrorKind::ResourceLimit => {
                tracing::warn!(kind = ?kind, error = %err, "Execution aborted")
            }
            ErrorKind::Containment => {
                tracing::error!(kind = ?kind, error = %err, "Containment failure")
            }
        }
        ExecutionResult::Failure(err.into())
    }
}

fn validate_names(function_name: &str, arguments: &Arguments) -> Result<()> {
    executor::ensure_identifier(function_name)?;
    arguments
        .keys()
        .try_for_each(|name| executor::ensure_identifier(name))
}

fn position_of(stack: Option<&str>, transpiled: &TranspilationResult) -> Option<Position> {
    stack.and_then(|stack| translate(stack, &transpiled.source_map))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
