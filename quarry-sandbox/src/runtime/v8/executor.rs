//! Sandbox-side executor
//!
//! The host seals the transpiled code into an [`Envelope`] whose body ends with
//! a synthesized `return <function>(<args...>)` trailer. Inside the isolate,
//! `executor.js` compiles that body with the `Function` constructor, awaits the
//! call and posts exactly one [`Reply`] back through `op_sandbox_reply`.

use crate::error::{Result, SandboxError};
use deno_core::{op2, Extension, OpState};
use quarry_common::{Arguments, Delivery, Envelope, Reply, SandboxId, ScriptError};
use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::oneshot;

/// Lines V8 prepends when it compiles a `Function` constructor body:
/// `function anonymous(<params>` and `) {`.
pub const SYNTHETIC_HEADER_LINES: u32 = 2;

/// Bootstrap evaluated in every fresh isolate
pub(crate) const EXECUTOR_JS: &str = include_str!("executor.js");

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid identifier pattern"));

const RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Reject names that cannot be spliced verbatim into the call trailer or used
/// as a `Function` parameter.
pub(crate) fn ensure_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) && !RESERVED_WORDS.contains(&name) {
        Ok(())
    } else {
        Err(SandboxError::InvalidIdentifier(name.to_string()))
    }
}

/// Build the envelope for one call. Argument order follows the map's order,
/// which is the order the caller supplied.
pub(crate) fn seal(
    transpiled: &str,
    function_name: &str,
    arguments: Arguments,
) -> Result<Envelope> {
    ensure_identifier(function_name)?;
    for name in arguments.keys() {
        ensure_identifier(name)?;
    }

    let call_args = arguments
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let code = format!("{transpiled}\nreturn {function_name}({call_args})");

    Ok(Envelope {
        code,
        function_name: function_name.to_string(),
        arguments,
    })
}

/// Per-isolate state shared with the executor ops
pub(crate) struct ExecutorSlot {
    pub origin: SandboxId,
    pub envelope: Option<Envelope>,
    pub reply_tx: Option<oneshot::Sender<Delivery>>,
}

impl ExecutorSlot {
    pub fn new(origin: SandboxId, reply_tx: oneshot::Sender<Delivery>) -> Self {
        Self {
            origin,
            envelope: None,
            reply_tx: Some(reply_tx),
        }
    }
}

/// Hand the envelope to the executor. Yields it once; later calls get an
/// empty string.
#[op2]
#[string]
fn op_sandbox_envelope(state: &mut OpState) -> String {
    let slot = state.borrow_mut::<ExecutorSlot>();
    match slot.envelope.take() {
        Some(envelope) => serde_json::to_string(&envelope).unwrap_or_default(),
        None => String::new(),
    }
}

/// Post the reply. Only the first reply of a context is delivered.
#[op2(fast)]
fn op_sandbox_reply(state: &mut OpState, #[string] reply: &str) -> bool {
    let slot = state.borrow_mut::<ExecutorSlot>();
    let origin = slot.origin;
    let Some(reply_tx) = slot.reply_tx.take() else {
        tracing::warn!(sandbox_id = %origin, "Ignoring repeated reply from sandbox");
        return false;
    };

    let reply = serde_json::from_str::<Reply>(reply).unwrap_or_else(|e| {
        Reply::failure(ScriptError::new(
            "ReturnValueError",
            format!("malformed reply: {}", e),
        ))
    });

    reply_tx.send(Delivery { origin, reply }).is_ok()
}

#[op2(fast)]
fn op_sandbox_console(state: &mut OpState, #[string] level: &str, #[string] message: &str) {
    let sandbox_id = state.borrow::<ExecutorSlot>().origin;
    match level {
        "error" => tracing::error!(
            target: "quarry_sandbox::console",
            sandbox_id = %sandbox_id,
            "{}",
            message
        ),
        "warn" => tracing::warn!(
            target: "quarry_sandbox::console",
            sandbox_id = %sandbox_id,
            "{}",
            message
        ),
        "debug" => tracing::debug!(
            target: "quarry_sandbox::console",
            sandbox_id = %sandbox_id,
            "{}",
            message
        ),
        _ => tracing::info!(
            target: "quarry_sandbox::console",
            sandbox_id = %sandbox_id,
            "{}",
            message
        ),
    }
}

/// Extension carrying the executor ops
pub(crate) fn executor_extension() -> Extension {
    let ops = vec![op_sandbox_envelope(), op_sandbox_reply(), op_sandbox_console()];

    Extension {
        name: "quarry_executor",
        ops: std::borrow::Cow::Owned(ops),
        ..Default::default()
    }
}
