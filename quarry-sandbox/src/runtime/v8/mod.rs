//! V8 isolation boundary using deno_core
//!
//! Every dispatch spins up a brand-new isolate on its own thread. The isolate
//! only ever sees the executor bootstrap and the envelope; it has no module
//! loader, no filesystem and no network ops.

pub mod executor;

use crate::limits::ResourceLimits;
use crate::{Result, SandboxError};
use async_trait::async_trait;
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use executor::{ExecutorSlot, EXECUTOR_JS};
use quarry_common::{Delivery, Envelope, SandboxId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::oneshot;

/// V8 JavaScript runtime
#[derive(Debug, Clone)]
pub struct V8Runtime {
    /// Resource limits applied to every isolate
    limits: ResourceLimits,

    /// Context threads started by this runtime (and its clones) still alive
    active_contexts: Arc<AtomicUsize>,
}

impl V8Runtime {
    /// Create a new V8 runtime with default limits
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::default())
    }

    /// Create V8 runtime with custom resource limits
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self {
            limits,
            active_contexts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Number of context threads that have not exited yet
    pub fn active_contexts(&self) -> usize {
        self.active_contexts.load(Ordering::SeqCst)
    }
}

impl Default for V8Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Channels handed to the isolate thread
struct ContextChannels {
    ready_tx: oneshot::Sender<v8::IsolateHandle>,
    envelope_rx: oneshot::Receiver<Envelope>,
    reply_tx: oneshot::Sender<Delivery>,
    /// Resolves (closed) once the host is done with the context
    teardown_rx: oneshot::Receiver<()>,
    heap_exceeded: Arc<AtomicBool>,
}

/// Counts a context thread for as long as it lives
struct ContextLease(Arc<AtomicUsize>);

impl ContextLease {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active.clone())
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Terminates and reaps a context on every exit from `dispatch`, including
/// the caller dropping the future while it is parked.
struct Teardown {
    sandbox_id: SandboxId,
    isolate: Option<v8::IsolateHandle>,
    context: Option<JoinHandle<()>>,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if let Some(isolate) = self.isolate.take() {
            isolate.terminate_execution();
        }
        if let Some(context) = self.context.take() {
            reap(self.sandbox_id, context);
        }
    }
}

#[async_trait]
impl super::Runtime for V8Runtime {
    async fn dispatch(&self, sandbox_id: SandboxId, envelope: Envelope) -> Result<Delivery> {
        let start = Instant::now();
        let limits = self.limits.clone();

        let (ready_tx, ready_rx) = oneshot::channel();
        let (envelope_tx, envelope_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        let (_teardown_tx, teardown_rx) = oneshot::channel::<()>();
        let heap_exceeded = Arc::new(AtomicBool::new(false));

        let channels = ContextChannels {
            ready_tx,
            envelope_rx,
            reply_tx,
            teardown_rx,
            heap_exceeded: heap_exceeded.clone(),
        };
        let thread_limits = limits.clone();
        let lease = ContextLease::acquire(&self.active_contexts);
        let context = std::thread::Builder::new()
            .name(format!("quarry-sandbox-{}", sandbox_id))
            .spawn(move || {
                let _lease = lease;
                run_context(sandbox_id, thread_limits, channels)
            })
            .map_err(|e| SandboxError::ContextCreation(e.to_string()))?;

        let mut teardown = Teardown {
            sandbox_id,
            isolate: None,
            context: Some(context),
        };

        // Nothing is delivered until the context has finished bootstrapping
        let isolate = ready_rx.await.map_err(|_| {
            SandboxError::ContextCreation("context exited before signalling readiness".to_string())
        })?;
        teardown.isolate = Some(isolate);
        tracing::debug!(
            sandbox_id = %sandbox_id,
            startup_ms = start.elapsed().as_millis() as u64,
            "Sandbox context ready"
        );

        if envelope_tx.send(envelope).is_err() {
            return Err(SandboxError::ContextCreation(
                "context exited before receiving the envelope".to_string(),
            ));
        }

        let outcome = match limits.max_duration {
            Some(max_duration) => match tokio::time::timeout(max_duration, reply_rx).await {
                Ok(received) => received.ok(),
                Err(_elapsed) => {
                    tracing::warn!(
                        sandbox_id = %sandbox_id,
                        timeout_ms = max_duration.as_millis() as u64,
                        "Sandbox execution timed out; terminating context"
                    );
                    return Err(SandboxError::Timeout(max_duration));
                }
            },
            None => reply_rx.await.ok(),
        };

        // The reply is all we need; anything still scheduled in the isolate dies here
        drop(teardown);

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Some(delivery) => {
                tracing::debug!(
                    sandbox_id = %sandbox_id,
                    success = delivery.reply.success,
                    duration_ms,
                    "Sandbox replied"
                );
                Ok(delivery)
            }
            None if heap_exceeded.load(Ordering::SeqCst) => {
                let limit = limits.max_heap_bytes.unwrap_or_default();
                tracing::warn!(sandbox_id = %sandbox_id, limit, "Sandbox heap limit exceeded");
                Err(SandboxError::HeapLimitExceeded { limit })
            }
            None => Err(SandboxError::NoReply),
        }
    }

    fn name(&self) -> &str {
        "v8"
    }
}

/// Body of the isolate thread: bootstrap, wait for the envelope, run the
/// executor until its event loop drains or the host terminates it.
fn run_context(sandbox_id: SandboxId, limits: ResourceLimits, channels: ContextChannels) {
    let ContextChannels {
        ready_tx,
        envelope_rx,
        reply_tx,
        teardown_rx,
        heap_exceeded,
    } = channels;

    let event_loop = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(
                sandbox_id = %sandbox_id,
                error = %e,
                "Failed to build sandbox event loop"
            );
            return;
        }
    };

    event_loop.block_on(async move {
        let mut runtime = create_isolate(&limits);
        let isolate = runtime.v8_isolate().thread_safe_handle();

        if limits.max_heap_bytes.is_some() {
            let handle = isolate.clone();
            runtime.add_near_heap_limit_callback(move |current_limit, _initial_limit| {
                heap_exceeded.store(true, Ordering::SeqCst);
                handle.terminate_execution();
                // Headroom for V8 to unwind the terminated script
                current_limit * 2
            });
        }

        runtime
            .op_state()
            .borrow_mut()
            .put(ExecutorSlot::new(sandbox_id, reply_tx));

        if ready_tx.send(isolate).is_err() {
            return;
        }
        let Ok(envelope) = envelope_rx.await else {
            return;
        };

        let op_state = runtime.op_state();
        op_state.borrow_mut().borrow_mut::<ExecutorSlot>().envelope = Some(envelope);
        drop(op_state);

        if let Err(e) = runtime.execute_script("quarry:executor", EXECUTOR_JS) {
            tracing::debug!(sandbox_id = %sandbox_id, error = %e, "Executor bootstrap aborted");
            return;
        }
        if let Err(e) = runtime.run_event_loop(PollEventLoopOptions::default()).await {
            tracing::debug!(
                sandbox_id = %sandbox_id,
                error = %e,
                "Sandbox event loop ended with error"
            );
            return;
        }

        // A drained loop without a reply is a hang (e.g. a promise that never
        // settles). Under a deadline the context stays up until the host gives
        // up on it, so it surfaces as a timeout.
        let replied = runtime
            .op_state()
            .borrow()
            .borrow::<ExecutorSlot>()
            .reply_tx
            .is_none();
        if !replied && limits.max_duration.is_some() {
            tracing::debug!(sandbox_id = %sandbox_id, "Event loop drained without a reply");
            let _ = teardown_rx.await;
        }
    });
}

fn create_isolate(limits: &ResourceLimits) -> JsRuntime {
    let mut options = RuntimeOptions {
        extensions: vec![executor::executor_extension()],
        ..Default::default()
    };

    if let (Some(initial_bytes), Some(max_bytes)) =
        (limits.initial_heap_bytes(), limits.max_heap_bytes)
    {
        options.create_params =
            Some(v8::CreateParams::default().heap_limits(initial_bytes, max_bytes));
    }

    JsRuntime::new(options)
}

/// Join the isolate thread off the async path. Outside a tokio runtime the
/// thread is left detached; it exits on its own once terminated.
fn reap(sandbox_id: SandboxId, context: JoinHandle<()>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    handle.spawn_blocking(move || {
        if context.join().is_err() {
            tracing::error!(sandbox_id = %sandbox_id, "Sandbox context thread panicked");
        }
    });
}
