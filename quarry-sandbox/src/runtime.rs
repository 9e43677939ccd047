//! Runtime trait and implementations

pub mod v8;

use crate::Result;
use async_trait::async_trait;
use quarry_common::{Delivery, Envelope, SandboxId};

/// Isolation boundary abstraction.
///
/// An implementation creates a brand-new context for every call, delivers the
/// envelope to it once it is ready, and resolves with the single reply the
/// context posts. The context is torn down before `dispatch` returns.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run one envelope in a fresh context identified by `sandbox_id`
    async fn dispatch(&self, sandbox_id: SandboxId, envelope: Envelope) -> Result<Delivery>;

    /// Get runtime name
    fn name(&self) -> &str;
}
