//! Resource limits configuration for sandboxed execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource limits applied to each sandbox context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Deadline for a reply; the isolate is terminated when it elapses
    #[serde(with = "humantime_serde")]
    pub max_duration: Option<Duration>,

    /// V8 heap ceiling in bytes
    pub max_heap_bytes: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_duration: Some(Duration::from_secs(30)), // 30 seconds default
            max_heap_bytes: Some(100 * 1024 * 1024),     // 100 MB default
        }
    }
}

impl ResourceLimits {
    /// Create unlimited resource configuration (dangerous!)
    pub fn unlimited() -> Self {
        Self {
            max_duration: None,
            max_heap_bytes: None,
        }
    }

    /// Create strict limits for untrusted code
    pub fn strict() -> Self {
        Self {
            max_duration: Some(Duration::from_secs(5)),
            max_heap_bytes: Some(32 * 1024 * 1024),
        }
    }

    /// Create permissive limits for trusted code
    pub fn permissive() -> Self {
        Self {
            max_duration: Some(Duration::from_secs(300)), // 5 minutes
            max_heap_bytes: Some(512 * 1024 * 1024),
        }
    }

    /// Replace the deadline
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Initial V8 heap size derived from the ceiling: 10% of it, at most 10 MB
    pub(crate) fn initial_heap_bytes(&self) -> Option<usize> {
        self.max_heap_bytes
            .map(|max_bytes| (max_bytes / 10).min(10 * 1024 * 1024))
    }
}
