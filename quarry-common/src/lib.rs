//! Shared types for the quarry code sandbox.
//!
//! Everything in this crate is plain data: it can be serialized, sent across
//! the isolation boundary and handed to UI call sites without holding any live
//! reference into a sandbox.

pub mod protocol;
pub mod types;

pub use protocol::*;
pub use types::*;
