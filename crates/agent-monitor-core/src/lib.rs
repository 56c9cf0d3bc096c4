//! agent-monitor-core - Core types for agent log monitoring
//!
//! This crate provides the selection model shared by the monitor client and
//! its front ends: which agent to watch, at what verbosity, and how the log
//! endpoint should be queried.

pub mod error;
pub mod models;

pub use error::{PreconditionError, PreconditionResult};
pub use models::*;
