//! Agent Monitor Client Library
//!
//! Streams an agent's log output at a selectable verbosity and keeps the
//! accumulated text available to any number of readers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_monitor_client::{HttpFetch, MonitorConfig, MonitorSession};
//! use agent_monitor_core::{LogLevel, StreamMode, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetch = Arc::new(HttpFetch::with_bearer_token("http://localhost:4646", "secret")?);
//!     let mut session = MonitorSession::new(fetch, MonitorConfig::default());
//!
//!     session.configure(Target::server("server-1")?, LogLevel::Info, StreamMode::Streaming)?;
//!     session.attach()?;
//!
//!     // Later: restart at a new level, keeping what was already received
//!     let controller = session.change_level(LogLevel::Debug)?;
//!     println!("{}", controller.current_buffer());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a scripted transport and a local HTTP server:
//!
//! ```rust,ignore
//! use agent_monitor_client::testing::{ScriptedFetch, Step};
//!
//! let fetch = Arc::new(ScriptedFetch::new());
//! fetch.respond(vec![Step::text("a"), Step::text("b"), Step::Hold]);
//! ```

mod config;
mod error;
mod fetch;
mod session;
pub mod streaming;
pub mod testing;

pub use config::{ControllerOptions, MonitorConfig, RetryPolicy, DEFAULT_ENDPOINT};
pub use error::{MonitorError, Result};
pub use fetch::{AuthorizedFetch, ChunkStream, HttpFetch};
pub use session::{MonitorSession, SessionEvent};

// Re-export streaming types for convenience
pub use streaming::{BufferUpdate, ControllerStatus, LogBuffer, LogStreamController};

// Re-export core types for convenience
pub use agent_monitor_core::{LogLevel, MonitorParams, PageRequest, StreamMode, Target};
