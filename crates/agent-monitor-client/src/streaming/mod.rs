//! Log streaming: buffer, chunk codecs and the stream controller
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use agent_monitor_client::{ControllerOptions, HttpFetch, LogStreamController};
//! use agent_monitor_core::{LogLevel, MonitorParams, Target};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetch = Arc::new(HttpFetch::new("http://localhost:4646")?);
//! let params = MonitorParams::new(Target::server("server-1")?, LogLevel::Debug);
//!
//! let controller = LogStreamController::start(
//!     fetch,
//!     "/v1/agent/monitor",
//!     params,
//!     String::new(),
//!     ControllerOptions::default(),
//! );
//!
//! let mut updates = controller.buffer().subscribe();
//! while let Ok(update) = updates.recv().await {
//!     println!("{:?}", update);
//! }
//!
//! // Explicit stop (also happens on drop)
//! controller.stop();
//! # Ok(())
//! # }
//! ```

mod buffer;
mod codec;
mod controller;

pub use buffer::{BufferUpdate, LogBuffer};
pub use codec::ChunkDecoder;
pub use controller::{ControllerStatus, LogStreamController};
