//! Command implementations for agent-monitor

pub mod monitor;

pub use monitor::{monitor, MonitorArgs};
