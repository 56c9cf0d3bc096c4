//! Shared data models for agent log monitoring

mod level;
mod page;
mod params;
mod target;

pub use level::*;
pub use page::*;
pub use params::*;
pub use target::*;
