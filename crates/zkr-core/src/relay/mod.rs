//! Relaying authored messages into linked channels.

pub mod content;
mod pipeline;
mod port;
pub mod reply;
mod throttled;
mod types;

pub use pipeline::RelayPipeline;
pub use port::RelayPort;
pub use throttled::{ThrottleConfig, ThrottledRelay};
pub use types::*;
