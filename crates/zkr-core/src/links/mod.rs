//! Channel-link graph: the cached adjacency records and the engine that is
//! their only writer.

mod cache;
mod engine;

pub use cache::ChannelLinkCache;
pub use engine::{ComponentMap, ComponentNode, LinkEngine, LinkMode};
