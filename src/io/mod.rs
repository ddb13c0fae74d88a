//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `transport` - WebSocket transport and the JSON envelope wire codec
//! - `stream` - Live stream client (heartbeat, backoff reconnection)
//! - `feed_channel` - Typed channel from feed sources to the store

pub mod feed_channel;
pub mod stream;
pub mod transport;

// Re-export commonly used types
pub use feed_channel::{FeedEvent, FeedSink, FeedSource};
pub use stream::StreamClient;
pub use transport::{Transport, WsTransport};
