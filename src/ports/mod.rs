//! Trait seams between the runner and the underlying secure transport.
//!
//! These ports abstract the dial/transport/channel boundary so the drivers
//! can be exercised against scripted doubles without a live SSH server.

mod transport;

pub use transport::{ChannelEvent, CommandChannel, Dialer, Transport};

#[cfg(test)]
pub use transport::mock;
