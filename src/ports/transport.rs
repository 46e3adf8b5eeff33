//! Transport Ports
//!
//! Trait definitions for establishing connections and driving exec channels,
//! abstracting away the underlying SSH implementation for testability.

use async_trait::async_trait;

use crate::config::TargetConfig;
use crate::error::Result;

/// One message from the remote side of an exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes the remote process wrote to its standard output.
    Stdout(Vec<u8>),
    /// Bytes the remote process wrote to its standard error.
    Stderr(Vec<u8>),
    /// Exit status reported by the remote command.
    Exit(u32),
}

/// A single-use session channel carrying one remote command.
///
/// Callers must request exactly one command per channel, may feed its
/// standard input, and then drain events until [`next_event`] returns `None`.
///
/// [`next_event`]: CommandChannel::next_event
#[async_trait]
pub trait CommandChannel: Send {
    /// Ask the remote side to start `command` on this channel.
    async fn exec(&mut self, command: &str) -> Result<()>;

    /// Write bytes to the remote command's standard input.
    async fn send_stdin(&mut self, data: &[u8]) -> Result<()>;

    /// Signal end of input to the remote command.
    async fn close_stdin(&mut self) -> Result<()>;

    /// Receive the next event; `None` once the channel has closed.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}

/// An established, authenticated connection that can open session channels.
#[async_trait]
pub trait Transport: Send + Sync {
    type Channel: CommandChannel;

    /// Open a fresh channel for a single operation.
    async fn open_channel(&self) -> Result<Self::Channel>;
}

/// Establishes authenticated transports to a target.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Transport: Transport;

    /// Resolve the credential and dial the target.
    async fn dial(&self, target: &TargetConfig) -> Result<Self::Transport>;
}
