//! russh adapter
//!
//! Concrete implementation of the transport ports using the russh SSH
//! client: key loading, dialing, public-key authentication, and the
//! channel-message loop.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Handler, Msg};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg};
use tracing::debug;

use crate::config::TargetConfig;
use crate::error::{Result, RunnerError};
use crate::ports::{ChannelEvent, CommandChannel, Dialer, Transport};

/// Accepts any server host key. Host-key trust management is deliberately
/// out of scope for this client; the peer is authenticated only by
/// possession of the private key.
#[derive(Debug, Clone)]
struct AcceptingHandler;

impl Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Dials a target and authenticates with its configured private key.
///
/// Stateless: the key file is read and parsed on every dial, so a failed
/// dial leaves nothing behind and the next one starts from scratch.
#[derive(Debug, Clone, Default)]
pub struct RusshDialer;

impl RusshDialer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialer for RusshDialer {
    type Transport = RusshTransport;

    async fn dial(&self, target: &TargetConfig) -> Result<RusshTransport> {
        let key = load_secret_key(
            &target.keyfile,
            target.passphrase.as_ref().map(|p| p.as_str()),
        )
        .map_err(|e| RunnerError::Credential {
            path: target.keyfile.display().to_string(),
            reason: e.to_string(),
        })?;

        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, target.address.as_str(), AcceptingHandler)
            .await
            .map_err(|e| RunnerError::Connection {
                address: target.address.clone(),
                reason: e.to_string(),
            })?;

        let hash_alg = handle.best_supported_rsa_hash().await.ok().flatten().flatten();
        let auth_result = handle
            .authenticate_publickey(
                &target.username,
                PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
            )
            .await
            .map_err(|e| RunnerError::Connection {
                address: target.address.clone(),
                reason: e.to_string(),
            })?;

        if !auth_result.success() {
            return Err(RunnerError::Connection {
                address: target.address.clone(),
                reason: format!(
                    "public key authentication rejected for user {}",
                    target.username
                ),
            });
        }

        debug!(address = %target.address, user = %target.username, "authenticated");
        Ok(RusshTransport { handle })
    }
}

/// An established, authenticated connection. Shared by every operation on a
/// runner; each operation opens its own channel.
pub struct RusshTransport {
    handle: Handle<AcceptingHandler>,
}

#[async_trait]
impl Transport for RusshTransport {
    type Channel = RusshChannel;

    async fn open_channel(&self) -> Result<RusshChannel> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RunnerError::Channel {
                reason: format!("failed to open channel: {e}"),
            })?;
        Ok(RusshChannel { inner: channel })
    }
}

/// One session channel, driving exactly one remote command.
pub struct RusshChannel {
    inner: Channel<Msg>,
}

#[async_trait]
impl CommandChannel for RusshChannel {
    async fn exec(&mut self, command: &str) -> Result<()> {
        self.inner
            .exec(true, command)
            .await
            .map_err(|e| RunnerError::Channel {
                reason: format!("failed to start command: {e}"),
            })
    }

    async fn send_stdin(&mut self, data: &[u8]) -> Result<()> {
        self.inner.data(data).await.map_err(|e| RunnerError::Channel {
            reason: format!("failed to write stdin: {e}"),
        })
    }

    async fn close_stdin(&mut self) -> Result<()> {
        self.inner.eof().await.map_err(|e| RunnerError::Channel {
            reason: format!("failed to close stdin: {e}"),
        })
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        while let Some(msg) = self.inner.wait().await {
            match msg {
                ChannelMsg::Data { data } => return Some(ChannelEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    return Some(ChannelEvent::Stderr(data.to_vec()));
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ChannelEvent::Exit(exit_status));
                }
                // Eof may arrive before or after ExitStatus, and data can
                // trail either; keep reading until the channel itself closes.
                _ => {}
            }
        }
        None
    }
}
