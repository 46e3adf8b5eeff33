//! Target endpoint configuration.

use std::path::PathBuf;

use serde::Deserialize;
use zeroize::Zeroizing;

/// Where and how to connect: one remote endpoint, one user, one key.
///
/// The key file is re-read on every dial attempt, so a runner built before a
/// key rotation picks up the new key if it ever has to dial again.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// `host:port` address of the remote endpoint.
    pub address: String,

    /// Remote user to authenticate as.
    pub username: String,

    /// Path to the private key used for public-key authentication.
    pub keyfile: PathBuf,

    /// Optional passphrase protecting the key.
    #[serde(default)]
    pub passphrase: Option<Zeroizing<String>>,
}

impl TargetConfig {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        keyfile: impl Into<PathBuf>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            keyfile: keyfile.into(),
            passphrase: None,
        }
    }

    /// Attach a passphrase for the key file.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }
}
