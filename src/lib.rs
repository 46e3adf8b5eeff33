//! Remote command execution and single-file push over SSH.
//!
//! This crate is a thin client for provisioning automation: it connects to
//! one remote endpoint with public-key authentication, runs scripts through
//! the remote shell with their combined output captured, and streams files
//! into place over the legacy copy protocol — without shelling out to
//! external processes. The transport itself (encryption, channel
//! multiplexing) is provided by [russh](https://docs.rs/russh).
//!
//! The heart of the crate is [`SshRunner`]. Constructing one validates the
//! connection end to end by echoing through the remote shell, so a runner
//! you hold is a runner that works.
//!
//! # Example
//! ```no_run
//! use ssh_runner::SshRunner;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ssh_runner::RunnerError> {
//!     let runner =
//!         SshRunner::connect("/home/ops/.ssh/id_ed25519", "ops", "10.4.10.50:22").await?;
//!
//!     let release = runner.run("uname -r").await?;
//!     println!("kernel: {}", String::from_utf8_lossy(&release));
//!
//!     runner
//!         .put_blob(b"server { listen 8080; }\n", "/tmp/site.conf", 0o644)
//!         .await?;
//!     let roundtrip = runner.cat("/tmp/site.conf").await?;
//!     assert!(roundtrip.starts_with(b"server"));
//!
//!     Ok(())
//! }
//! ```
//!
//! Host keys are not verified (the peer is authenticated by key possession
//! only), connections are never pooled or repaired, and operations carry no
//! timeouts — callers needing deadlines impose them externally.

pub mod config;
pub mod error;
pub mod ports;
pub mod ssh;

pub use config::TargetConfig;
pub use error::{Result, RunnerError};
pub use ssh::{RusshDialer, SshRunner};
