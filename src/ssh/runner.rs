//! The client facade: connection lifecycle plus the operation surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::error::{Result, RunnerError};
use crate::ports::{Dialer, Transport};
use crate::ssh::transport::RusshDialer;
use crate::ssh::{exec, scp};

/// Script sent through the command driver at construction time.
const SHELL_CHECK: &str = "echo shell ok";

/// Exact combined output the shell check must produce.
const SHELL_CHECK_EXPECTED: &[u8] = b"shell ok\n";

type ChannelOf<D> = <<D as Dialer>::Transport as Transport>::Channel;

/// Remote-execution client for a single SSH endpoint.
///
/// Construction validates the connection by running `echo shell ok` through
/// the remote shell and checking the echoed output, so a successfully
/// constructed runner is known to reach a working shell. The underlying
/// connection is established lazily, cached for the life of the runner, and
/// never proactively repaired or torn down: if it dies, operations surface
/// whatever error the transport reports, and the next dial-triggering
/// failure is the caller's to handle.
///
/// Every operation opens its own short-lived channel on the shared
/// connection, so sequential and concurrent operations alike reuse a single
/// dial. Operations are uncancellable and carry no timeouts; callers that
/// need deadlines must impose them externally.
pub struct SshRunner<D: Dialer = RusshDialer> {
    target: TargetConfig,
    dialer: D,
    transport: Mutex<Option<Arc<D::Transport>>>,
}

impl SshRunner {
    /// Connect to `address` (`host:port`) as `username`, authenticating with
    /// the private key at `keyfile`, and run the construction shell check.
    ///
    /// # Errors
    ///
    /// Anything that keeps the check from echoing `shell ok\n` — an
    /// unreadable key, a failed dial, a rejected authentication, or
    /// unexpected output — fails construction; no runner is returned.
    pub async fn connect(
        keyfile: impl Into<PathBuf>,
        username: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<Self> {
        Self::with_dialer(
            RusshDialer::new(),
            TargetConfig::new(address, username, keyfile),
        )
        .await
    }
}

impl<D: Dialer> SshRunner<D> {
    /// Construct against an explicit dialer, running the shell check.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::ShellCheck`] when the remote shell echoes
    /// anything but `shell ok\n`, or the underlying error when the dial,
    /// authentication, or execution itself fails.
    pub async fn with_dialer(dialer: D, target: TargetConfig) -> Result<Self> {
        let runner = Self {
            target,
            dialer,
            transport: Mutex::new(None),
        };
        let output = runner.run(SHELL_CHECK).await?;
        if output != SHELL_CHECK_EXPECTED {
            return Err(RunnerError::ShellCheck {
                expected: String::from_utf8_lossy(SHELL_CHECK_EXPECTED).into_owned(),
                actual: String::from_utf8_lossy(&output).into_owned(),
            });
        }
        debug!(address = %runner.target.address, "shell check passed");
        Ok(runner)
    }

    /// Run `script` as if typed into a bash shell on the remote host and
    /// return the combined stdout/stderr bytes.
    ///
    /// # Errors
    ///
    /// A non-zero remote exit yields [`RunnerError::RemoteExit`] carrying
    /// the output captured so far.
    pub async fn run(&self, script: &str) -> Result<Vec<u8>> {
        let channel = self.channel().await?;
        exec::run_script(channel, exec::BASH, script.as_bytes()).await
    }

    /// Run `script` in a root shell via sudo and return the combined output.
    ///
    /// Requires passwordless sudo on the remote side; hosts without sudo
    /// (containers, already-root sessions) should use [`run`] instead.
    ///
    /// [`run`]: SshRunner::run
    pub async fn run_elevated(&self, script: &str) -> Result<Vec<u8>> {
        let channel = self.channel().await?;
        exec::run_script(channel, exec::SUDO_BASH, script.as_bytes()).await
    }

    /// Return the entire contents of a remote file.
    ///
    /// A missing file is not a distinct error kind: it surfaces as the
    /// [`RunnerError::RemoteExit`] produced by `cat`, and callers infer
    /// absence from its output.
    pub async fn cat(&self, remote_path: &str) -> Result<Vec<u8>> {
        let channel = self.channel().await?;
        exec::run_command(channel, &format!("/bin/cat {remote_path}")).await
    }

    /// Copy a local file to `remote_path` and set its mode. The file is
    /// opened and measured here, so its size must not change mid-push.
    pub async fn put_file(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        mode: u32,
    ) -> Result<()> {
        let file = File::open(local_path.as_ref()).await?;
        let size = file.metadata().await?.len();
        self.put_stream(file, size, remote_path, mode).await
    }

    /// Write a byte slice to a file on the remote machine with `mode`.
    pub async fn put_blob(&self, blob: &[u8], remote_path: &str, mode: u32) -> Result<()> {
        let size = blob.len() as u64;
        self.put_stream(std::io::Cursor::new(blob.to_vec()), size, remote_path, mode)
            .await
    }

    /// Stream `size` bytes from a reader to a remote file with `mode`.
    ///
    /// `size` must match what the source will actually produce: a source
    /// that ends early fails with [`RunnerError::ShortPayload`], and bytes
    /// beyond `size` are never read.
    pub async fn put_stream<R>(
        &self,
        source: R,
        size: u64,
        remote_path: &str,
        mode: u32,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let channel = self.channel().await?;
        scp::push_stream(channel, source, size, remote_path, mode).await
    }

    /// Get-or-dial the cached connection, then open a fresh channel for one
    /// operation. The lock is held across the dial so concurrent first uses
    /// collapse to a single connection; dial failures are not cached.
    async fn channel(&self) -> Result<ChannelOf<D>> {
        let transport = {
            let mut cached = self.transport.lock().await;
            match cached.as_ref() {
                Some(transport) => Arc::clone(transport),
                None => {
                    let transport = Arc::new(self.dialer.dial(&self.target).await?);
                    info!(address = %self.target.address, user = %self.target.username, "connected");
                    *cached = Some(Arc::clone(&transport));
                    transport
                }
            }
        };
        transport.open_channel().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::{MockDialer, MockTransport};
    use crate::ports::ChannelEvent;

    fn shell_ok() -> Vec<ChannelEvent> {
        vec![
            ChannelEvent::Stdout(b"shell ok\n".to_vec()),
            ChannelEvent::Exit(0),
        ]
    }

    fn target() -> TargetConfig {
        TargetConfig::new("127.0.0.1:22", "ops", "/tmp/test_key")
    }

    /// Construct a runner whose shell check has already been scripted.
    async fn checked_runner(transport: &MockTransport) -> SshRunner<MockDialer> {
        transport.respond(exec::BASH, shell_ok());
        SshRunner::with_dialer(MockDialer::new(transport.clone()), target())
            .await
            .expect("shell check should pass")
    }

    /// A runner that skips the construction check, for exercising the lazy
    /// dial directly.
    fn bare_runner(transport: &MockTransport) -> SshRunner<MockDialer> {
        SshRunner {
            target: target(),
            dialer: MockDialer::new(transport.clone()),
            transport: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_construction_sends_the_shell_check() {
        let transport = MockTransport::new();
        let _runner = checked_runner(&transport).await;

        let ops = transport.recorded_ops();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].command, "/bin/bash -s");
        assert_eq!(ops[0].stdin, b"echo shell ok");
    }

    #[tokio::test]
    async fn test_construction_fails_on_unexpected_output() {
        let transport = MockTransport::new();
        transport.respond(
            exec::BASH,
            vec![
                ChannelEvent::Stdout(b"Welcome to web01!\nshell ok\n".to_vec()),
                ChannelEvent::Exit(0),
            ],
        );

        let err = SshRunner::with_dialer(MockDialer::new(transport.clone()), target())
            .await
            .err()
            .expect("construction should fail");
        match err {
            RunnerError::ShellCheck { expected, actual } => {
                assert_eq!(expected, "shell ok\n");
                assert!(actual.starts_with("Welcome"));
            }
            other => panic!("expected ShellCheck, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_construction_fails_on_dial_error() {
        let transport = MockTransport::new();
        let dialer = MockDialer::new(transport.clone());
        dialer.fail_next(RunnerError::Connection {
            address: "127.0.0.1:22".to_string(),
            reason: "connection refused".to_string(),
        });

        let err = SshRunner::with_dialer(dialer, target())
            .await
            .err()
            .expect("construction should fail");
        assert!(matches!(err, RunnerError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_run_returns_the_exact_remote_bytes() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        transport.respond(
            exec::BASH,
            vec![
                ChannelEvent::Stdout(b"hello\n".to_vec()),
                ChannelEvent::Exit(0),
            ],
        );
        let output = runner.run("echo hello").await.unwrap();
        assert_eq!(output, b"hello\n");

        let ops = transport.recorded_ops();
        assert_eq!(ops[1].stdin, b"echo hello");
    }

    #[tokio::test]
    async fn test_run_elevated_uses_the_sudo_prefix() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        transport.respond(
            exec::SUDO_BASH,
            vec![
                ChannelEvent::Stdout(b"root\n".to_vec()),
                ChannelEvent::Exit(0),
            ],
        );
        let output = runner.run_elevated("whoami").await.unwrap();
        assert_eq!(output, b"root\n");

        let commands = transport.commands();
        assert_eq!(commands, vec!["/bin/bash -s", "sudo /bin/bash -s"]);
    }

    #[tokio::test]
    async fn test_operations_share_a_single_dial() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        runner.run("true").await.unwrap();
        runner.run("true").await.unwrap();
        runner.cat("/etc/hostname").await.unwrap();

        assert_eq!(runner.dialer.dial_count(), 1);
        assert_eq!(transport.recorded_ops().len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_dials_once() {
        let transport = MockTransport::new();
        let runner = bare_runner(&transport);

        let (a, b) = tokio::join!(runner.run("true"), runner.run("true"));
        a.unwrap();
        b.unwrap();
        assert_eq!(runner.dialer.dial_count(), 1);
    }

    #[tokio::test]
    async fn test_dial_failure_is_not_cached() {
        let transport = MockTransport::new();
        let runner = bare_runner(&transport);
        runner.dialer.fail_next(RunnerError::Connection {
            address: "127.0.0.1:22".to_string(),
            reason: "network is unreachable".to_string(),
        });

        let err = runner.run("true").await.unwrap_err();
        assert!(matches!(err, RunnerError::Connection { .. }));

        runner.run("true").await.unwrap();
        assert_eq!(runner.dialer.dial_count(), 2);
    }

    #[tokio::test]
    async fn test_cat_reads_a_remote_file() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        transport.respond(
            "/bin/cat /etc/hostname",
            vec![
                ChannelEvent::Stdout(b"web01\n".to_vec()),
                ChannelEvent::Exit(0),
            ],
        );
        let contents = runner.cat("/etc/hostname").await.unwrap();
        assert_eq!(contents, b"web01\n");
    }

    #[tokio::test]
    async fn test_cat_surfaces_absence_through_the_exit_error() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        transport.respond(
            "/bin/cat /nope",
            vec![
                ChannelEvent::Stderr(b"/bin/cat: /nope: No such file or directory\n".to_vec()),
                ChannelEvent::Exit(1),
            ],
        );
        let err = runner.cat("/nope").await.unwrap_err();
        match err {
            RunnerError::RemoteExit { status, output } => {
                assert_eq!(status, 1);
                assert!(String::from_utf8_lossy(&output).contains("No such file"));
            }
            other => panic!("expected RemoteExit, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_put_blob_frames_the_payload() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        runner.put_blob(b"hello world", "/tmp/blob", 0o644).await.unwrap();

        let ops = transport.recorded_ops();
        assert_eq!(ops[1].command, "scp -t /tmp/blob");
        let mut expected = b"C0644 11 blob\n".to_vec();
        expected.extend_from_slice(b"hello world");
        expected.push(0);
        assert_eq!(ops[1].stdin, expected);
    }

    #[tokio::test]
    async fn test_put_stream_rejects_short_sources() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        let err = runner
            .put_stream(std::io::Cursor::new(b"abc".to_vec()), 10, "/tmp/blob", 0o644)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::ShortPayload {
                expected: 10,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_put_file_measures_the_local_file() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.sh");
        std::fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();

        runner
            .put_file(&path, "/usr/local/bin/deploy.sh", 0o755)
            .await
            .unwrap();

        let ops = transport.recorded_ops();
        assert_eq!(ops[1].command, "scp -t /usr/local/bin/deploy.sh");
        assert!(ops[1].stdin.starts_with(b"C0755 17 blob\n"));
        assert_eq!(ops[1].stdin.last(), Some(&0));
    }

    #[tokio::test]
    async fn test_put_file_missing_local_file_is_an_io_error() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        let err = runner
            .put_file("/definitely/not/here", "/tmp/blob", 0o644)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Io(_)));
    }

    #[tokio::test]
    async fn test_stdin_write_failure_does_not_preempt_output() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        transport.fail_stdin_writes();
        transport.respond(
            exec::BASH,
            vec![
                ChannelEvent::Stdout(b"late\n".to_vec()),
                ChannelEvent::Exit(0),
            ],
        );
        let output = runner.run("echo late").await.unwrap();
        assert_eq!(output, b"late\n");
    }

    #[tokio::test]
    async fn test_push_stdin_failure_is_fatal() {
        let transport = MockTransport::new();
        let runner = checked_runner(&transport).await;

        transport.fail_stdin_writes();
        let err = runner.put_blob(b"abc", "/tmp/blob", 0o644).await.unwrap_err();
        assert!(matches!(err, RunnerError::Channel { .. }));
    }
}
