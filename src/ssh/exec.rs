//! Remote shell command driver.
//!
//! Feeds a script to a fixed remote interpreter over the channel's standard
//! input and collects the combined standard output/standard error stream
//! until the remote command terminates.

use tracing::debug;

use crate::error::{Result, RunnerError};
use crate::ports::{ChannelEvent, CommandChannel};

/// Remote interpreter for ordinary execution.
pub(crate) const BASH: &str = "/bin/bash -s";

/// Remote interpreter for elevated execution. Assumes passwordless sudo.
pub(crate) const SUDO_BASH: &str = "sudo /bin/bash -s";

/// Run `script` through `interpreter`, feeding it over stdin, and collect
/// the combined output. The channel is consumed: one channel, one command.
pub(crate) async fn run_script<C: CommandChannel>(
    mut channel: C,
    interpreter: &str,
    script: &[u8],
) -> Result<Vec<u8>> {
    channel.exec(interpreter).await?;

    // The remote side decides the outcome: a failed stdin write (e.g. the
    // command exited without draining its input) must not preempt whatever
    // output and exit status the channel still delivers.
    if let Err(error) = feed_stdin(&mut channel, script).await {
        debug!(error = %error, "stdin write failed; collecting output anyway");
    }

    finish(channel).await
}

/// Run a self-contained remote command that reads nothing from stdin.
pub(crate) async fn run_command<C: CommandChannel>(
    mut channel: C,
    command: &str,
) -> Result<Vec<u8>> {
    channel.exec(command).await?;
    finish(channel).await
}

async fn feed_stdin<C: CommandChannel>(channel: &mut C, script: &[u8]) -> Result<()> {
    channel.send_stdin(script).await?;
    channel.close_stdin().await
}

/// Drain the channel and map the exit status: 0 yields the combined output,
/// non-zero wraps it in [`RunnerError::RemoteExit`], and a channel that
/// closes without reporting any status is a channel error.
pub(crate) async fn finish<C: CommandChannel>(mut channel: C) -> Result<Vec<u8>> {
    let (output, exit_status) = collect_output(&mut channel).await;
    match exit_status {
        Some(0) => Ok(output),
        Some(status) => Err(RunnerError::RemoteExit { status, output }),
        None => Err(RunnerError::Channel {
            reason: "channel closed before reporting an exit status".to_string(),
        }),
    }
}

/// Merge stdout and stderr in arrival order until the channel closes.
async fn collect_output<C: CommandChannel>(channel: &mut C) -> (Vec<u8>, Option<u32>) {
    let mut output = Vec::new();
    let mut exit_status = None;
    while let Some(event) = channel.next_event().await {
        match event {
            ChannelEvent::Stdout(data) | ChannelEvent::Stderr(data) => {
                output.extend_from_slice(&data);
            }
            // The exit status can precede the final data frames; keep
            // draining until the channel closes.
            ChannelEvent::Exit(status) => exit_status = Some(status),
        }
    }
    (output, exit_status)
}
