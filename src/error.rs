use thiserror::Error;

/// Errors surfaced by the runner.
///
/// Nothing is retried internally; every failure is returned to the immediate
/// caller, which also decides how (and whether) to present it.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The private key file could not be read or parsed. Key material
    /// problems are configuration errors, not transient ones, so this is
    /// never retried within an operation.
    #[error("cannot load key file {path}: {reason}")]
    Credential { path: String, reason: String },

    /// Dialing or authenticating against the target failed. A failed dial is
    /// not cached: the next operation dials again from scratch.
    #[error("connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// Opening or driving a session channel on an established connection
    /// failed, or the channel closed without reporting an exit status.
    #[error("channel error: {reason}")]
    Channel { reason: String },

    /// The remote command exited non-zero. Carries whatever combined output
    /// was captured before the exit, so callers can inspect the remote
    /// error text (e.g. to distinguish a missing file from a real failure).
    #[error("remote command exited with status {status}")]
    RemoteExit { status: u32, output: Vec<u8> },

    /// The construction-time shell check echoed something unexpected.
    #[error("shell check failed: got {actual:?}, expected {expected:?}")]
    ShellCheck { expected: String, actual: String },

    /// A push promised more payload bytes than its source produced.
    #[error("push payload ended early: header promised {expected} bytes, source produced {actual}")]
    ShortPayload { expected: u64, actual: u64 },

    /// Local filesystem error while reading a file to push.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
