//! Single-file push over the legacy copy protocol.
//!
//! The remote side runs `scp -t <path>` (sink mode); this side streams one
//! header line, exactly the promised number of payload bytes, and a single
//! NUL end-of-content byte, in that order.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, RunnerError};
use crate::ports::CommandChannel;
use crate::ssh::exec;

/// Filename placeholder sent in the header. Sinks started with an explicit
/// destination path never consult it.
const HEADER_NAME: &str = "blob";

/// End-of-content marker written after the payload.
const END_OF_CONTENT: [u8; 1] = [0];

/// Chunk size for streaming the source onto the wire.
const CHUNK_SIZE: usize = 32 * 1024;

/// Depth of the handoff queue between the source reader and the wire writer.
const HANDOFF_DEPTH: usize = 4;

/// Sink invocation for a given destination path.
pub(crate) fn sink_command(remote_path: &str) -> String {
    format!("scp -t {remote_path}")
}

/// Header line: `C`, the permission bits in octal with a leading zero, the
/// exact payload size in decimal, and the placeholder name, newline-ended.
pub(crate) fn file_header(mode: u32, size: u64) -> String {
    format!("C0{mode:o} {size} {HEADER_NAME}\n")
}

/// Stream `size` bytes from `source` into `remote_path` with `mode`.
///
/// The caller's `size` is a promise: at most `size` bytes are read from the
/// source, and a source that ends early yields
/// [`RunnerError::ShortPayload`] rather than a hang. Bytes beyond `size`
/// are never read.
pub(crate) async fn push_stream<C, R>(
    mut channel: C,
    source: R,
    size: u64,
    remote_path: &str,
    mode: u32,
) -> Result<()>
where
    C: CommandChannel,
    R: AsyncRead + Send + Unpin + 'static,
{
    channel.exec(&sink_command(remote_path)).await?;
    channel.send_stdin(file_header(mode, size).as_bytes()).await?;

    // One task reads the source while this one owns the wire, so a slow
    // source overlaps with transmission without reordering the frames.
    let (chunks_tx, mut chunks_rx) = mpsc::channel::<io::Result<Vec<u8>>>(HANDOFF_DEPTH);
    let producer = tokio::spawn(read_chunks(source, size, chunks_tx));

    let mut sent = 0u64;
    while let Some(chunk) = chunks_rx.recv().await {
        let chunk = chunk?;
        channel.send_stdin(&chunk).await?;
        sent += chunk.len() as u64;
    }
    let _ = producer.await;

    if sent != size {
        debug!(expected = size, actual = sent, "source ended before the declared size");
        return Err(RunnerError::ShortPayload {
            expected: size,
            actual: sent,
        });
    }

    channel.send_stdin(&END_OF_CONTENT).await?;
    channel.close_stdin().await?;

    exec::finish(channel).await.map(|_| ())
}

/// Read at most `size` bytes from `source`, handing chunks to the writer.
/// Stops early on EOF or when the writer has gone away.
async fn read_chunks<R: AsyncRead + Unpin>(
    mut source: R,
    size: u64,
    chunks: mpsc::Sender<io::Result<Vec<u8>>>,
) {
    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; want];
        match source.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                buf.truncate(n);
                remaining -= n as u64;
                if chunks.send(Ok(buf)).await.is_err() {
                    return;
                }
            }
            Err(error) => {
                let _ = chunks.send(Err(error)).await;
                return;
            }
        }
    }
}
