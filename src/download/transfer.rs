//! The chunked transfer loop.
//!
//! Network reads are re-chunked into blocks of exactly `chunk_size` bytes.
//! Only whole blocks are written while the stream is open; the short tail is
//! written once the body ends cleanly. A cancellation therefore always leaves
//! `file length - start offset` at a multiple of the chunk size.

use std::path::Path;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::DownloadError;
use super::client::ByteStream;
use super::negotiate::{WriteMode, WritePlan};
use super::progress::{ProgressEvent, ProgressSample, ProgressSink};
use crate::cancel::CancellationCoordinator;

/// Result of a transfer attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The body ended cleanly and the file is complete.
    Completed {
        /// Final file length.
        bytes: u64,
        /// Bytes written during this attempt.
        received: u64,
    },
    /// Cancellation was observed; the file holds `offset` bytes.
    Interrupted {
        /// File length when the loop stopped.
        offset: u64,
        /// Bytes written during this attempt.
        received: u64,
    },
}

/// One transfer attempt's inputs.
#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    /// Filename for progress events and logs.
    pub name: &'a str,
    /// Source URL for error context.
    pub url: &'a str,
    /// Target file.
    pub path: &'a Path,
    /// Open mode and expected total.
    pub plan: WritePlan,
    /// Write unit in bytes.
    pub chunk_size: usize,
}

struct Cursor<'a> {
    transfer: &'a Transfer<'a>,
    written: u64,
    start: u64,
}

impl Cursor<'_> {
    async fn write_block(
        &mut self,
        file: &mut File,
        block: &[u8],
        sink: &dyn ProgressSink,
    ) -> Result<(), DownloadError> {
        let path = self.transfer.path;
        let next = self.written + block.len() as u64;
        if let Some(expected) = self.transfer.plan.expected_total
            && next > expected
        {
            return Err(DownloadError::size_overflow(path, expected));
        }
        file.write_all(block)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        self.written = next;
        sink.on_event(&ProgressEvent::Sample(ProgressSample::now(self.written)));
        Ok(())
    }

    fn received(&self) -> u64 {
        self.written - self.start
    }
}

/// Streams `body` into the target file.
///
/// Cancellation is checked after every block and raced against each network
/// read. The file handle is flushed and closed on every exit path.
///
/// # Errors
///
/// - [`DownloadError::Io`] when the file cannot be opened or written
/// - [`DownloadError::SizeOverflow`] when the body exceeds the expected total
/// - [`DownloadError::Truncated`] when the body ends before the expected total
/// - network errors surfaced by the body stream
#[instrument(skip_all, fields(file = %transfer.name, mode = ?transfer.plan.mode))]
pub async fn run_transfer(
    transfer: &Transfer<'_>,
    mut body: ByteStream,
    cancel: &CancellationCoordinator,
    sink: &dyn ProgressSink,
) -> Result<TransferOutcome, DownloadError> {
    let mut file = open_target(transfer.path, transfer.plan.mode).await?;
    let start = transfer.plan.mode.start_offset();
    sink.on_event(&ProgressEvent::Started {
        name: transfer.name.to_string(),
        offset: start,
        total: transfer.plan.expected_total,
    });

    let mut cursor = Cursor {
        transfer,
        written: start,
        start,
    };
    let result = stream_blocks(&mut cursor, &mut file, &mut body, cancel, sink).await;

    let flushed = file
        .flush()
        .await
        .map_err(|e| DownloadError::io(transfer.path, e));
    drop(file);

    let outcome = result?;
    flushed?;
    debug!(?outcome, "transfer loop finished");
    Ok(outcome)
}

async fn stream_blocks(
    cursor: &mut Cursor<'_>,
    file: &mut File,
    body: &mut ByteStream,
    cancel: &CancellationCoordinator,
    sink: &dyn ProgressSink,
) -> Result<TransferOutcome, DownloadError> {
    let chunk_size = cursor.transfer.chunk_size.max(1);
    let mut pending = BytesMut::with_capacity(chunk_size);

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            item = body.next() => Some(item),
        };

        match next {
            None => {
                debug!(dropped = pending.len(), "cancelled while waiting for data");
                return Ok(interrupted(cursor));
            }
            Some(Some(Ok(bytes))) => {
                pending.extend_from_slice(&bytes);
                while pending.len() >= chunk_size {
                    let block = pending.split_to(chunk_size);
                    cursor.write_block(file, &block, sink).await?;
                    if cancel.is_cancelled() {
                        return Ok(interrupted(cursor));
                    }
                }
            }
            Some(Some(Err(e))) => return Err(e),
            Some(None) => {
                if !pending.is_empty() {
                    let tail = pending.split();
                    cursor.write_block(file, &tail, sink).await?;
                }
                return finish(cursor);
            }
        }
    }
}

fn interrupted(cursor: &Cursor<'_>) -> TransferOutcome {
    TransferOutcome::Interrupted {
        offset: cursor.written,
        received: cursor.received(),
    }
}

fn finish(cursor: &Cursor<'_>) -> Result<TransferOutcome, DownloadError> {
    if let Some(expected) = cursor.transfer.plan.expected_total
        && cursor.written < expected
    {
        return Err(DownloadError::truncated(
            cursor.transfer.url,
            expected,
            cursor.written,
        ));
    }
    Ok(TransferOutcome::Completed {
        bytes: cursor.written,
        received: cursor.received(),
    })
}

async fn open_target(path: &Path, mode: WriteMode) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    let mut options = OpenOptions::new();
    match mode {
        WriteMode::Append { .. } => options.create(true).append(true),
        WriteMode::Truncate => options.create(true).write(true).truncate(true),
    };
    let file = options
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    if let WriteMode::Append { offset } = mode {
        let len = file
            .metadata()
            .await
            .map_err(|e| DownloadError::io(path, e))?
            .len();
        if len != offset {
            // The partial changed under us; append would corrupt it.
            return Err(DownloadError::io(
                path,
                std::io::Error::other(format!(
                    "partial file is {len} bytes, expected {offset}"
                )),
            ));
        }
    }
    Ok(file)
}
