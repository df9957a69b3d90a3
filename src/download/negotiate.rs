//! Range negotiation: where to start writing, and how to read the answer.
//!
//! The on-disk length of the partial file is the only resumption checkpoint.
//! [`negotiate_start`] turns it into a [`ResumePlan`]; once the server has
//! answered, [`interpret_response`] checks that the answer really continues
//! at the requested offset and decides between appending and rewriting.

use std::path::Path;

use tracing::{debug, info, warn};

use super::DownloadError;
use super::client::{FetchResponse, RangeFetch};
use super::state::{LocalFile, RemoteFile};

/// Where the next attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePlan {
    /// Local length already reaches the known size; nothing to transfer.
    AlreadyComplete {
        /// Bytes on disk.
        size: u64,
    },
    /// No local bytes; download from 0.
    Fresh,
    /// Ask for the bytes after `offset`.
    Resume {
        /// Current local length.
        offset: u64,
    },
    /// Local bytes exist but the remote size is unknown, so they cannot be
    /// trusted; download from 0 and overwrite.
    Restart {
        /// Bytes that will be discarded.
        discarded: u64,
    },
}

impl ResumePlan {
    /// Byte offset requested from the server.
    #[must_use]
    pub fn start_offset(&self) -> u64 {
        match self {
            Self::Resume { offset } => *offset,
            Self::AlreadyComplete { .. } | Self::Fresh | Self::Restart { .. } => 0,
        }
    }
}

/// Outcome of [`negotiate_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeDecision {
    /// What to do.
    pub plan: ResumePlan,
    /// Expected total size, from the listing or a size probe.
    pub expected_size: Option<u64>,
}

/// How the transfer loop opens the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep the first `offset` bytes and append after them.
    Append {
        /// Bytes already on disk.
        offset: u64,
    },
    /// Truncate and write from byte 0.
    Truncate,
}

impl WriteMode {
    /// Bytes on disk before the first write.
    #[must_use]
    pub fn start_offset(&self) -> u64 {
        match self {
            Self::Append { offset } => *offset,
            Self::Truncate => 0,
        }
    }
}

/// Validated reading of a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    /// How to open the target.
    pub mode: WriteMode,
    /// Total file size once complete, when known.
    pub expected_total: Option<u64>,
}

/// Pure resume decision from the local length and the expected size.
#[must_use]
pub fn plan_resume(local_len: u64, expected_size: Option<u64>) -> ResumePlan {
    match (local_len, expected_size) {
        (0, _) => ResumePlan::Fresh,
        (len, Some(size)) if len >= size => ResumePlan::AlreadyComplete { size: len },
        (len, Some(_)) => ResumePlan::Resume { offset: len },
        (len, None) => ResumePlan::Restart { discarded: len },
    }
}

/// Decides the starting offset for `remote`, probing the server for its size
/// when the listing did not advertise one and a partial file exists.
pub async fn negotiate_start(
    fetch: &dyn RangeFetch,
    remote: &RemoteFile,
    local: &LocalFile,
) -> ResumeDecision {
    let mut expected_size = remote.size;
    if expected_size.is_none() && local.exists() {
        expected_size = fetch.probe_size(&remote.url).await;
        debug!(file = %remote.name, ?expected_size, "probed remote size");
    }

    let plan = plan_resume(local.bytes_written, expected_size);
    match plan {
        ResumePlan::Resume { offset } => {
            info!(file = %remote.name, offset, "resuming partial download");
        }
        ResumePlan::Restart { discarded } => {
            warn!(
                file = %remote.name,
                discarded,
                "remote size unknown; re-downloading from the beginning"
            );
        }
        ResumePlan::AlreadyComplete { .. } | ResumePlan::Fresh => {}
    }

    ResumeDecision {
        plan,
        expected_size,
    }
}

/// Checks the server's answer to a request made at `requested_offset`.
///
/// # Errors
///
/// Returns [`DownloadError::MalformedRange`] when a `206` does not start at
/// the requested offset. The caller must discard the partial file before
/// retrying.
pub fn interpret_response(
    url: &str,
    requested_offset: u64,
    response: &FetchResponse,
    advertised_size: Option<u64>,
) -> Result<WritePlan, DownloadError> {
    let after_fallback = requested_offset == 0;

    if response.is_partial() {
        let Some(range) = response.content_range else {
            return Err(DownloadError::malformed_range(
                url,
                "206 response without a usable Content-Range",
                after_fallback,
            ));
        };
        if range.start != requested_offset {
            return Err(DownloadError::malformed_range(
                url,
                format!(
                    "range starts at {} instead of {requested_offset}",
                    range.start
                ),
                after_fallback,
            ));
        }
        let expected_total = range
            .total
            .or_else(|| response.content_length.map(|len| len + requested_offset))
            .or(advertised_size);
        let mode = if requested_offset == 0 {
            WriteMode::Truncate
        } else {
            WriteMode::Append {
                offset: requested_offset,
            }
        };
        return Ok(WritePlan {
            mode,
            expected_total,
        });
    }

    if requested_offset > 0 {
        info!(url, requested_offset, "server ignored range request; rewriting from 0");
    }
    Ok(WritePlan {
        mode: WriteMode::Truncate,
        expected_total: response.content_length.or(advertised_size),
    })
}

/// Empties a partial file that can no longer be trusted.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the file exists but cannot be truncated.
pub async fn discard_partial(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::OpenOptions::new().write(true).open(path).await {
        Ok(file) => file
            .set_len(0)
            .await
            .map_err(|e| DownloadError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}
