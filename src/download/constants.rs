//! Constants for the download module (timeouts, chunking, retry budget).

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (30 seconds without receiving data).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Default chunk size for disk writes (8 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default maximum attempts per file, including the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts (5 seconds).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
