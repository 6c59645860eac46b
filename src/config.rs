use std::time::Duration;

/// How often the progress callback fires while a dump is streaming.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// How often blocked waits re-check the cancellation token.
pub(crate) const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Maximum attempts for a single HTTP request.
pub(crate) const HTTP_MAX_RETRIES: u32 = 5;

/// Delay between HTTP retry attempts.
pub(crate) const HTTP_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Chunk size handed between the decompression thread and the tokenizer.
pub(crate) const DECOMPRESSION_CHUNK_SIZE: usize = 256 * 1024;
