/// Default capacity of the engine's event broadcast channel
pub const DEFAULT_EVENT_BUFFER: usize = 256;
/// Minimum event channel capacity (tokio rejects zero)
pub const MIN_EVENT_BUFFER: usize = 1;
/// Concurrency used when available parallelism cannot be detected
pub const FALLBACK_CONCURRENCY: usize = 4;
/// Upper bound on configured retry attempts for a failing step
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Upper bound on the fixed backoff between retry attempts (one minute)
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;
