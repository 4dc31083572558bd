//! Connection configuration.

use std::time::Duration;

use tokio::time::Instant;

use crate::writer::WriterConfig;

/// Default deadline for outbound calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default consecutive invalid frames tolerated before closing.
pub const DEFAULT_MAX_CONSECUTIVE_INVALID_FRAMES: usize = 10;

/// Default maximum concurrent handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Default maximum outbound calls awaiting a response.
pub const DEFAULT_MAX_PENDING_CALLS: usize = 1024;

/// Stand-in deadline for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Deadline used by [`Connection::call`](crate::Connection::call).
    pub call_timeout: Duration,

    /// Malformed frames and orphan responses tolerated in a row.
    /// Exceeding it closes the connection; 0 disables the check.
    pub max_consecutive_invalid_frames: usize,

    /// Incoming Calls handled at once. Calls beyond this are rejected.
    pub max_concurrent_handlers: usize,

    /// Outbound calls awaiting a response at once; 0 means unbounded.
    pub max_pending_calls: usize,

    /// Outbound writer settings.
    pub writer: WriterConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_consecutive_invalid_frames: DEFAULT_MAX_CONSECUTIVE_INVALID_FRAMES,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            max_pending_calls: DEFAULT_MAX_PENDING_CALLS,
            writer: WriterConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create config from environment variables.
    ///
    /// | Variable                       | Field                            |
    /// |--------------------------------|----------------------------------|
    /// | `OCPP_CALL_TIMEOUT_MS`         | `call_timeout` (milliseconds)    |
    /// | `OCPP_MAX_INVALID_FRAMES`      | `max_consecutive_invalid_frames` |
    /// | `OCPP_MAX_CONCURRENT_HANDLERS` | `max_concurrent_handlers`        |
    /// | `OCPP_MAX_PENDING_CALLS`       | `max_pending_calls`              |
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let parse = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparsable setting");
                    None
                }
            }
        };

        if let Some(ms) = parse("OCPP_CALL_TIMEOUT_MS") {
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse("OCPP_MAX_INVALID_FRAMES") {
            config.max_consecutive_invalid_frames = n as usize;
        }
        if let Some(n) = parse("OCPP_MAX_CONCURRENT_HANDLERS") {
            config.max_concurrent_handlers = n as usize;
        }
        if let Some(n) = parse("OCPP_MAX_PENDING_CALLS") {
            config.max_pending_calls = n as usize;
        }

        config
    }
}
