//! Time helpers.

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Current Unix timestamp in seconds.
///
/// Returns 0 if system time is before the epoch rather than panicking.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| {
            warn!("system time is before the UNIX epoch");
            std::time::Duration::from_secs(0)
        })
        .as_secs()
}
