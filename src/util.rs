//! Small helpers shared across modules.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as whole seconds since the epoch. The image only stores
/// second-granularity timestamps, so anything sub-second is simply not
/// representable and is dropped here rather than further down the chain.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
