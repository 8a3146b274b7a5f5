//! Wall-clock helper shared by every periodic loop and timestamped record.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in fractional seconds, matching the `timestamp float`
/// fields of the reference schema (§6.2).
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
