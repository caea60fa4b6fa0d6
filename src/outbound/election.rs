//! Broadcaster election

use chrono::{DateTime, Utc};

/// Pick the observer allowed to broadcast an outbound leg.
///
/// The nanosecond component of the finalizing block's timestamp, taken
/// modulo the observer count. Every replica sees the same block time and the
/// same ordered observer list, so every replica elects the same index.
/// Returns `None` for an empty observer set.
pub fn elect_broadcaster(block_time: DateTime<Utc>, observer_count: usize) -> Option<usize> {
    if observer_count == 0 {
        return None;
    }
    Some(block_time.timestamp_subsec_nanos() as usize % observer_count)
}
