//! Process-unique identifiers derived from a high-resolution clock.
//!
//! A nanosecond timestamp alone can repeat when two ids are minted in the
//! same tick, so every id also carries a process-wide sequence number.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns `<nanos>_<seq>`, unique for the lifetime of the process.
pub fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{nanos}_{seq}")
}
