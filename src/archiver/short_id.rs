//! Fallback task ID source for when the OS random source is unavailable.

use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a short process-unique ID from a monotonic counter.
pub fn next() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("t{:08x}", n)
}
