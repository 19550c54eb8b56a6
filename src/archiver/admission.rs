use std::sync::atomic::{AtomicU32, Ordering};

/// Bounded lock-free counter of currently admitted tasks.
#[derive(Debug, Default)]
pub struct AdmissionCounter {
    active: AtomicU32,
}

impl AdmissionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically move the counter from `n` to `n + 1` iff `n < max`.
    ///
    /// Returns `false` only when the observed value equals `max`; a lost CAS
    /// race retries instead of failing spuriously.
    pub fn try_acquire(&self, max: u32) -> bool {
        let mut current = self.active.load(Ordering::Relaxed);
        loop {
            if current >= max {
                return false;
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Release one admission unit. Underflow is a programming error.
    pub fn release(&self) {
        let prev = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "admission counter underflow");
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Relaxed)
    }
}
