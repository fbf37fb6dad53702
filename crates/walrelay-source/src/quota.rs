use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide budget for in-flight batch bytes.
///
/// One controller is shared (via `Arc`) by every WAL group reader in the
/// process. It never blocks; it only reports. Readers that see the
/// budget exceeded sleep and retry without producing a new batch, and
/// the shipper releases bytes once a batch has been transmitted.
#[derive(Debug)]
pub struct QuotaController {
    quota: u64,
    used: AtomicU64,
}

impl QuotaController {
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            quota: quota_bytes,
            used: AtomicU64::new(0),
        }
    }

    /// Returns `true` if a reader may start assembling a new batch.
    pub fn acquire_check(&self) -> bool {
        self.used.load(Ordering::Relaxed) <= self.quota
    }

    /// Account `n` bytes. Returns `true` if the budget is now exceeded
    /// (the caller should close its batch).
    pub fn add(&self, n: u64) -> bool {
        let after = self.used.fetch_add(n, Ordering::Relaxed) + n;
        after >= self.quota
    }

    /// Return `n` bytes to the budget (saturating at zero).
    pub fn release(&self, n: u64) {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(n);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }
}
