//! Shared page-size counter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of items a collection fetch asks for.
///
/// Clones share the same counter: the poller reads it at fetch time and an
/// escalation control multiplies it. It never drops below 1.
#[derive(Debug, Clone)]
pub struct PageSize {
    count: Arc<AtomicU64>,
}

impl PageSize {
    pub fn new(initial: u64) -> crate::Result<Self> {
        if initial == 0 {
            return Err(crate::SyncError::InvalidPageSize(initial));
        }
        Ok(Self {
            count: Arc::new(AtomicU64::new(initial)),
        })
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Multiply in place and return the new value. Saturates at `u64::MAX`.
    pub fn multiply(&self, multiplier: u64) -> crate::Result<u64> {
        if multiplier == 0 {
            return Err(crate::SyncError::InvalidMultiplier(multiplier));
        }
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_mul(multiplier))
            })
            .unwrap_or_else(|current| current);
        Ok(previous.saturating_mul(multiplier))
    }

    /// Whether two handles share one counter
    pub fn shares_counter_with(&self, other: &PageSize) -> bool {
        Arc::ptr_eq(&self.count, &other.count)
    }
}
