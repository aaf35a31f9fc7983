//! # Stock Lock Registry
//!
//! Per-product exclusive locks held across a sale's stock transaction.
//!
//! ## Why Explicit Locks?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two cashiers sell the last unit of the same product:                   │
//! │                                                                         │
//! │  Sale A: lock(p1) ──► BEGIN ──► UPDATE stocks … ──► COMMIT ──► unlock  │
//! │  Sale B:      lock(p1) ··· waits ··························► BEGIN …   │
//! │                                                                         │
//! │  Sale B only reads the stock row after A committed, so it sees 0 and   │
//! │  is rejected. Sales on OTHER products never wait on p1.               │
//! │                                                                         │
//! │  Deadlock freedom: every holder acquires in sorted id order.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry keeps `Weak` references, so the entry of a product nobody
//! holds is reclaimed on a later acquisition.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Registry size above which dead entries are pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of per-product locks.
#[derive(Debug, Default)]
pub struct StockLocks {
    slots: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl StockLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every given product, in sorted order, duplicates ignored.
    ///
    /// Waits while another holder owns any of them. The locks are released
    /// when the returned guard is dropped. Dropping this future part-way
    /// releases whatever it already acquired.
    pub async fn acquire<I, S>(&self, product_ids: I) -> StockGuard
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: BTreeSet<String> = product_ids
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();

        let mut held = Vec::with_capacity(ids.len());
        for id in ids {
            let slot = self.slot(&id);
            let guard = slot.lock_owned().await;
            held.push((id, guard));
        }

        debug!(products = held.len(), "Stock locks acquired");
        StockGuard { held }
    }

    /// Number of products currently tracked (held or recently held).
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn slot(&self, product_id: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = slots.get(product_id).and_then(Weak::upgrade) {
            return existing;
        }

        if slots.len() >= PRUNE_THRESHOLD {
            slots.retain(|_, w| w.strong_count() > 0);
        }

        let fresh = Arc::new(AsyncMutex::new(()));
        slots.insert(product_id.to_string(), Arc::downgrade(&fresh));
        fresh
    }
}

/// Proof that a set of products is exclusively locked.
///
/// Required by every ledger operation that changes a stock row inside a
/// caller-owned transaction.
#[derive(Debug)]
pub struct StockGuard {
    // Sorted by product id.
    held: Vec<(String, OwnedMutexGuard<()>)>,
}

impl StockGuard {
    /// Checks if this guard holds the lock of `product_id`.
    pub fn covers(&self, product_id: &str) -> bool {
        self.held
            .binary_search_by(|(id, _)| id.as_str().cmp(product_id))
            .is_ok()
    }

    /// Locked product ids, sorted.
    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
