//! Worker pool slot tracker
//!
//! A fixed number of slots, each held by at most one scan. A slot held for
//! longer than the maximum runtime is stale and may be reclaimed by the next
//! caller, so a crashed or wedged scan cannot block the pool forever.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors returned by the pool
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("All {max} worker slots are busy")]
    Denied { max: usize },
}

#[derive(Debug, Clone)]
struct SlotLease {
    owner: String,
    acquired_at: Instant,
    token: u64,
}

/// A claimed slot; pass it back to `release_slot`
#[derive(Debug)]
pub struct Slot {
    index: usize,
    owner: String,
    token: u64,
}

impl Slot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// An occupied slot as seen by `list_active`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSlot {
    pub index: usize,
    pub owner: String,
    pub age: Duration,
    pub stale: bool,
}

/// Slot counts at one moment
///
/// `active + stale + available == max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max: usize,
    pub active: usize,
    pub stale: usize,
    pub available: usize,
}

/// Fixed-size slot tracker
pub struct WorkerPool {
    slots: Box<[Mutex<Option<SlotLease>>]>,
    max_runtime: Duration,
    next_token: AtomicU64,
}

impl WorkerPool {
    /// Creates a pool
    ///
    /// # Arguments
    ///
    /// * `max_workers` - Number of slots
    /// * `max_runtime` - Age after which a held slot is stale
    pub fn new(max_workers: usize, max_runtime: Duration) -> Self {
        Self {
            slots: (0..max_workers).map(|_| Mutex::new(None)).collect(),
            max_runtime,
            next_token: AtomicU64::new(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.slots.len()
    }

    fn lock(&self, index: usize) -> MutexGuard<'_, Option<SlotLease>> {
        self.slots[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, lease: &SlotLease, now: Instant) -> bool {
        now.saturating_duration_since(lease.acquired_at) > self.max_runtime
    }

    /// Claims the first empty or stale slot for `owner`
    ///
    /// # Returns
    ///
    /// * `Ok(Slot)` - The claimed slot
    /// * `Err(PoolError::Denied)` - Every slot is held by a live lease
    pub fn acquire_slot(&self, owner: &str) -> Result<Slot, PoolError> {
        let now = Instant::now();

        for index in 0..self.slots.len() {
            let mut guard = self.lock(index);
            let claimable = match guard.as_ref() {
                None => true,
                Some(lease) if self.is_stale(lease, now) => {
                    tracing::warn!(
                        slot = index,
                        previous_owner = %lease.owner,
                        "Reclaiming stale worker slot"
                    );
                    true
                }
                Some(_) => false,
            };

            if claimable {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                *guard = Some(SlotLease {
                    owner: owner.to_string(),
                    acquired_at: now,
                    token,
                });
                tracing::debug!(slot = index, owner, "Acquired worker slot");
                return Ok(Slot {
                    index,
                    owner: owner.to_string(),
                    token,
                });
            }
        }

        Err(PoolError::Denied {
            max: self.slots.len(),
        })
    }

    /// Frees `slot` if it is still held by the same claim
    ///
    /// Returns false when the slot was reclaimed in the meantime; the new
    /// holder is left alone.
    pub fn release_slot(&self, slot: Slot) -> bool {
        let mut guard = self.lock(slot.index);
        match guard.as_ref() {
            Some(lease) if lease.token == slot.token && lease.owner == slot.owner => {
                *guard = None;
                tracing::debug!(slot = slot.index, owner = %slot.owner, "Released worker slot");
                true
            }
            _ => {
                tracing::debug!(
                    slot = slot.index,
                    owner = %slot.owner,
                    "Slot no longer held by this owner; nothing to release"
                );
                false
            }
        }
    }

    /// Every occupied slot
    pub fn list_active(&self) -> Vec<ActiveSlot> {
        let now = Instant::now();
        (0..self.slots.len())
            .filter_map(|index| {
                self.lock(index).as_ref().map(|lease| ActiveSlot {
                    index,
                    owner: lease.owner.clone(),
                    age: now.saturating_duration_since(lease.acquired_at),
                    stale: self.is_stale(lease, now),
                })
            })
            .collect()
    }

    /// Frees every stale slot and returns how many were freed
    pub fn sweep_stale(&self) -> usize {
        let now = Instant::now();
        let mut swept = 0;
        for index in 0..self.slots.len() {
            let mut guard = self.lock(index);
            if guard.as_ref().is_some_and(|lease| self.is_stale(lease, now)) {
                if let Some(lease) = guard.take() {
                    tracing::warn!(slot = index, owner = %lease.owner, "Swept stale worker slot");
                }
                swept += 1;
            }
        }
        swept
    }

    pub fn status(&self) -> PoolStatus {
        let now = Instant::now();
        let mut status = PoolStatus {
            max: self.slots.len(),
            active: 0,
            stale: 0,
            available: 0,
        };
        for index in 0..self.slots.len() {
            match self.lock(index).as_ref() {
                None => status.available += 1,
                Some(lease) if self.is_stale(lease, now) => status.stale += 1,
                Some(_) => status.active += 1,
            }
        }
        status
    }
}
