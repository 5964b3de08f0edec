//! Per-entity locks
//!
//! Every transaction names the requests and donors it touches, and the lock
//! table hands back guards for all of them or none. Keys are sorted before
//! acquisition, so two transactions can never wait on each other in opposite
//! order; each wait is bounded and expiry surfaces as `Error::Contention`.

use crate::{Error, Result};
use dashmap::DashMap;
use donation_ledger::{DonorId, HospitalId, RequestId};
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lockable entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    /// A blood request
    Request(RequestId),
    /// A donor
    Donor(DonorId),
    /// A hospital (verification only)
    Hospital(HospitalId),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Hospital(id) => write!(f, "hospital:{}", id),
            LockKey::Request(id) => write!(f, "request:{}", id),
            LockKey::Donor(id) => write!(f, "donor:{}", id),
        }
    }
}

/// Guards held by one transaction; dropping releases all of them
pub struct LockSet {
    keys: BTreeSet<LockKey>,
    _guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl LockSet {
    /// Whether every key is held by this set
    pub fn holds_all<'a>(&self, keys: impl IntoIterator<Item = &'a LockKey>) -> bool {
        keys.into_iter().all(|k| self.keys.contains(k))
    }

    /// Number of entities locked
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when nothing is locked
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for LockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockSet").field("keys", &self.keys).finish()
    }
}

/// Table of entity mutexes, created on first use
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LockTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key, in sorted order, waiting at most `timeout` per key
    pub fn acquire(
        &self,
        keys: impl IntoIterator<Item = LockKey>,
        timeout: Duration,
    ) -> Result<LockSet> {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(keys.len());

        for key in &keys {
            // Clone the Arc out so no DashMap shard lock is held while waiting
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();

            match mutex.try_lock_arc_for(timeout) {
                Some(guard) => guards.push(guard),
                None => {
                    tracing::warn!(key = %key, timeout_ms = timeout.as_millis() as u64, "Lock wait timed out");
                    // Guards acquired so far drop here
                    return Err(Error::Contention(format!(
                        "timed out after {:?} waiting for {}",
                        timeout, key
                    )));
                }
            }
        }

        tracing::debug!(count = keys.len(), "Entity locks acquired");
        Ok(LockSet {
            keys,
            _guards: guards,
        })
    }

    /// Number of entities ever locked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when no entity has been locked yet
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl fmt::Debug for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable").field("entries", &self.locks.len()).finish()
    }
}
