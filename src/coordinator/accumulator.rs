//! Task-scoped result accumulator

use crate::network::PortResult;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Normalized uniqueness key for accumulated entries
pub trait AccumulatorKey {
    fn accumulator_key(&self) -> String;
}

impl AccumulatorKey for String {
    fn accumulator_key(&self) -> String {
        normalize_hostname(self)
    }
}

impl AccumulatorKey for PortResult {
    fn accumulator_key(&self) -> String {
        self.key()
    }
}

/// Lower-case, trim whitespace and a trailing root dot
pub fn normalize_hostname(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

struct Entries<T> {
    seen: HashSet<String>,
    items: Vec<T>,
}

/// Set of entries shared by the units of one task.
///
/// Clones share the same storage. The lock is held only for the insert or
/// the snapshot copy; `MutexGuard` is not `Send`, so a guard can never be
/// held across an `.await` inside a spawned unit.
pub struct ResultAccumulator<T> {
    inner: Arc<Mutex<Entries<T>>>,
}

impl<T> Clone for ResultAccumulator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: AccumulatorKey + Clone> ResultAccumulator<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Entries {
                seen: HashSet::new(),
                items: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries<T>> {
        // A panicking unit cannot leave the set half-updated; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert one entry; `false` if its key was already present
    pub fn insert(&self, item: T) -> bool {
        let key = item.accumulator_key();
        let mut entries = self.lock();
        if entries.seen.insert(key) {
            entries.items.push(item);
            true
        } else {
            false
        }
    }

    /// Insert a batch of entries, returning how many were new.
    ///
    /// Keys are computed before the lock is taken.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) -> usize {
        let keyed: Vec<(String, T)> = items
            .into_iter()
            .map(|item| (item.accumulator_key(), item))
            .collect();
        if keyed.is_empty() {
            return 0;
        }

        let mut entries = self.lock();
        let mut added = 0;
        for (key, item) in keyed {
            if entries.seen.insert(key) {
                entries.items.push(item);
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, item: &T) -> bool {
        let key = item.accumulator_key();
        self.lock().seen.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the entries in first-insertion order
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.clone()
    }
}

impl<T: AccumulatorKey + Clone> Default for ResultAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}
