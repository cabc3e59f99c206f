//! Bounded, expiring cache of authorized subjects.
//!
//! Maps a subject identifier to the grant produced by the first successful
//! authorization for that subject. Entries expire a fixed time after they
//! were inserted. When the cache is full the entry inserted earliest is
//! evicted, whether or not it was read recently.
//!
//! Concurrent misses for the same subject are coalesced: one caller runs the
//! producer while the others wait on a per-subject lock and then read the
//! value it stored. Misses for different subjects proceed in parallel.

use crate::observability::metrics::{
    record_subject_cache_eviction, record_subject_cache_lookup, set_subject_cache_entries,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion sequence -> subject, oldest first.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn remove_oldest(&mut self) -> Option<CacheEntry<V>> {
        let (_, subject) = self.order.pop_first()?;
        self.entries.remove(&subject)
    }

    fn oldest_age(&self, now: Instant) -> Option<Duration> {
        let (_, subject) = self.order.first_key_value()?;
        self.entries
            .get(subject)
            .map(|entry| now.saturating_duration_since(entry.inserted_at))
    }
}

type InFlightMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Size-bounded, time-expiring cache keyed by subject identifier.
pub struct SubjectCache<V> {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState<V>>,
    in_flight: InFlightMap,
}

impl<V: Clone> SubjectCache<V> {
    /// Create a cache whose entries live for `ttl` and which holds at most
    /// `max_entries` subjects. A `max_entries` of zero is treated as one.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::new()),
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Return the fresh value cached for `subject`, if any.
    pub async fn get(&self, subject: &str) -> Option<V> {
        let state = self.state.lock().await;
        self.fresh(&state, subject, Instant::now())
    }

    /// Number of entries currently held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Return the cached value for `subject` or produce and store a new one.
    ///
    /// `producer` runs only when no fresh entry exists. Its error is returned
    /// to the caller and nothing is stored, so the next call retries.
    ///
    /// # Errors
    ///
    /// Whatever `producer` returns.
    pub async fn get_or_create<F, Fut, E>(&self, subject: &str, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(subject).await {
            record_subject_cache_lookup("hit");
            return Ok(value);
        }

        let slot = InFlight::acquire(&self.in_flight, subject);
        let _producing = slot.lock.lock().await;

        // The caller we waited behind may have stored the value
        if let Some(value) = self.get(subject).await {
            record_subject_cache_lookup("hit");
            return Ok(value);
        }

        record_subject_cache_lookup("miss");
        let value = producer().await?;
        self.insert(subject, value.clone()).await;
        Ok(value)
    }

    /// Insert or overwrite the entry for `subject` with the current time.
    pub async fn insert(&self, subject: &str, value: V) {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if let Some(previous) = state.entries.remove(subject) {
            state.order.remove(&previous.seq);
        }

        // Insertion order is also expiry order, so expired entries are a prefix
        let mut expired = 0u64;
        while state.oldest_age(now).is_some_and(|age| age >= self.ttl) {
            state.remove_oldest();
            expired += 1;
        }
        if expired > 0 {
            record_subject_cache_eviction("expired", expired);
        }

        let mut evicted = 0u64;
        while state.entries.len() >= self.max_entries {
            if state.remove_oldest().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            tracing::debug!(
                target: "todo.auth.cache",
                evicted,
                max_entries = self.max_entries,
                "Subject cache full, evicted oldest entries"
            );
            record_subject_cache_eviction("capacity", evicted);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, subject.to_string());
        state.entries.insert(
            subject.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                seq,
            },
        );

        set_subject_cache_entries(state.entries.len());
    }

    fn fresh(&self, state: &CacheState<V>, subject: &str, now: Instant) -> Option<V> {
        state
            .entries
            .get(subject)
            .filter(|entry| now.saturating_duration_since(entry.inserted_at) < self.ttl)
            .map(|entry| entry.value.clone())
    }
}

/// Per-subject producer lock, removed from the map once nobody holds it.
struct InFlight<'a> {
    map: &'a InFlightMap,
    subject: &'a str,
    lock: Arc<Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn acquire(map: &'a InFlightMap, subject: &'a str) -> Self {
        let mut slots = map.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(slots.entry(subject.to_string()).or_default());
        Self { map, subject, lock }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut slots = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here: no other caller is waiting
        if Arc::strong_count(&self.lock) <= 2
            && slots
                .get(self.subject)
                .is_some_and(|existing| Arc::ptr_eq(existing, &self.lock))
        {
            slots.remove(self.subject);
        }
    }
}
