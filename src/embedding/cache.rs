//! In-memory embedding cache with TTL and size-bounded eviction.
//!
//! Keys are blake3 hashes of the model name and the literal text, so the same
//! text embedded by two models never collides. Every operation is best-effort:
//! a poisoned lock degrades to a miss (or a dropped insert) instead of an error.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub vector: Vec<f32>,
    pub inserted_at: DateTime<Utc>,
    /// Insertion order, breaks ties between identical timestamps.
    seq: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    next_seq: u64,
}

pub struct EmbeddingCache {
    ttl: Duration,
    max_size: usize,
    state: Mutex<CacheState>,
}

impl EmbeddingCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: Duration::hours(config.expiration_hours),
            max_size: config.max_size.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Deterministic cache key for `text` embedded by `model`.
    pub fn key(model: &str, text: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(model.as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    fn lock(&self) -> Option<MutexGuard<'_, CacheState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(error = %e, "embedding cache lock poisoned, bypassing cache");
                None
            }
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.inserted_at >= self.ttl
    }

    pub fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        self.get_at(model, text, Utc::now())
    }

    pub fn get_at(&self, model: &str, text: &str, now: DateTime<Utc>) -> Option<Vec<f32>> {
        self.lookup(model, text, now, true)
    }

    /// Like [`get`](Self::get) but leaves the hit/miss counters alone.
    pub fn peek(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        self.lookup(model, text, Utc::now(), false)
    }

    fn lookup(&self, model: &str, text: &str, now: DateTime<Utc>, count: bool) -> Option<Vec<f32>> {
        let key = Self::key(model, text);
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let fresh = match state.entries.get(&key) {
            Some(entry) if !self.is_expired(entry, now) => Some(entry.vector.clone()),
            Some(_) => {
                state.entries.remove(&key);
                None
            }
            None => None,
        };

        if count {
            match fresh {
                Some(_) => {
                    state.hits += 1;
                    tracing::debug!(model, "embedding cache hit");
                }
                None => state.misses += 1,
            }
        }
        fresh
    }

    pub fn put(&self, model: &str, text: &str, vector: Vec<f32>) {
        self.put_at(model, text, vector, Utc::now());
    }

    pub fn put_at(&self, model: &str, text: &str, vector: Vec<f32>, now: DateTime<Utc>) {
        let key = Self::key(model, text);
        let Some(mut guard) = self.lock() else {
            return;
        };
        let state = &mut *guard;

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                vector,
                inserted_at: now,
                seq,
            },
        );

        if state.entries.len() > self.max_size {
            self.evict(state, now);
        }
    }

    /// Drop expired entries, then the oldest insertions until within bound.
    fn evict(&self, state: &mut CacheState, now: DateTime<Utc>) {
        let before = state.entries.len();
        state.entries.retain(|_, entry| now - entry.inserted_at < self.ttl);

        while state.entries.len() > self.max_size {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.inserted_at, e.seq))
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    state.entries.remove(&key);
                }
                None => break,
            }
        }

        tracing::debug!(
            evicted = before - state.entries.len(),
            size = state.entries.len(),
            "embedding cache evicted entries"
        );
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(mut state) = self.lock() {
            state.entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let Some(state) = self.lock() else {
            return CacheStats {
                size: 0,
                max_size: self.max_size,
                hits: 0,
                misses: 0,
                hit_rate: 0.0,
            };
        };
        let lookups = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }
}
