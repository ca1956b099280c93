//! Memoized model responses, keyed by what was asked of which model

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_CAPACITY: usize = 10_000;

/// Which kind of request a cached value answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Chat,
    Embedding,
    Rewrite,
}

/// `(kind, model, digest of the request text)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: CacheKind,
    model: String,
    digest: [u8; 16],
}

impl CacheKey {
    pub fn new(kind: CacheKind, model: &str, text: &str) -> Self {
        let hash = blake3::hash(text.as_bytes());
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&hash.as_bytes()[..16]);
        Self {
            kind,
            model: model.to_string(),
            digest,
        }
    }
}

struct Entry {
    value: String,
    stored_at: Instant,
}

/// Bounded in-memory cache shared by clones
#[derive(Clone)]
pub struct LLMCache {
    entries: Arc<RwLock<HashMap<CacheKey, Entry>>>,
    ttl: Duration,
    capacity: usize,
}

impl LLMCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// The cached value, unless it has outlived the TTL
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Store `value`; a full cache first drops expired entries, then the oldest one
    pub fn insert(&self, key: CacheKey, value: String) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LLMCache {
    fn default() -> Self {
        Self::new()
    }
}
