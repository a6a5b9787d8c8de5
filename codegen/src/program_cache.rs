//! Per-context cache of compiled programs.
//!
//! Programs are keyed by a SHA-256 fingerprint of their source and build
//! options (or by an explicit key chosen by the caller). Each context gets its
//! own bounded [`ProgramCache`]; caches are found through a
//! [`ProgramCacheRegistry`] that is itself a bounded LRU over context ids, so
//! programs of a context that fell out of use are released together.
//!
//! The lock only covers map lookups and inserts. A miss builds outside the
//! lock, so two threads missing on the same key may both compile; the later
//! insert wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tessera_device::{Context, ContextId, Program};

use crate::error::Result;
use crate::lru::Lru;

pub const DEFAULT_PROGRAM_CAPACITY: usize = 64;
pub const DEFAULT_CONTEXT_CAPACITY: usize = 8;

/// Hex SHA-256 digest identifying a (source, options) pair.
pub fn fingerprint(source: &str, options: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(options.as_bytes());
    hex::encode(hasher.finalize())
}

/// Counters observed on one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct ProgramCache {
    context: ContextId,
    programs: Mutex<Lru<String, Program>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ProgramCache {
    pub fn new(context: ContextId, capacity: usize) -> Self {
        Self {
            context,
            programs: Mutex::new(Lru::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn capacity(&self) -> usize {
        self.programs.lock().capacity()
    }

    pub fn get(&self, key: &str) -> Option<Program> {
        let found = self.programs.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: impl Into<String>, program: Program) {
        let key = key.into();
        debug_assert_eq!(program.context_id(), self.context, "program cached under a foreign context");
        if let Some((evicted, _)) = self.programs.lock().insert(key, program) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(context.id = self.context, cache.key = %evicted, "program evicted");
        }
    }

    /// Returns the cached program for `key`, building and inserting it on a miss.
    pub fn get_or_build(&self, key: &str, build: impl FnOnce() -> Result<Program>) -> Result<Program> {
        if let Some(program) = self.get(key) {
            tracing::trace!(context.id = self.context, cache.key = key, "program cache hit");
            return Ok(program);
        }
        tracing::debug!(context.id = self.context, cache.key = key, "program cache miss");
        let program = build()?;
        self.insert(key, program.clone());
        Ok(program)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.programs.lock().len(),
        }
    }

    pub fn clear(&self) {
        self.programs.lock().clear();
    }
}

/// Finds the [`ProgramCache`] of a context.
#[derive(Debug)]
pub struct ProgramCacheRegistry {
    caches: Mutex<Lru<ContextId, Arc<ProgramCache>>>,
    program_capacity: usize,
}

static GLOBAL: Lazy<ProgramCacheRegistry> = Lazy::new(ProgramCacheRegistry::from_env);

impl ProgramCacheRegistry {
    pub fn new(context_capacity: usize, program_capacity: usize) -> Self {
        Self { caches: Mutex::new(Lru::new(context_capacity)), program_capacity }
    }

    /// Default capacities, with the per-context capacity overridable through
    /// `TESSERA_CACHE_CAPACITY`.
    pub fn from_env() -> Self {
        let program_capacity = std::env::var("TESSERA_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&c| c > 0)
            .unwrap_or(DEFAULT_PROGRAM_CAPACITY);
        Self::new(DEFAULT_CONTEXT_CAPACITY, program_capacity)
    }

    /// Process-wide registry, created on first use.
    pub fn global() -> &'static ProgramCacheRegistry {
        &GLOBAL
    }

    pub fn cache_for(&self, context: &Context) -> Arc<ProgramCache> {
        let id = context.id();
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(&id) {
            return Arc::clone(cache);
        }
        let cache = Arc::new(ProgramCache::new(id, self.program_capacity));
        if let Some((evicted, _)) = caches.insert(id, Arc::clone(&cache)) {
            tracing::debug!(context.id = evicted, "program cache for context evicted");
        }
        cache
    }

    /// Cache of `context` if one exists, without creating or touching it.
    pub fn peek(&self, context: &Context) -> Option<Arc<ProgramCache>> {
        self.caches.lock().peek(&context.id()).cloned()
    }

    pub fn len(&self) -> usize {
        self.caches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.lock().is_empty()
    }

    pub fn clear(&self) {
        self.caches.lock().clear();
    }

    /// Drops every cache and the programs they hold.
    pub fn shutdown(&self) {
        let count = self.len();
        self.clear();
        tracing::debug!(caches = count, "program cache registry shut down");
    }
}

impl Default for ProgramCacheRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_CAPACITY, DEFAULT_PROGRAM_CAPACITY)
    }
}
