//! Paged resource cache.
//!
//! Caches the envelopes returned by list endpoints, keyed by
//! `(resource, page, filter signature)`, so paginating back and forth or
//! revisiting a list inside the freshness window costs no round-trip.
//!
//! ## Freshness
//!
//! An entry is served only while `now - fetched_at < ttl`; the TTL comes from
//! the caller's [`CacheOptions`].  Stale entries are never returned and are
//! overwritten by the next successful fetch.
//!
//! ## LRU eviction
//!
//! Entries live in one `IndexMap` ordered from least to most recently used.
//! A hit moves the entry to the back; inserting past `max_entries` pops the
//! front, whatever resource it belongs to.
//!
//! ## De-duplication
//!
//! At most one fetch per key is in flight.  Callers that miss while a fetch
//! is running await the same [`Shared`] future and receive the same result,
//! error included.  Failed fetches are never cached.
//!
//! ## Invalidation
//!
//! [`PagedCache::invalidate`] drops every entry and in-flight fetch of a
//! resource before returning, and bumps the resource generation so a fetch
//! started earlier cannot write its result back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use mangawiki_shared::constants::{DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS};
use mangawiki_shared::{CacheError, CachedPage, FetchError, PageEnvelope};
use mangawiki_store::{Database, Envelope};

/// Per-call freshness and persistence knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: Duration,
    /// Mirror the fetched page into the local database.
    pub persist: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            persist: false,
        }
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    resource: String,
    page: u32,
    filter_signature: String,
}

#[derive(Debug, Clone)]
struct Entry {
    envelope: PageEnvelope<Value>,
    fetched_at: DateTime<Utc>,
}

impl Entry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        is_fresh(self.fetched_at, ttl)
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Entry, FetchError>>>;

#[derive(Default)]
struct Inner {
    /// Least recently used first.
    entries: IndexMap<CacheKey, Entry>,
    inflight: HashMap<CacheKey, SharedFetch>,
    generations: HashMap<String, u64>,
    stats: CacheStats,
}

impl Inner {
    fn generation(&self, resource: &str) -> u64 {
        self.generations.get(resource).copied().unwrap_or(0)
    }

    fn bump_generation(&mut self, resource: &str) {
        *self.generations.entry(resource.to_string()).or_insert(0) += 1;
    }

    /// Return a fresh entry and mark it most recently used.
    fn touch(&mut self, key: &CacheKey, ttl: Duration) -> Option<Entry> {
        let idx = self.entries.get_index_of(key)?;
        let (_, entry) = self.entries.get_index(idx)?;
        if !entry.is_fresh(ttl) {
            return None;
        }
        let entry = entry.clone();
        let last = self.entries.len() - 1;
        self.entries.move_index(idx, last);
        Some(entry)
    }

    /// Insert as most recently used and evict down to `max_entries`.
    /// Returns the evicted keys.
    fn insert(&mut self, key: CacheKey, entry: Entry, max_entries: usize) -> Vec<CacheKey> {
        self.entries.shift_remove(&key);
        self.entries.insert(key, entry);

        let mut evicted = Vec::new();
        while self.entries.len() > max_entries {
            match self.entries.shift_remove_index(0) {
                Some((key, _)) => {
                    self.stats.evictions += 1;
                    evicted.push(key);
                }
                None => break,
            }
        }
        evicted
    }
}

/// Process-wide cache for paginated list endpoints.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every list consumer.
pub struct PagedCache {
    inner: Arc<Mutex<Inner>>,
    max_entries: usize,
    database: Option<Arc<Mutex<Database>>>,
}

impl PagedCache {
    /// In-memory cache holding at most `max_entries` pages.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            max_entries: max_entries.max(1),
            database: None,
        }
    }

    /// Cache that can mirror pages into `database` for `persist` requests.
    pub fn with_database(max_entries: usize, database: Arc<Mutex<Database>>) -> Self {
        Self {
            database: Some(database),
            ..Self::new(max_entries)
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of pages currently held in memory, fresh or not.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        lock(&self.inner).stats
    }

    /// Fetch page `page` of `resource` filtered by `filters`, going to the
    /// network through `fetcher` only when no fresh copy exists.
    ///
    /// `fetcher` is called at most once; the future it returns is only
    /// polled if this call ends up owning the fetch for the key.
    pub async fn get_page<T, F, Fut>(
        &self,
        resource: &str,
        page: u32,
        filters: &Value,
        fetcher: F,
        options: CacheOptions,
    ) -> Result<CachedPage<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<PageEnvelope<T>, FetchError>> + Send + 'static,
    {
        let key = CacheKey {
            resource: resource.to_string(),
            page,
            filter_signature: filter_signature(filters),
        };

        {
            let mut inner = lock(&self.inner);
            if let Some(entry) = inner.touch(&key, options.ttl) {
                inner.stats.hits += 1;
                drop(inner);
                debug!(resource, page, "page served from cache");
                return decode(key, entry);
            }
        }

        if options.persist {
            if let Some(entry) = self.load_persisted(&key, options.ttl) {
                debug!(resource, page, "page rehydrated from local store");
                return decode(key, entry);
            }
        }

        let shared = {
            let existing = {
                let mut inner = lock(&self.inner);
                inner.stats.misses += 1;
                inner.inflight.get(&key).cloned()
            };

            match existing {
                Some(shared) => {
                    debug!(resource, page, "joining in-flight fetch");
                    shared
                }
                None => {
                    let fut = fetcher(page);
                    self.start_fetch(&key, fut, options.persist)
                }
            }
        };

        let entry = shared.await?;
        decode(key, entry)
    }

    /// Register a fetch for `key`, or join one another caller registered first.
    fn start_fetch<T, Fut>(&self, key: &CacheKey, fut: Fut, persist: bool) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Result<PageEnvelope<T>, FetchError>> + Send + 'static,
    {
        let mut inner = lock(&self.inner);
        if let Some(shared) = inner.inflight.get(key) {
            return shared.clone();
        }

        let generation = inner.generation(&key.resource);
        let completion = Completion {
            inner: Arc::clone(&self.inner),
            database: self.database.clone(),
            max_entries: self.max_entries,
            key: key.clone(),
            generation,
            persist,
        };

        let shared = async move {
            let result = fut.await.and_then(|envelope| {
                to_value_envelope(envelope).map_err(|e| FetchError::Decode(e.to_string()))
            });
            completion.finish(result)
        }
        .boxed()
        .shared();

        inner.stats.fetches += 1;
        inner.inflight.insert(key.clone(), shared.clone());
        debug!(resource = %key.resource, page = key.page, "fetching page");
        shared
    }

    fn load_persisted(&self, key: &CacheKey, ttl: Duration) -> Option<Entry> {
        let database = self.database.as_ref()?;
        let generation = lock(&self.inner).generation(&key.resource);
        let stored = {
            let db = lock(database);
            match db.get_page(&key.resource, key.page, &key.filter_signature) {
                Ok(stored) => stored?,
                Err(e) => {
                    warn!(error = %e, "failed to read persisted page");
                    return None;
                }
            }
        };

        if !is_fresh(stored.timestamp, ttl) {
            return None;
        }

        let envelope: PageEnvelope<Value> = match serde_json::from_value(stored.value) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(resource = %key.resource, page = key.page, error = %e, "persisted page has the wrong shape");
                return None;
            }
        };

        let entry = Entry {
            envelope,
            fetched_at: stored.timestamp,
        };

        let evicted = {
            let mut inner = lock(&self.inner);
            // invalidated since the row was read
            if inner.generation(&key.resource) != generation {
                return None;
            }
            inner.stats.hits += 1;
            inner.insert(key.clone(), entry.clone(), self.max_entries)
        };
        forget_persisted(self.database.as_ref(), &evicted);

        Some(entry)
    }

    /// Load persisted pages younger than `ttl` into memory, most recent last.
    ///
    /// Expired rows are deleted.  Returns the number of pages loaded.
    pub fn rehydrate(&self, ttl: Duration) -> usize {
        let Some(database) = self.database.as_ref() else {
            return 0;
        };

        let pages = {
            let db = lock(database);
            match db.list_pages() {
                Ok(pages) => pages,
                Err(e) => {
                    warn!(error = %e, "failed to list persisted pages");
                    return 0;
                }
            }
        };

        let mut stale = Vec::new();
        let mut evicted = Vec::new();
        let mut loaded = 0;
        {
            let mut inner = lock(&self.inner);
            for stored in pages {
                let key = CacheKey {
                    resource: stored.resource_key,
                    page: stored.page,
                    filter_signature: stored.filter_signature,
                };

                if !is_fresh(stored.envelope.timestamp, ttl) {
                    stale.push(key);
                    continue;
                }

                match serde_json::from_value::<PageEnvelope<Value>>(stored.envelope.value) {
                    Ok(envelope) => {
                        let entry = Entry {
                            envelope,
                            fetched_at: stored.envelope.timestamp,
                        };
                        evicted.extend(inner.insert(key, entry, self.max_entries));
                        loaded += 1;
                    }
                    Err(e) => {
                        warn!(resource = %key.resource, page = key.page, error = %e, "persisted page has the wrong shape");
                        stale.push(key);
                    }
                }
            }
        }

        stale.extend(evicted);
        forget_persisted(self.database.as_ref(), &stale);

        debug!(loaded, discarded = stale.len(), "rehydrated page cache");
        loaded.min(self.max_entries)
    }

    /// Drop every cached page of `resource`, in memory and on disk.
    ///
    /// The next `get_page` for the resource goes to the network even if a
    /// fetch for it was in flight when this was called.
    pub fn invalidate(&self, resource: &str) -> usize {
        let removed = {
            let mut inner = lock(&self.inner);
            let before = inner.entries.len();
            inner.entries.retain(|key, _| key.resource != resource);
            inner.inflight.retain(|key, _| key.resource != resource);
            inner.bump_generation(resource);
            before - inner.entries.len()
        };

        if let Some(database) = self.database.as_ref() {
            if let Err(e) = lock(database).delete_resource_pages(resource) {
                warn!(resource, error = %e, "failed to drop persisted pages");
            }
        }

        debug!(resource, removed, "invalidated resource");
        removed
    }

    /// Drop everything.
    pub fn invalidate_all(&self) {
        {
            let mut inner = lock(&self.inner);
            let resources: Vec<String> = inner
                .entries
                .keys()
                .chain(inner.inflight.keys())
                .map(|key| key.resource.clone())
                .collect();
            for resource in resources {
                inner.bump_generation(&resource);
            }
            inner.entries.clear();
            inner.inflight.clear();
        }

        if let Some(database) = self.database.as_ref() {
            if let Err(e) = lock(database).clear_pages() {
                warn!(error = %e, "failed to clear persisted pages");
            }
        }
    }
}

impl Default for PagedCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_MAX_ENTRIES)
    }
}

/// Everything a fetch needs to record its own result.
struct Completion {
    inner: Arc<Mutex<Inner>>,
    database: Option<Arc<Mutex<Database>>>,
    max_entries: usize,
    key: CacheKey,
    generation: u64,
    persist: bool,
}

impl Completion {
    fn finish(self, result: Result<PageEnvelope<Value>, FetchError>) -> Result<Entry, FetchError> {
        let mut inner = lock(&self.inner);
        // invalidated while in flight: the slot may already belong to a newer fetch
        let current = inner.generation(&self.key.resource) == self.generation;
        if current {
            inner.inflight.remove(&self.key);
        }

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(e) => {
                inner.stats.fetch_failures += 1;
                drop(inner);
                warn!(resource = %self.key.resource, page = self.key.page, error = %e, "page fetch failed");
                return Err(e);
            }
        };

        let entry = Entry {
            envelope,
            fetched_at: Utc::now(),
        };

        if !current {
            return Ok(entry);
        }

        let evicted = inner.insert(self.key.clone(), entry.clone(), self.max_entries);

        // written while `inner` is held so a concurrent invalidate either
        // sees this row or stops the write; lock order is inner, then database
        if self.persist && !evicted.contains(&self.key) {
            self.persist_entry(&entry);
        }
        drop(inner);
        forget_persisted(self.database.as_ref(), &evicted);

        Ok(entry)
    }

    fn persist_entry(&self, entry: &Entry) {
        let Some(database) = self.database.as_ref() else {
            return;
        };

        let value = match serde_json::to_value(&entry.envelope) {
            Ok(value) => value,
            Err(e) => {
                warn!(resource = %self.key.resource, page = self.key.page, error = %e, "page not persisted, unserializable");
                return;
            }
        };
        let stored = Envelope {
            value,
            timestamp: entry.fetched_at,
        };

        let db = lock(database);
        if let Err(e) = db.put_page(
            &self.key.resource,
            self.key.page,
            &self.key.filter_signature,
            &stored,
        ) {
            warn!(resource = %self.key.resource, error = %e, "failed to persist page");
        }
    }
}

/// Deterministic string form of a filter object.
///
/// Object keys are sorted at every depth and `null` members are dropped, so
/// `{"b": 1, "a": null}` and `{"b": 1}` share a signature.
pub fn filter_signature(filters: &Value) -> String {
    canonical(filters).to_string()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            members.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                members
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    }
}

/// A timestamp in the future is never fresh.
fn is_fresh(fetched_at: DateTime<Utc>, ttl: Duration) -> bool {
    match (Utc::now() - fetched_at).to_std() {
        Ok(age) => age < ttl,
        Err(_) => false,
    }
}

fn to_value_envelope<T: Serialize>(
    envelope: PageEnvelope<T>,
) -> Result<PageEnvelope<Value>, serde_json::Error> {
    let data = envelope
        .data
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PageEnvelope {
        data,
        total: envelope.total,
        page: envelope.page,
        total_pages: envelope.total_pages,
    })
}

fn decode<T: DeserializeOwned>(key: CacheKey, entry: Entry) -> Result<CachedPage<T>, CacheError> {
    let data = entry
        .envelope
        .data
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| CacheError::Decode(e.to_string()))?;

    Ok(CachedPage {
        resource_key: key.resource,
        page: key.page,
        filter_signature: key.filter_signature,
        envelope: PageEnvelope {
            data,
            total: entry.envelope.total,
            page: entry.envelope.page,
            total_pages: entry.envelope.total_pages,
        },
        fetched_at: entry.fetched_at,
    })
}

fn forget_persisted(database: Option<&Arc<Mutex<Database>>>, keys: &[CacheKey]) {
    let Some(database) = database else {
        return;
    };
    if keys.is_empty() {
        return;
    }

    let db = lock(database);
    for key in keys {
        if let Err(e) = db.delete_page(&key.resource, key.page, &key.filter_signature) {
            warn!(resource = %key.resource, error = %e, "failed to drop persisted page");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
