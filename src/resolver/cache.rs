//! Resolution cache with single-flight semantics.
//!
//! Concurrent requests for the same key share one resolver run. The resolver
//! runs as its own task, so a caller that gives up waiting does not cancel it
//! for everyone else, and its result still lands in the cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::types::{FailureReason, NormalizedTrack, ResolutionResult, SourceAlbum, SourceTrack};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheKey {
    SourceId { id: String },
    /// Used when the source service gave no id. Qualifiers are part of the
    /// key since "Song (Live)" and "Song" resolve differently.
    Metadata {
        title: String,
        #[serde(default)]
        qualifiers: BTreeSet<String>,
        artists: Vec<String>,
    },
    /// Album looked up without a source id
    Album {
        title: String,
        #[serde(default)]
        qualifiers: BTreeSet<String>,
        artists: Vec<String>,
    },
}

impl CacheKey {
    pub fn for_track(track: &SourceTrack, normalized: &NormalizedTrack) -> Self {
        match track.source_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => CacheKey::SourceId { id: id.to_string() },
            _ => CacheKey::Metadata {
                title: normalized.title.clone(),
                qualifiers: normalized.qualifiers.clone(),
                artists: normalized.artists.clone(),
            },
        }
    }

    pub fn for_album(album: &SourceAlbum, normalized: &NormalizedTrack) -> Self {
        match album.source_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => CacheKey::SourceId { id: id.to_string() },
            _ => CacheKey::Album {
                title: normalized.title.clone(),
                qualifiers: normalized.qualifiers.clone(),
                artists: normalized.artists.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub ttl_resolved: Duration,
    pub ttl_not_found: Duration,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_resolved: Duration::from_secs(24 * 60 * 60),
            ttl_not_found: Duration::from_secs(60 * 60),
            capacity: 10_000,
        }
    }
}

impl CacheSettings {
    fn ttl_for(&self, result: &ResolutionResult) -> Option<Duration> {
        match result {
            ResolutionResult::Resolved { .. } => Some(self.ttl_resolved),
            ResolutionResult::NotFound => Some(self.ttl_not_found),
            ResolutionResult::Ambiguous { .. } | ResolutionResult::Failed { .. } => None,
        }
    }
}

/// A cache entry as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub key: CacheKey,
    pub result: ResolutionResult,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheEntry {
    result: ResolutionResult,
    expires_at: Instant,
    last_used: u64,
}

type InFlight = Shared<BoxFuture<'static, ResolutionResult>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// last_used tick -> key, oldest first
    recency: BTreeMap<u64, CacheKey>,
    in_flight: HashMap<CacheKey, InFlight>,
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_used);
        Some(entry)
    }

    /// Fresh entries are touched, expired ones dropped
    fn lookup(&mut self, key: &CacheKey, now: Instant) -> Option<ResolutionResult> {
        if self.entries.get(key)?.expires_at <= now {
            tracing::debug!(key = ?key, "Cache entry expired");
            self.remove(key);
            return None;
        }

        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_used);
        entry.last_used = tick;
        self.recency.insert(tick, key.clone());
        Some(entry.result.clone())
    }

    fn store(
        &mut self,
        key: CacheKey,
        result: ResolutionResult,
        expires_at: Instant,
        capacity: usize,
    ) {
        self.remove(&key);
        let tick = self.next_tick();
        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                result,
                expires_at,
                last_used: tick,
            },
        );

        while self.entries.len() > capacity.max(1) {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            tracing::debug!(key = ?oldest, "Evicting least recently used cache entry");
            self.entries.remove(&oldest);
        }
    }
}

/// Shared handle; clones see the same entries.
#[derive(Clone)]
pub struct ResolutionCache {
    state: Arc<Mutex<CacheState>>,
    settings: CacheSettings,
}

impl ResolutionCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // No invariant spans a panic point, so a poisoned state is still usable
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolutionResult> {
        self.lock().lookup(key, Instant::now())
    }

    /// Store a result if its variant is cacheable. Returns whether it was stored.
    pub fn insert(&self, key: CacheKey, result: ResolutionResult) -> bool {
        let Some(ttl) = self.settings.ttl_for(&result) else {
            return false;
        };
        let expires_at = Instant::now() + ttl;
        self.lock()
            .store(key, result, expires_at, self.settings.capacity);
        true
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a finished resolution and release its in-flight slot in one step
    fn complete(&self, key: &CacheKey, result: &ResolutionResult) {
        let mut state = self.lock();
        state.in_flight.remove(key);

        match self.settings.ttl_for(result) {
            Some(ttl) => {
                tracing::debug!(key = ?key, ttl = ?ttl, "Caching resolution");
                state.store(
                    key.clone(),
                    result.clone(),
                    Instant::now() + ttl,
                    self.settings.capacity,
                );
            }
            None => tracing::debug!(key = ?key, result = ?result, "Not caching transient resolution"),
        }
    }

    /// Return the cached result for `key`, or run `resolver` once for all
    /// concurrent callers asking for it.
    pub async fn get_or_resolve<F, Fut>(&self, key: CacheKey, resolver: F) -> ResolutionResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResolutionResult> + Send + 'static,
    {
        let in_flight = {
            let mut state = self.lock();

            if let Some(hit) = state.lookup(&key, Instant::now()) {
                tracing::debug!(key = ?key, "Cache hit");
                return hit;
            }

            match state.in_flight.get(&key) {
                Some(in_flight) => {
                    tracing::debug!(key = ?key, "Joining in-flight resolution");
                    in_flight.clone()
                }
                None => {
                    tracing::debug!(key = ?key, "Cache miss, starting resolution");
                    let in_flight = self.spawn_resolution(key.clone(), resolver());
                    state.in_flight.insert(key, in_flight.clone());
                    in_flight
                }
            }
        };

        in_flight.await
    }

    fn spawn_resolution<Fut>(&self, key: CacheKey, resolution: Fut) -> InFlight
    where
        Fut: Future<Output = ResolutionResult> + Send + 'static,
    {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(resolution)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!(key = ?key, "Resolver panicked");
                    ResolutionResult::failed(FailureReason::Internal)
                });
            cache.complete(&key, &result);
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                tracing::error!(error = %e, "Resolver task did not finish");
                ResolutionResult::failed(FailureReason::Internal)
            })
        }
        .boxed()
        .shared()
    }

    /// Unexpired entries, least recently used first
    pub fn snapshot(&self) -> Vec<PersistedEntry> {
        let state = self.lock();
        let now = Instant::now();
        let wall_now = Utc::now();

        let mut entries: Vec<(&CacheKey, &CacheEntry)> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .collect();
        entries.sort_by_key(|(_, entry)| entry.last_used);

        entries
            .into_iter()
            .filter_map(|(key, entry)| {
                let remaining =
                    chrono::Duration::from_std(entry.expires_at.saturating_duration_since(now))
                        .ok()?;
                Some(PersistedEntry {
                    key: key.clone(),
                    result: entry.result.clone(),
                    expires_at: wall_now + remaining,
                })
            })
            .collect()
    }

    /// Load persisted entries, skipping expired and transient ones.
    /// Returns how many were restored.
    pub fn restore(&self, entries: Vec<PersistedEntry>) -> usize {
        let now = Instant::now();
        let wall_now = Utc::now();
        let mut state = self.lock();
        let mut restored = 0;

        for entry in entries {
            if !entry.result.is_cacheable() {
                continue;
            }
            let Ok(remaining) = (entry.expires_at - wall_now).to_std() else {
                continue;
            };
            if remaining.is_zero() {
                continue;
            }
            state.store(
                entry.key,
                entry.result,
                now + remaining,
                self.settings.capacity,
            );
            restored += 1;
        }

        restored
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        let contents =
            serde_json::to_string_pretty(&snapshot).wrap_err("Failed to serialize cache")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write cache file: {}", path.display()))?;
        tracing::info!(entries = snapshot.len(), path = %path.display(), "Saved resolution cache");
        Ok(())
    }

    /// A missing file is an empty cache
    pub fn load_from(&self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read cache file: {}", path.display()))?;
        let entries: Vec<PersistedEntry> = serde_json::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse cache file: {}", path.display()))?;
        let restored = self.restore(entries);
        tracing::info!(restored, path = %path.display(), "Loaded resolution cache");
        Ok(restored)
    }
}
