use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::StreamExt;
use tracing::instrument;

use super::cache::{CacheKey, ResolutionCache};
use super::fetcher::{CandidateFetcher, FetchError};
use super::normalize::normalize_track;
use super::scoring::ScoringEngine;
use super::types::{
    Candidate, FailureReason, NormalizedTrack, ResolutionResult, SourceAlbum, SourceTrack,
};
use crate::ports::search::SearchFilter;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    /// Budget for one `resolve` call, cache wait and retries included
    pub timeout: Duration,
    /// Search attempts per filter, first try included
    pub max_attempts: usize,
    pub retry_min_delay: Duration,
    pub retry_max_delay: Duration,
    /// Search videos when no song matches
    pub video_fallback: bool,
    /// Parallel resolutions in `resolve_all`
    pub concurrency: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_min_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(2),
            video_fallback: true,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Track,
    Album,
}

/// The uncached fetch -> score path, owned by the cache's resolver task
#[derive(Clone)]
struct Pipeline {
    fetcher: Arc<CandidateFetcher>,
    scoring: Arc<ScoringEngine>,
    settings: ResolverSettings,
}

impl Pipeline {
    /// Exponential backoff with jitter; a server-provided `Retry-After`
    /// raises the next delay to at least that long
    async fn fetch_with_retry(
        &self,
        track: &NormalizedTrack,
        filter: SearchFilter,
    ) -> Result<Vec<Candidate>, FetchError> {
        let mut delays = ExponentialBuilder::default()
            .with_min_delay(self.settings.retry_min_delay)
            .with_max_delay(self.settings.retry_max_delay)
            .with_max_times(self.settings.max_attempts.saturating_sub(1))
            .with_jitter()
            .build();

        loop {
            let error = match self.fetcher.fetch(track, filter).await {
                Ok(candidates) => return Ok(candidates),
                Err(error) => error,
            };
            let Some(backoff) = delays.next() else {
                return Err(error);
            };
            let delay = match &error {
                FetchError::RateLimited {
                    retry_after: Some(retry_after),
                } => backoff.max(*retry_after),
                _ => backoff,
            };

            tracing::warn!(
                error = %error,
                delay = ?delay,
                filter = %filter,
                "Search failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn run(self, track: NormalizedTrack, lookup: Lookup) -> ResolutionResult {
        match lookup {
            Lookup::Track => self.run_track(track).await,
            Lookup::Album => self.run_album(track).await,
        }
    }

    async fn run_album(&self, album: NormalizedTrack) -> ResolutionResult {
        match self.fetch_with_retry(&album, SearchFilter::Albums).await {
            Ok(candidates) => self.scoring.decide(&album, &candidates),
            Err(e) => {
                tracing::error!(error = %e, title = %album.title, "Giving up on album search");
                ResolutionResult::failed(FailureReason::from(&e))
            }
        }
    }

    async fn run_track(&self, track: NormalizedTrack) -> ResolutionResult {
        let songs = match self.fetch_with_retry(&track, SearchFilter::Songs).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, title = %track.title, "Giving up on song search");
                return ResolutionResult::failed(FailureReason::from(&e));
            }
        };

        let decision = self.scoring.decide(&track, &songs);
        if decision != ResolutionResult::NotFound || !self.settings.video_fallback {
            return decision;
        }

        tracing::debug!(title = %track.title, "No song matched, searching videos");
        match self.fetch_with_retry(&track, SearchFilter::Videos).await {
            Ok(videos) => self.scoring.decide(&track, &videos),
            Err(e) => {
                tracing::error!(error = %e, title = %track.title, "Giving up on video search");
                ResolutionResult::failed(FailureReason::from(&e))
            }
        }
    }
}

/// Entry point: resolves source tracks to target catalog items.
///
/// Cheap to share behind an `Arc`; every resolution goes through the same
/// cache and search rate limiter.
pub struct TrackResolver {
    pipeline: Pipeline,
    cache: ResolutionCache,
}

impl TrackResolver {
    pub fn new(
        fetcher: CandidateFetcher,
        scoring: ScoringEngine,
        cache: ResolutionCache,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                fetcher: Arc::new(fetcher),
                scoring: Arc::new(scoring),
                settings,
            },
            cache,
        }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.pipeline.settings
    }

    pub async fn resolve(&self, track: &SourceTrack) -> ResolutionResult {
        self.resolve_with_timeout(track, self.pipeline.settings.timeout)
            .await
    }

    #[instrument(skip(self, track), fields(title = %track.title))]
    pub async fn resolve_with_timeout(
        &self,
        track: &SourceTrack,
        budget: Duration,
    ) -> ResolutionResult {
        let normalized = normalize_track(track);
        if normalized.title.is_empty() || normalized.artists.is_empty() {
            tracing::warn!(track = ?track, "Track metadata too degenerate to match");
            return ResolutionResult::failed(FailureReason::Malformed);
        }

        let key = CacheKey::for_track(track, &normalized);
        self.resolve_keyed(key, normalized, Lookup::Track, budget)
            .await
    }

    /// Resolve an album to the target catalog's playlist for it
    #[instrument(skip(self, album), fields(title = %album.title))]
    pub async fn resolve_album(&self, album: &SourceAlbum) -> ResolutionResult {
        let normalized = normalize_track(&album.as_track());
        if normalized.title.is_empty() || normalized.artists.is_empty() {
            tracing::warn!(album = ?album, "Album metadata too degenerate to match");
            return ResolutionResult::failed(FailureReason::Malformed);
        }

        let key = CacheKey::for_album(album, &normalized);
        self.resolve_keyed(key, normalized, Lookup::Album, self.pipeline.settings.timeout)
            .await
    }

    async fn resolve_keyed(
        &self,
        key: CacheKey,
        normalized: NormalizedTrack,
        lookup: Lookup,
        budget: Duration,
    ) -> ResolutionResult {
        let pipeline = self.pipeline.clone();
        let resolution = self
            .cache
            .get_or_resolve(key, move || pipeline.run(normalized, lookup));

        let result = match tokio::time::timeout(budget, resolution).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(budget = ?budget, "Resolution timed out");
                ResolutionResult::failed(FailureReason::Timeout)
            }
        };

        match &result {
            ResolutionResult::Resolved { target_id, score } => {
                tracing::info!(target_id = %target_id, score, lookup = ?lookup, "Resolved")
            }
            ResolutionResult::Ambiguous { top_candidates } => {
                tracing::info!(candidates = top_candidates.len(), "Ambiguous match")
            }
            ResolutionResult::NotFound => tracing::info!(lookup = ?lookup, "No match found"),
            ResolutionResult::Failed { reason } => {
                tracing::warn!(reason = %reason, "Resolution failed")
            }
        }

        result
    }

    /// Resolve many tracks (e.g. a playlist), results in input order
    pub async fn resolve_all(&self, tracks: &[SourceTrack]) -> Vec<ResolutionResult> {
        tracing::info!(tracks = tracks.len(), "Resolving track list");
        futures::stream::iter(tracks)
            .map(|track| self.resolve(track))
            .buffered(self.pipeline.settings.concurrency.max(1))
            .collect()
            .await
    }
}
