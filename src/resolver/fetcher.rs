use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use tracing::instrument;

use super::normalize::{normalize_title, plausible_duration};
use super::types::{Candidate, FailureReason, NormalizedTrack};
use crate::ports::search::{SearchError, SearchFilter, SearchHit, TargetSearch};

pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Video type YouTube Music assigns to catalog audio tracks
const OFFICIAL_AUDIO_VIDEO_TYPE: &str = "MUSIC_VIDEO_TYPE_ATV";

/// Title qualifiers that mark a performance other than the studio recording
const NON_OFFICIAL_MARKERS: &[&str] = &["live", "cover", "karaoke", "tribute", "concert"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("rate limited by the search service")]
    RateLimited {
        /// Minimum wait the service asked for, if it said
        retry_after: Option<Duration>,
    },
    #[error("search service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("search timed out")]
    Timeout,
}

impl From<SearchError> for FetchError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::RateLimited { retry_after } => FetchError::RateLimited { retry_after },
            SearchError::Status(429) => FetchError::RateLimited { retry_after: None },
            SearchError::Timeout => FetchError::Timeout,
            other => FetchError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<&FetchError> for FailureReason {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::RateLimited { .. } => FailureReason::RateLimited,
            FetchError::UpstreamUnavailable(_) => FailureReason::UpstreamUnavailable,
            FetchError::Timeout => FailureReason::Timeout,
        }
    }
}

/// Parse a display duration like "3:54" or "1:02:03" into seconds
pub fn parse_duration_text(text: &str) -> Option<u32> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    let mut seconds: u32 = 0;
    for part in parts {
        let value: u32 = part.trim().parse().ok()?;
        seconds = seconds.checked_mul(60)?.checked_add(value)?;
    }
    Some(seconds)
}

fn is_official_audio(hit: &SearchHit, filter: SearchFilter, title: &str) -> bool {
    let catalog_audio = match hit.video_type.as_deref() {
        Some(video_type) => video_type == OFFICIAL_AUDIO_VIDEO_TYPE,
        None => filter != SearchFilter::Videos,
    };
    if !catalog_audio {
        return false;
    }

    let parts = normalize_title(title);
    !parts
        .qualifiers
        .iter()
        .flat_map(|q| q.split_whitespace())
        .any(|token| NON_OFFICIAL_MARKERS.contains(&token))
}

fn hit_to_candidate(hit: SearchHit, filter: SearchFilter) -> Option<Candidate> {
    let target_id = match filter {
        // The playlist is what plays the album; the page id is a fallback
        SearchFilter::Albums => hit.audio_playlist_id.clone().or_else(|| hit.browse_id.clone()),
        SearchFilter::Songs | SearchFilter::Videos => hit.video_id.clone(),
    }
    .filter(|id| !id.trim().is_empty())?;
    let title = hit.title.clone().filter(|t| !t.trim().is_empty())?;

    let duration_secs = hit
        .duration_seconds
        .or_else(|| hit.duration.as_deref().and_then(parse_duration_text));

    Some(Candidate {
        is_official_audio: is_official_audio(&hit, filter, &title),
        target_id,
        title,
        artists: hit.artists.into_iter().map(|a| a.name).collect(),
        album: hit.album,
        duration_secs: plausible_duration(duration_secs),
    })
}

/// Issues one search per call against the target service.
///
/// Retries are the caller's concern; this only maps hits and errors.
pub struct CandidateFetcher {
    search: Arc<dyn TargetSearch>,
    rate_limiter: Option<Arc<DirectRateLimiter>>,
    max_candidates: usize,
}

impl CandidateFetcher {
    pub fn new(search: Arc<dyn TargetSearch>, max_candidates: usize) -> Self {
        Self {
            search,
            rate_limiter: None,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Share one request budget across every resolution using this fetcher
    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.rate_limiter = NonZeroU32::new(requests_per_minute)
            .map(|rpm| Arc::new(RateLimiter::direct(Quota::per_minute(rpm))));
        self
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Title plus primary artist only; secondary artists over-constrain search
    pub fn build_query(track: &NormalizedTrack) -> String {
        match track.primary_artist() {
            Some(artist) => format!("{} {}", artist, track.title),
            None => track.title.clone(),
        }
    }

    #[instrument(skip(self, track), fields(title = %track.title))]
    pub async fn fetch(
        &self,
        track: &NormalizedTrack,
        filter: SearchFilter,
    ) -> Result<Vec<Candidate>, FetchError> {
        let query = Self::build_query(track);

        if let Some(rate_limiter) = &self.rate_limiter {
            tracing::debug!("Waiting for search rate limiter");
            rate_limiter.until_ready().await;
        }

        tracing::debug!(query = %query, "Searching target catalog");
        let hits = self
            .search
            .search(&query, filter, self.max_candidates)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, query = %query, "Search failed");
                FetchError::from(e)
            })?;

        let total = hits.len();
        let candidates: Vec<Candidate> = hits
            .into_iter()
            .filter_map(|hit| {
                let candidate = hit_to_candidate(hit.clone(), filter);
                if candidate.is_none() {
                    tracing::debug!(hit = ?hit, "Dropping search hit without id or title");
                }
                candidate
            })
            .take(self.max_candidates)
            .collect();

        tracing::debug!(
            hits = total,
            candidates = candidates.len(),
            "Search complete"
        );

        Ok(candidates)
    }
}
