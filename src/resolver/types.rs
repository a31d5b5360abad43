use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A track as it arrives from the source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTrack {
    pub title: String,
    /// Primary artist first.
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    /// Opaque id on the source service. `None` (or empty) falls back to a
    /// metadata-derived cache key.
    #[serde(default)]
    pub source_id: Option<String>,
}

impl SourceTrack {
    pub fn new(title: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            title: title.into(),
            artists,
            album: None,
            duration_secs: None,
            source_id: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration_secs(mut self, duration_secs: u32) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// An album as it arrives from the source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAlbum {
    pub title: String,
    /// Primary artist first.
    pub artists: Vec<String>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl SourceAlbum {
    pub fn new(title: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            title: title.into(),
            artists,
            source_id: None,
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Albums are matched like a track without a duration
    pub fn as_track(&self) -> SourceTrack {
        SourceTrack {
            title: self.title.clone(),
            artists: self.artists.clone(),
            album: None,
            duration_secs: None,
            source_id: self.source_id.clone(),
        }
    }
}

/// Normalized track data after preprocessing
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTrack {
    /// Cleaned title without bracketed qualifiers or featuring clauses
    pub title: String,
    /// Normalized bracketed qualifiers, e.g. "remastered 2011", "live"
    pub qualifiers: BTreeSet<String>,
    /// All artists, primary first, deduplicated
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Plausible duration only; implausible metadata is dropped
    pub duration_secs: Option<u32>,
}

impl NormalizedTrack {
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }
}

/// One search hit on the target service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub target_id: String,
    pub title: String,
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    /// Catalog audio rather than a live, cover or user upload.
    #[serde(default)]
    pub is_official_audio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub title: f64,
    pub artist: f64,
    pub duration: f64,
    pub album_bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// Overall score from 0.0 to 1.0
    pub score: f64,
    pub subscores: SubScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("rate limited by the search service")]
    RateLimited,
    #[error("search service unavailable")]
    UpstreamUnavailable,
    #[error("timed out")]
    Timeout,
    #[error("track metadata too degenerate to match")]
    Malformed,
    #[error("resolver task did not complete")]
    Internal,
}

/// Outcome of resolving one source track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionResult {
    Resolved { target_id: String, score: f64 },
    /// Best candidates were too close to call, ranked best first.
    Ambiguous { top_candidates: Vec<ScoredCandidate> },
    NotFound,
    Failed { reason: FailureReason },
}

impl ResolutionResult {
    pub fn failed(reason: FailureReason) -> Self {
        Self::Failed { reason }
    }

    /// Only settled decisions are worth remembering; ambiguity and failures
    /// must be retried on the next call.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Resolved { .. } | Self::NotFound)
    }
}
