use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which shelf of the target catalog to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFilter {
    /// Catalog songs
    Songs,
    /// Music videos and user uploads
    Videos,
    /// Catalog albums
    Albums,
}

impl SearchFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchFilter::Songs => "songs",
            SearchFilter::Videos => "videos",
            SearchFilter::Albums => "albums",
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchArtist {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Decoupled representation of a raw search hit from the target service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(default, alias = "id")]
    pub video_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artists: Vec<SearchArtist>,
    #[serde(default)]
    pub album: Option<String>,
    /// Display duration, e.g. "3:54"
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, alias = "duration_seconds")]
    pub duration_seconds: Option<u32>,
    /// e.g. "MUSIC_VIDEO_TYPE_ATV" for catalog audio
    #[serde(default)]
    pub video_type: Option<String>,
    /// Album hits: the album page id
    #[serde(default)]
    pub browse_id: Option<String>,
    /// Album hits: the playable playlist holding the album's tracks
    #[serde(default)]
    pub audio_playlist_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("search rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("search returned HTTP {0}")]
    Status(u16),
    #[error("search request timed out")]
    Timeout,
    #[error("search transport error: {0}")]
    Transport(String),
    #[error("failed to decode search response: {0}")]
    Decode(String),
}

/// Port trait wrapping the target service's search capability.
///
/// Implementations live in `services::http_search` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TargetSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}
