use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::ports::search::{SearchArtist, SearchError, SearchFilter, SearchHit, TargetSearch};
use crate::resolver::types::{Candidate, SourceTrack};

pub fn source_track(title: &str, artists: &[&str]) -> SourceTrack {
    SourceTrack::new(title, artists.iter().map(|a| a.to_string()).collect())
}

pub fn candidate(
    target_id: &str,
    title: &str,
    artists: &[&str],
    duration_secs: Option<u32>,
) -> Candidate {
    Candidate {
        target_id: target_id.to_string(),
        title: title.to_string(),
        artists: artists.iter().map(|a| a.to_string()).collect(),
        album: None,
        duration_secs,
        is_official_audio: true,
    }
}

pub fn song_hit(video_id: &str, title: &str, artists: &[&str], duration_secs: u32) -> SearchHit {
    SearchHit {
        video_id: Some(video_id.to_string()),
        title: Some(title.to_string()),
        artists: artists
            .iter()
            .map(|name| SearchArtist {
                name: name.to_string(),
                id: None,
            })
            .collect(),
        album: None,
        duration: None,
        duration_seconds: Some(duration_secs),
        video_type: None,
        browse_id: None,
        audio_playlist_id: None,
    }
}

pub fn album_hit(browse_id: &str, playlist_id: &str, title: &str, artists: &[&str]) -> SearchHit {
    SearchHit {
        video_id: None,
        browse_id: Some(browse_id.to_string()),
        audio_playlist_id: Some(playlist_id.to_string()),
        duration_seconds: None,
        ..song_hit("", title, artists, 0)
    }
}

/// Scripted search service that counts calls and can simulate latency
#[derive(Default)]
pub struct FakeSearch {
    songs: Vec<SearchHit>,
    videos: Vec<SearchHit>,
    albums: Vec<SearchHit>,
    delay: Duration,
    calls: AtomicUsize,
    queries: Mutex<Vec<(String, SearchFilter)>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_songs(mut self, hits: Vec<SearchHit>) -> Self {
        self.songs = hits;
        self
    }

    pub fn with_videos(mut self, hits: Vec<SearchHit>) -> Self {
        self.videos = hits;
        self
    }

    pub fn with_albums(mut self, hits: Vec<SearchHit>) -> Self {
        self.albums = hits;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<(String, SearchFilter)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TargetSearch for FakeSearch {
    async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), filter));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let hits = match filter {
            SearchFilter::Songs => &self.songs,
            SearchFilter::Videos => &self.videos,
            SearchFilter::Albums => &self.albums,
        };
        Ok(hits.iter().take(limit).cloned().collect())
    }
}
