use std::fmt;
use std::sync::LazyLock;

use color_eyre::eyre::{Result, eyre};
use regex::Regex;
use serde::{Deserialize, Serialize};

static SHARE_URL: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"^https?://open\.spotify\.com/(?:intl-[A-Za-z-]+/)?(track|album)/([A-Za-z0-9]+)(?:[/?#].*)?$",
    )
});

static URI: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^spotify:(track|album):([A-Za-z0-9]+)$"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotifyKind {
    Track,
    Album,
}

impl SpotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotifyKind::Track => "track",
            SpotifyKind::Album => "album",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "track" => Some(SpotifyKind::Track),
            "album" => Some(SpotifyKind::Album),
            _ => None,
        }
    }
}

impl fmt::Display for SpotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Spotify share link or URI, e.g. `https://open.spotify.com/track/<id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpotifyLink {
    pub kind: SpotifyKind,
    pub id: String,
}

impl SpotifyLink {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        for pattern in [&*SHARE_URL, &*URI] {
            let pattern = pattern
                .as_ref()
                .map_err(|e| eyre!("Invalid Spotify link pattern: {}", e))?;
            if let Some(captures) = pattern.captures(input)
                && let Some(kind) = SpotifyKind::from_segment(&captures[1])
            {
                return Ok(Self {
                    kind,
                    id: captures[2].to_string(),
                });
            }
        }
        Err(eyre!("Not a Spotify track or album link: {}", input))
    }

    /// Canonical `spotify:<kind>:<id>`, used as the source id of a track or album
    pub fn source_id(&self) -> String {
        format!("spotify:{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for SpotifyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://open.spotify.com/{}/{}", self.kind, self.id)
    }
}

pub fn youtube_music_url(target_id: &str) -> String {
    format!("https://music.youtube.com/watch?v={}", target_id)
}

/// Albums resolve to the playlist that plays them
pub fn youtube_music_playlist_url(playlist_id: &str) -> String {
    format!("https://music.youtube.com/playlist?list={}", playlist_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_share_urls() {
        let link =
            SpotifyLink::parse("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv?si=abc123")
                .unwrap();
        assert_eq!(link.kind, SpotifyKind::Track);
        assert_eq!(link.id, "4u7EnebtmKWzUH433cf5Qv");
        assert_eq!(link.source_id(), "spotify:track:4u7EnebtmKWzUH433cf5Qv");

        let intl =
            SpotifyLink::parse("https://open.spotify.com/intl-de/album/1GbtB4zTqAsyfZEsm1RZfx")
                .unwrap();
        assert_eq!(intl.kind, SpotifyKind::Album);
        assert_eq!(intl.id, "1GbtB4zTqAsyfZEsm1RZfx");
    }

    #[test]
    fn test_parses_uris() {
        let link = SpotifyLink::parse("spotify:album:1GbtB4zTqAsyfZEsm1RZfx").unwrap();
        assert_eq!(link.kind, SpotifyKind::Album);
        assert_eq!(
            link.to_string(),
            "https://open.spotify.com/album/1GbtB4zTqAsyfZEsm1RZfx"
        );
    }

    #[test]
    fn test_rejects_other_links() {
        assert!(SpotifyLink::parse("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF").is_err());
        assert!(SpotifyLink::parse("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M").is_err());
        assert!(SpotifyLink::parse("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M").is_err());
        assert!(SpotifyLink::parse("https://example.com/track/abc").is_err());
        assert!(SpotifyLink::parse("spotify:track:").is_err());
        assert!(SpotifyLink::parse("").is_err());
    }

    #[test]
    fn test_youtube_music_url() {
        assert_eq!(
            youtube_music_url("fJ9rUzIMcZQ"),
            "https://music.youtube.com/watch?v=fJ9rUzIMcZQ"
        );
        assert_eq!(
            youtube_music_playlist_url("OLAK5uy_xyz"),
            "https://music.youtube.com/playlist?list=OLAK5uy_xyz"
        );
    }
}
