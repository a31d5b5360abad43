//! Metadata normalization shared by source tracks and target candidates.
//!
//! Handles the usual catalog noise: full-width and accented characters,
//! bracketed version qualifiers, featuring artists hidden in titles and
//! "A & B" artist strings.

use std::collections::BTreeSet;

use unaccent::unaccent;
use unicode_normalization::UnicodeNormalization;

use super::types::{NormalizedTrack, SourceTrack};

/// Durations outside this range are treated as missing metadata.
const MIN_PLAUSIBLE_SECS: u32 = 10;
const MAX_PLAUSIBLE_SECS: u32 = 3 * 60 * 60;

/// Words that introduce further artists inside a title or artist string
const FEATURING_MARKERS: &[&str] = &["feat", "feat.", "ft", "ft.", "featuring", "with"];

/// Separators between artists in a combined artist string
const ARTIST_SEPARATORS: &[&str] = &["&", "feat", "feat.", "ft", "ft.", "featuring", "vs", "vs."];

/// Collaboration marker ("A x B"); only a separator when it is the sole one,
/// so names like "Malcolm X" survive
const COLLAB_SEPARATOR: &str = "x";

/// Dash suffixes that mark a version rather than part of the title,
/// e.g. "Song - Remastered 2011"
const VERSION_MARKERS: &[&str] = &[
    "remaster",
    "remix",
    "live",
    "acoustic",
    "unplugged",
    "radio edit",
    "single version",
    "album version",
    "extended",
    "instrumental",
    "karaoke",
    "demo",
    "mono",
    "stereo",
    "edit",
];

/// A title split into its comparable parts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleParts {
    pub title: String,
    pub qualifiers: BTreeSet<String>,
    pub featured_artists: Vec<String>,
}

/// Normalize a string for comparison
///
/// Applies: NFKC normalization, diacritic folding, lowercase, punctuation
/// removal, whitespace collapse
pub fn normalize_string(s: &str) -> String {
    let normalized: String = s.nfkc().collect();

    unaccent(&normalized)
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                Some(c)
            } else if c == '\'' || c == '’' {
                // don't -> dont
                None
            } else {
                Some(' ')
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract content from parentheses and brackets
fn extract_parenthetical_content(s: &str) -> (String, Vec<String>) {
    let mut result = String::new();
    let mut extracted = Vec::new();
    let mut current = String::new();
    let mut closing: Option<char> = None;

    for c in s.chars() {
        match closing {
            None => match c {
                '(' => closing = Some(')'),
                '[' => closing = Some(']'),
                '【' => closing = Some('】'),
                '「' => closing = Some('」'),
                _ => result.push(c),
            },
            Some(close) if c == close => {
                if !current.trim().is_empty() {
                    extracted.push(current.trim().to_string());
                }
                current.clear();
                closing = None;
            }
            Some(_) => current.push(c),
        }
    }

    // Unterminated bracket: keep its text as part of the title
    if !current.is_empty() {
        result.push(' ');
        result.push_str(&current);
    }

    (result.trim().to_string(), extracted)
}

fn is_version_marker(normalized: &str) -> bool {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    VERSION_MARKERS.iter().any(|marker| {
        let marker_tokens: Vec<&str> = marker.split_whitespace().collect();
        tokens
            .windows(marker_tokens.len())
            .any(|window| {
                window
                    .iter()
                    .zip(&marker_tokens)
                    .all(|(token, marker)| token.starts_with(marker))
            })
    })
}

/// Split "Song - Remastered 2011" into the title and a version qualifier
fn split_version_suffix(title: &str) -> (String, Option<String>) {
    if let Some((head, tail)) = title.rsplit_once(" - ") {
        let tail = normalize_string(tail);
        if !head.trim().is_empty() && is_version_marker(&tail) {
            return (head.trim().to_string(), Some(tail));
        }
    }
    (title.to_string(), None)
}

fn tokenize_artist_string(s: &str) -> Vec<String> {
    s.replace('&', " & ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn flush(current: &mut Vec<String>, artists: &mut Vec<String>) {
    let artist = normalize_artist(&current.join(" "));
    if !artist.is_empty() {
        artists.push(artist);
    }
    current.clear();
}

/// Split a combined artist string ("A feat. B & C") into normalized artists
pub fn split_artists(s: &str) -> Vec<String> {
    let mut artists = Vec::new();
    let mut current: Vec<String> = Vec::new();

    let tokens = tokenize_artist_string(s);
    let has_other_separator = tokens.iter().any(|token| {
        let lower = token.to_lowercase();
        lower.ends_with(',') || ARTIST_SEPARATORS.contains(&lower.as_str())
    });
    let last = tokens.len().saturating_sub(1);

    for (idx, token) in tokens.into_iter().enumerate() {
        let lower = token.to_lowercase();
        let trimmed = lower.trim_end_matches(',');
        let collab = trimmed == COLLAB_SEPARATOR && !has_other_separator && idx < last;
        if (ARTIST_SEPARATORS.contains(&trimmed) || collab) && !current.is_empty() {
            flush(&mut current, &mut artists);
        } else if lower.ends_with(',') {
            current.push(token.trim_end_matches(',').to_string());
            flush(&mut current, &mut artists);
        } else {
            current.push(token);
        }
    }
    flush(&mut current, &mut artists);

    artists
}

/// Remove leading "the " from a normalized artist name
fn normalize_artist(s: &str) -> String {
    let normalized = normalize_string(s);
    match normalized.strip_prefix("the ") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => normalized,
    }
}

/// If `s` starts with a featuring marker, return the artist list after it
fn featuring_clause(s: &str) -> Option<&str> {
    let lower = s.to_lowercase();
    FEATURING_MARKERS.iter().find_map(|marker| {
        let rest = lower.strip_prefix(marker)?;
        if rest.starts_with(char::is_whitespace) {
            s.get(marker.len()..).map(str::trim)
        } else {
            None
        }
    })
}

/// Cut an inline "Song feat. Guest" clause off a title
fn split_inline_featuring(title: &str) -> (String, Vec<String>) {
    let tokens: Vec<&str> = title.split_whitespace().collect();
    let position = tokens.iter().position(|token| {
        let lower = token.to_lowercase();
        FEATURING_MARKERS
            .iter()
            .filter(|marker| **marker != "with")
            .any(|marker| lower == *marker)
    });

    match position {
        Some(idx) if idx > 0 => (
            tokens[..idx].join(" "),
            split_artists(&tokens[idx + 1..].join(" ")),
        ),
        _ => (title.to_string(), Vec::new()),
    }
}

/// Normalize a raw title into its base title, qualifiers and featured artists
pub fn normalize_title(raw: &str) -> TitleParts {
    let (without_parens, parentheticals) = extract_parenthetical_content(raw);
    let (without_suffix, suffix_qualifier) = split_version_suffix(&without_parens);
    let (base, mut featured_artists) = split_inline_featuring(&without_suffix);

    let mut qualifiers = BTreeSet::new();
    for content in &parentheticals {
        if let Some(artists) = featuring_clause(content) {
            featured_artists.extend(split_artists(artists));
            continue;
        }
        let qualifier = normalize_string(content);
        if !qualifier.is_empty() {
            qualifiers.insert(qualifier);
        }
    }
    qualifiers.extend(suffix_qualifier);

    TitleParts {
        title: normalize_string(&base),
        qualifiers,
        featured_artists,
    }
}

/// Normalize an ordered artist list, keeping the primary artist first
pub fn normalize_artists<S: AsRef<str>>(artists: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for artist in artists.iter().flat_map(|a| split_artists(a.as_ref())) {
        if !normalized.contains(&artist) {
            normalized.push(artist);
        }
    }
    normalized
}

/// Normalize an album name, ignoring edition qualifiers
pub fn normalize_album(album: Option<&str>) -> Option<String> {
    let (without_parens, _) = extract_parenthetical_content(album?);
    let normalized = normalize_string(&without_parens);
    (!normalized.is_empty()).then_some(normalized)
}

pub fn plausible_duration(duration_secs: Option<u32>) -> Option<u32> {
    duration_secs.filter(|secs| (MIN_PLAUSIBLE_SECS..=MAX_PLAUSIBLE_SECS).contains(secs))
}

/// Normalize a track for matching
pub fn normalize_track(track: &SourceTrack) -> NormalizedTrack {
    let parts = normalize_title(&track.title);

    let mut artists = normalize_artists(&track.artists);
    for artist in parts.featured_artists {
        if !artists.contains(&artist) {
            artists.push(artist);
        }
    }

    NormalizedTrack {
        title: parts.title,
        qualifiers: parts.qualifiers,
        artists,
        album: normalize_album(track.album.as_deref()),
        duration_secs: plausible_duration(track.duration_secs),
    }
}
