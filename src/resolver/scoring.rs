//! Candidate scoring and the accept / ambiguous / not-found decision.
//!
//! Everything here is a pure function of the normalized source track and the
//! candidate list, so identical inputs always produce identical decisions.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::normalize::{normalize_album, normalize_artists, normalize_title, plausible_duration};
use super::types::{Candidate, NormalizedTrack, ResolutionResult, ScoredCandidate, SubScores};

const TITLE_WEIGHT: f64 = 0.45;
const ARTIST_WEIGHT: f64 = 0.35;
const DURATION_WEIGHT: f64 = 0.20;

/// Duration sub-score when either side has no duration
const NEUTRAL_DURATION_SCORE: f64 = 0.5;

/// Artist sub-score ceiling when the primary artist is missing
const PRIMARY_ARTIST_MISMATCH_CAP: f64 = 0.5;

/// Tunable decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum score for the best candidate to be considered a match
    pub min_accept_score: f64,
    /// Minimum gap between the best and second-best candidate
    pub min_margin: f64,
    /// Subtracted from the title score per source qualifier the candidate lacks
    pub qualifier_penalty: f64,
    /// Duration difference at which the duration score reaches zero
    pub duration_tolerance_secs: u32,
    pub album_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_accept_score: 0.82,
            min_margin: 0.08,
            qualifier_penalty: 0.15,
            duration_tolerance_secs: 20,
            album_bonus: 0.05,
        }
    }
}

// =============================================================================
// String Similarity
// =============================================================================

/// Token-based similarity - handles word reordering
pub fn token_similarity(s1: &str, s2: &str) -> f64 {
    let tokens1: HashSet<&str> = s1.split_whitespace().collect();
    let tokens2: HashSet<&str> = s2.split_whitespace().collect();

    if tokens1.is_empty() && tokens2.is_empty() {
        return 1.0;
    }
    if tokens1.is_empty() || tokens2.is_empty() {
        return 0.0;
    }

    let intersection = tokens1.intersection(&tokens2).count();
    let union = tokens1.union(&tokens2).count();

    intersection as f64 / union as f64
}

/// Combined similarity using both Jaro-Winkler and token-based
pub fn combined_string_similarity(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    let jw = jaro_winkler::jaro_winkler(s1, s2);
    let token = token_similarity(s1, s2);

    jw.max(token * 0.95).clamp(0.0, 1.0)
}

/// "remastered" matches "remaster", numbers must match exactly
fn tokens_match(qualifier_token: &str, candidate_token: &str) -> bool {
    if qualifier_token == candidate_token {
        return true;
    }
    let numeric = qualifier_token.chars().all(|c| c.is_ascii_digit());
    !numeric
        && qualifier_token.len() >= 4
        && candidate_token.len() >= 4
        && (qualifier_token.starts_with(candidate_token)
            || candidate_token.starts_with(qualifier_token))
}

fn qualifier_present(qualifier: &str, candidate_tokens: &HashSet<&str>) -> bool {
    qualifier.split_whitespace().all(|token| {
        candidate_tokens
            .iter()
            .any(|candidate| tokens_match(token, candidate))
    })
}

/// Whole-word containment in either direction: "queen" is in
/// "queen david bowie" but not in "queensryche"
fn artist_names_match(a: &str, b: &str) -> bool {
    let a: Vec<&str> = a.split_whitespace().collect();
    let b: Vec<&str> = b.split_whitespace().collect();
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    long.windows(short.len()).any(|window| window == short.as_slice())
}

// =============================================================================
// Scoring Engine
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    fn title_score(&self, source: &NormalizedTrack, candidate_title: &str) -> f64 {
        let parts = normalize_title(candidate_title);
        let similarity = combined_string_similarity(&source.title, &parts.title);

        let candidate_tokens: HashSet<&str> = parts
            .title
            .split_whitespace()
            .chain(parts.qualifiers.iter().flat_map(|q| q.split_whitespace()))
            .collect();
        let missing = source
            .qualifiers
            .iter()
            .filter(|qualifier| !qualifier_present(qualifier, &candidate_tokens))
            .count();

        (similarity - missing as f64 * self.config.qualifier_penalty).max(0.0)
    }

    fn artist_score(&self, source: &NormalizedTrack, candidate: &Candidate) -> f64 {
        let Some(primary) = source.primary_artist() else {
            return 0.0;
        };

        let mut candidate_artists = normalize_artists(&candidate.artists);
        candidate_artists.extend(normalize_title(&candidate.title).featured_artists);

        let present = |artist: &str| {
            candidate_artists
                .iter()
                .any(|c| artist_names_match(artist, c))
        };

        let matched = source.artists.iter().filter(|a| present(a.as_str())).count();
        let fraction = matched as f64 / source.artists.len() as f64;

        if present(primary) {
            fraction
        } else {
            fraction.min(PRIMARY_ARTIST_MISMATCH_CAP)
        }
    }

    fn duration_score(&self, source: &NormalizedTrack, candidate: &Candidate) -> f64 {
        match (source.duration_secs, plausible_duration(candidate.duration_secs)) {
            (Some(a), Some(b)) => {
                let tolerance = self.config.duration_tolerance_secs.max(1) as f64;
                1.0 - (a.abs_diff(b) as f64 / tolerance).min(1.0)
            }
            _ => NEUTRAL_DURATION_SCORE,
        }
    }

    fn album_bonus(&self, source: &NormalizedTrack, candidate: &Candidate) -> f64 {
        match (&source.album, normalize_album(candidate.album.as_deref())) {
            (Some(a), Some(b)) if *a == b => self.config.album_bonus,
            _ => 0.0,
        }
    }

    /// Compare one candidate against the source track
    pub fn score_candidate(&self, source: &NormalizedTrack, candidate: &Candidate) -> ScoredCandidate {
        let subscores = SubScores {
            title: self.title_score(source, &candidate.title),
            artist: self.artist_score(source, candidate),
            duration: self.duration_score(source, candidate),
            album_bonus: self.album_bonus(source, candidate),
        };

        let score = (subscores.title * TITLE_WEIGHT
            + subscores.artist * ARTIST_WEIGHT
            + subscores.duration * DURATION_WEIGHT
            + subscores.album_bonus)
            .clamp(0.0, 1.0);

        ScoredCandidate {
            candidate: candidate.clone(),
            score,
            subscores,
        }
    }

    /// Score and sort candidates, best first
    pub fn rank(&self, source: &NormalizedTrack, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
        let prefer_short_titles = source.qualifiers.is_empty();

        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|candidate| self.score_candidate(source, candidate))
            .collect();

        // Stable sort keeps search order for full ties
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| {
                    b.candidate
                        .is_official_audio
                        .cmp(&a.candidate.is_official_audio)
                })
                .then_with(|| {
                    if prefer_short_titles {
                        a.candidate
                            .title
                            .chars()
                            .count()
                            .cmp(&b.candidate.title.chars().count())
                    } else {
                        Ordering::Equal
                    }
                })
        });

        scored
    }

    /// Rank the candidates and decide which one, if any, is the source track
    pub fn decide(&self, source: &NormalizedTrack, candidates: &[Candidate]) -> ResolutionResult {
        let ranked = self.rank(source, candidates);

        let Some(best) = ranked.first() else {
            return ResolutionResult::NotFound;
        };

        tracing::debug!(
            title = %source.title,
            best_score = best.score,
            best_id = %best.candidate.target_id,
            candidates = ranked.len(),
            "Ranked candidates"
        );

        if best.score < self.config.min_accept_score {
            return ResolutionResult::NotFound;
        }

        let close_call = ranked
            .get(1)
            .is_some_and(|runner_up| best.score - runner_up.score < self.config.min_margin);

        if !close_call {
            return ResolutionResult::Resolved {
                target_id: best.candidate.target_id.clone(),
                score: best.score,
            };
        }

        let best_score = best.score;
        let top_candidates = ranked
            .into_iter()
            .filter(|scored| best_score - scored.score < self.config.min_margin)
            .collect();

        ResolutionResult::Ambiguous { top_candidates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::normalize::normalize_track;
    use crate::test_utils::{candidate, source_track};

    fn engine() -> ScoringEngine {
        ScoringEngine::default()
    }

    #[test]
    fn test_token_similarity() {
        assert!((token_similarity("quick brown fox", "brown fox quick") - 1.0).abs() < 0.001);
        assert!(token_similarity("the song", "song the") > 0.9);
        assert_eq!(token_similarity("", "song"), 0.0);
    }

    #[test]
    fn test_exact_match_resolves() {
        let source = normalize_track(&source_track("Bohemian Rhapsody", &["Queen"]).with_duration_secs(355));
        let candidates = vec![candidate("yt1", "Bohemian Rhapsody", &["Queen"], Some(354))];

        let scored = engine().score_candidate(&source, &candidates[0]);
        assert!((scored.subscores.title - 1.0).abs() < 1e-9);
        assert!((scored.subscores.artist - 1.0).abs() < 1e-9);
        assert!((scored.subscores.duration - 0.95).abs() < 1e-9);

        match engine().decide(&source, &candidates) {
            ResolutionResult::Resolved { target_id, score } => {
                assert_eq!(target_id, "yt1");
                assert!(score >= 0.82);
            }
            other => panic!("expected Resolved, got {:?}", other),
        }
    }

    #[test]
    fn test_near_identical_uploads_are_ambiguous() {
        let source = normalize_track(&source_track("Yesterday", &["The Beatles"]));
        let mut live = candidate("live", "Yesterday", &["The Beatles"], Some(150));
        live.is_official_audio = false;
        let official = candidate("studio", "Yesterday", &["The Beatles"], Some(125));

        match engine().decide(&source, &[live, official]) {
            ResolutionResult::Ambiguous { top_candidates } => {
                assert_eq!(top_candidates.len(), 2);
                assert_eq!(top_candidates[0].candidate.target_id, "studio");
                assert_eq!(top_candidates[1].candidate.target_id, "live");
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_candidates_not_found() {
        let source = normalize_track(&source_track("Anything", &["Anyone"]));
        assert_eq!(engine().decide(&source, &[]), ResolutionResult::NotFound);
    }

    #[test]
    fn test_weak_candidates_not_found() {
        let source = normalize_track(&source_track("Bohemian Rhapsody", &["Queen"]).with_duration_secs(355));
        let candidates = vec![candidate("x", "Under Pressure", &["David Bowie"], Some(248))];
        assert_eq!(engine().decide(&source, &candidates), ResolutionResult::NotFound);
    }

    #[test]
    fn test_clear_winner_over_runner_up() {
        let source = normalize_track(&source_track("Bohemian Rhapsody", &["Queen"]).with_duration_secs(355));
        let candidates = vec![
            candidate("cover", "Bohemian Rhapsody", &["Some Choir"], Some(390)),
            candidate("real", "Bohemian Rhapsody", &["Queen"], Some(355)),
        ];
        match engine().decide(&source, &candidates) {
            ResolutionResult::Resolved { target_id, .. } => assert_eq!(target_id, "real"),
            other => panic!("expected Resolved, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_qualifier_is_penalized() {
        let source = normalize_track(&source_track("Song (Acoustic)", &["Artist"]));
        let with_qualifier = engine().score_candidate(
            &source,
            &candidate("a", "Song (Acoustic Version)", &["Artist"], None),
        );
        let without_qualifier =
            engine().score_candidate(&source, &candidate("b", "Song", &["Artist"], None));

        assert!((with_qualifier.subscores.title - 1.0).abs() < 1e-9);
        assert!((without_qualifier.subscores.title - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_qualifier_penalty_floors_at_zero() {
        let source = normalize_track(&source_track(
            "Zz (Live) [Remix] (Demo) (Mono) (Karaoke) (Edit) (Instrumental)",
            &["Artist"],
        ));
        let scored = engine().score_candidate(&source, &candidate("a", "Zz", &["Artist"], None));
        assert_eq!(scored.subscores.title, 0.0);
    }

    #[test]
    fn test_remastered_matches_remaster() {
        let source = normalize_track(&source_track("Let It Be - Remastered 2009", &["The Beatles"]));
        let scored = engine().score_candidate(
            &source,
            &candidate("a", "Let It Be (2009 Remaster)", &["The Beatles"], None),
        );
        assert!((scored.subscores.title - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_primary_artist_mismatch_caps_artist_score() {
        let source = normalize_track(&source_track("Song", &["Main", "Guest"]));
        let scored = engine().score_candidate(&source, &candidate("a", "Song", &["Guest"], None));
        assert!((scored.subscores.artist - 0.5).abs() < 1e-9);

        let source = normalize_track(&source_track("Song", &["Main", "Guest", "Third"]));
        let scored = engine().score_candidate(
            &source,
            &candidate("a", "Song", &["Guest", "Third"], None),
        );
        assert!((scored.subscores.artist - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_artist_names_match_on_word_boundaries() {
        assert!(artist_names_match("queen", "queen"));
        assert!(artist_names_match("queen", "queen david bowie"));
        assert!(artist_names_match("daft punk", "daft punk orchestra"));
        assert!(!artist_names_match("queen", "queensryche"));
        assert!(!artist_names_match("queen", "q"));
        assert!(!artist_names_match("punk daft", "daft punk"));
        assert!(!artist_names_match("", "queen"));
    }

    #[test]
    fn test_similarly_named_artist_does_not_resolve() {
        let source = normalize_track(
            &source_track("Bohemian Rhapsody", &["Queen"]).with_duration_secs(355),
        );
        let candidates = vec![candidate("cover", "Bohemian Rhapsody", &["Queensrÿche"], Some(355))];

        let scored = engine().score_candidate(&source, &candidates[0]);
        assert_eq!(scored.subscores.artist, 0.0);
        assert_eq!(engine().decide(&source, &candidates), ResolutionResult::NotFound);

        let one_letter = candidate("x", "Bohemian Rhapsody", &["Q"], Some(355));
        assert_eq!(engine().score_candidate(&source, &one_letter).subscores.artist, 0.0);
    }

    #[test]
    fn test_featured_artist_in_candidate_title_counts() {
        let source = normalize_track(&source_track("Song", &["Main", "Guest"]));
        let scored = engine().score_candidate(
            &source,
            &candidate("a", "Song (feat. Guest)", &["Main"], None),
        );
        assert!((scored.subscores.artist - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_duration_is_neutral() {
        let source = normalize_track(&source_track("Song", &["Artist"]).with_duration_secs(200));
        let scored = engine().score_candidate(&source, &candidate("a", "Song", &["Artist"], None));
        assert_eq!(scored.subscores.duration, 0.5);

        let far = engine().score_candidate(&source, &candidate("b", "Song", &["Artist"], Some(400)));
        assert_eq!(far.subscores.duration, 0.0);
    }

    #[test]
    fn test_album_bonus_never_pushes_score_above_one() {
        let source = normalize_track(
            &source_track("Song", &["Artist"])
                .with_duration_secs(200)
                .with_album("Album"),
        );
        let mut hit = candidate("a", "Song", &["Artist"], Some(200));
        hit.album = Some("Album (Deluxe Edition)".into());

        let scored = engine().score_candidate(&source, &hit);
        assert_eq!(scored.subscores.album_bonus, 0.05);
        assert_eq!(scored.score, 1.0);
    }

    #[test]
    fn test_shorter_title_wins_tie_without_source_qualifiers() {
        let source = normalize_track(&source_track("Song", &["Artist"]));
        let extended = candidate("extended", "Song (Extended Mix)", &["Artist"], None);
        let plain = candidate("plain", "Song", &["Artist"], None);

        let ranked = engine().rank(&source, &[extended, plain]);
        assert_eq!(ranked[0].candidate.target_id, "plain");
        assert_eq!(ranked[0].score, ranked[1].score);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let source = normalize_track(&source_track("Song", &["Artist"]));
        let candidates = vec![
            candidate("a", "Song", &["Artist"], None),
            candidate("b", "Song", &["Artist"], None),
        ];
        let lenient = ScoringEngine::new(ScoringConfig {
            min_margin: 0.0,
            ..ScoringConfig::default()
        });
        assert!(matches!(
            lenient.decide(&source, &candidates),
            ResolutionResult::Resolved { .. }
        ));

        let strict = ScoringEngine::new(ScoringConfig {
            min_accept_score: 0.99,
            ..ScoringConfig::default()
        });
        assert_eq!(strict.decide(&source, &candidates), ResolutionResult::NotFound);
    }

    #[test]
    fn test_decisions_are_deterministic() {
        let source = normalize_track(&source_track("Yesterday", &["The Beatles"]).with_duration_secs(125));
        let candidates = vec![
            candidate("a", "Yesterday (Remastered 2009)", &["The Beatles"], Some(126)),
            candidate("b", "Yesterday", &["Beatles Tribute Band"], Some(130)),
            candidate("c", "Yesterday - Live", &["The Beatles"], None),
        ];
        let first = engine().decide(&source, &candidates);
        for _ in 0..10 {
            assert_eq!(engine().decide(&source, &candidates), first);
        }
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let sources = [
            source_track("Song", &["Artist"]),
            source_track("Song (Live) [Remix]", &["A", "B"]).with_duration_secs(10_000),
            source_track("x", &["y"]).with_album("z").with_duration_secs(11),
        ];
        let candidates = [
            candidate("a", "", &[], None),
            candidate("b", "Song", &["Artist"], Some(u32::MAX)),
            candidate("c", "!!!", &["???"], Some(0)),
            candidate("d", "x", &["y"], Some(11)),
        ];
        for source in &sources {
            let normalized = normalize_track(source);
            for scored in engine().rank(&normalized, &candidates) {
                assert!((0.0..=1.0).contains(&scored.score), "{:?}", scored);
                let s = scored.subscores;
                for sub in [s.title, s.artist, s.duration] {
                    assert!((0.0..=1.0).contains(&sub), "{:?}", scored);
                }
            }
        }
    }
}
