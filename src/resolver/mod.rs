pub mod cache;
pub mod fetcher;
pub mod normalize;
pub mod orchestrator;
pub mod scoring;
pub mod types;

pub use cache::{CacheKey, CacheSettings, ResolutionCache};
pub use fetcher::{CandidateFetcher, FetchError};
pub use orchestrator::{ResolverSettings, TrackResolver};
pub use scoring::{ScoringConfig, ScoringEngine};
pub use types::{
    Candidate, FailureReason, NormalizedTrack, ResolutionResult, ScoredCandidate, SourceAlbum,
    SourceTrack, SubScores,
};
