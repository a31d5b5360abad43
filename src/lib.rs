//! Resolves tracks from one music catalog (e.g. Spotify) to the matching item
//! in another (e.g. YouTube Music) by searching, scoring and caching.

pub mod config;
pub mod links;
pub mod logging;
pub mod ports;
pub mod resolver;
pub mod services;

#[cfg(test)]
mod test_utils;

pub use resolver::{ResolutionResult, SourceTrack, TrackResolver};
