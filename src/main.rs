use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, bail, eyre},
};
use serde::Serialize;

use track_resolver::{
    config::Config,
    links::{SpotifyKind, SpotifyLink, youtube_music_playlist_url, youtube_music_url},
    logging::init_tracing,
    resolver::{
        Candidate, CandidateFetcher, ResolutionCache, ResolutionResult, ScoringEngine,
        SourceAlbum, SourceTrack, TrackResolver, fetcher::parse_duration_text, normalize::normalize_track,
    },
    services::http_search::HttpSearchClient,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "TRACK_RESOLVER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directives (default: warn)
    #[arg(long, default_value = "warn", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// OTLP gRPC endpoint to export traces to
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", global = true)]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

fn parse_duration_arg(s: &str) -> Result<u32, String> {
    parse_duration_text(s).ok_or_else(|| format!("`{}` is not a duration like 3:54 or 234", s))
}

#[derive(clap::Args, Debug)]
struct TrackArgs {
    /// Track title as shown on the source service
    #[arg(short, long)]
    title: String,

    /// Track artist, primary first (repeatable)
    #[arg(short, long = "artist", required = true)]
    artists: Vec<String>,

    #[arg(long)]
    album: Option<String>,

    /// Track length, e.g. 3:54
    #[arg(short, long, value_parser = parse_duration_arg)]
    duration: Option<u32>,
}

impl TrackArgs {
    fn into_track(self) -> SourceTrack {
        let mut track = SourceTrack::new(self.title, self.artists);
        track.album = self.album;
        track.duration_secs = self.duration;
        track
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a single track
    Resolve {
        #[command(flatten)]
        track: TrackArgs,

        /// Spotify track link or URI, used as the cache key
        #[arg(long)]
        spotify: Option<String>,
    },
    /// Resolve an album to a playlist
    ResolveAlbum {
        /// Album title as shown on the source service
        #[arg(short, long)]
        title: String,

        /// Album artist, primary first (repeatable)
        #[arg(short, long = "artist", required = true)]
        artists: Vec<String>,

        /// Spotify album link or URI, used as the cache key
        #[arg(long)]
        spotify: Option<String>,
    },
    /// Resolve every track in a JSON array of tracks
    ResolveFile {
        /// The JSON file to read
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Score a JSON array of candidates against a track without searching
    Score {
        #[command(flatten)]
        track: TrackArgs,

        /// The JSON file with candidates
        #[arg(long)]
        candidates: PathBuf,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[derive(Debug, Serialize)]
struct Report<'a, T> {
    source: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    result: &'a ResolutionResult,
}

impl<'a, T> Report<'a, T> {
    fn new(source: &'a T, result: &'a ResolutionResult, link: fn(&str) -> String) -> Self {
        let url = match result {
            ResolutionResult::Resolved { target_id, .. } => Some(link(target_id)),
            _ => None,
        };
        Self {
            source,
            url,
            result,
        }
    }
}

fn source_id_from_link(link: &str, expected: SpotifyKind) -> Result<String> {
    let link = SpotifyLink::parse(link)?;
    if link.kind != expected {
        bail!("Expected a Spotify {} link, got a {} link", expected, link.kind);
    }
    Ok(link.source_id())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).wrap_err("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).wrap_err_with(|| format!("Failed to parse {}", path.display()))
}

fn build_resolver(config: &Config) -> Result<TrackResolver> {
    let search = HttpSearchClient::new(
        config.search.endpoint.clone(),
        config.search.api_key.clone(),
        config.search.request_timeout,
    )?;
    let fetcher = CandidateFetcher::new(Arc::new(search), config.search.max_candidates)
        .with_rate_limit(config.search.requests_per_minute);

    let cache = ResolutionCache::new(config.cache.settings());
    if let Some(path) = config.cache.persist_path() {
        cache.load_from(&path)?;
    }

    Ok(TrackResolver::new(
        fetcher,
        ScoringEngine::new(config.scoring.clone()),
        cache,
        config.resolver.settings(),
    ))
}

fn save_cache(config: &Config, resolver: &TrackResolver) -> Result<()> {
    if let Some(path) = config.cache.persist_path() {
        resolver.cache().save_to(&path)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let _tracing = init_tracing(
        env!("CARGO_PKG_NAME"),
        args.otlp_endpoint.as_deref(),
        &args.log_level,
    )?;

    tracing::debug!("Loading configuration");
    let config = {
        if let Some(config) = &args.config {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .wrap_err("Failed to load track-resolver config")?;

    match args.command {
        Commands::Resolve { track, spotify } => {
            let mut track = track.into_track();
            if let Some(link) = spotify {
                track.source_id = Some(source_id_from_link(&link, SpotifyKind::Track)?);
            }

            let resolver = build_resolver(&config)?;
            let result = resolver.resolve(&track).await;
            save_cache(&config, &resolver)?;
            print_json(&Report::new(&track, &result, youtube_music_url))?;
        }
        Commands::ResolveAlbum {
            title,
            artists,
            spotify,
        } => {
            let mut album = SourceAlbum::new(title, artists);
            if let Some(link) = spotify {
                album.source_id = Some(source_id_from_link(&link, SpotifyKind::Album)?);
            }

            let resolver = build_resolver(&config)?;
            let result = resolver.resolve_album(&album).await;
            save_cache(&config, &resolver)?;
            print_json(&Report::new(&album, &result, youtube_music_playlist_url))?;
        }
        Commands::ResolveFile { input } => {
            let tracks: Vec<SourceTrack> = read_json(&input)?;
            tracing::info!(tracks = tracks.len(), input = %input.display(), "Resolving tracks from file");

            let resolver = build_resolver(&config)?;
            let results = resolver.resolve_all(&tracks).await;
            save_cache(&config, &resolver)?;

            let reports: Vec<Report<SourceTrack>> = tracks
                .iter()
                .zip(&results)
                .map(|(track, result)| Report::new(track, result, youtube_music_url))
                .collect();
            print_json(&reports)?;
        }
        Commands::Score { track, candidates } => {
            let candidates: Vec<Candidate> = read_json(&candidates)?;
            let normalized = normalize_track(&track.into_track());
            let engine = ScoringEngine::new(config.scoring.clone());

            print_json(&serde_json::json!({
                "ranked": engine.rank(&normalized, &candidates),
                "decision": engine.decide(&normalized, &candidates),
            }))?;
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                println!("{}", path.display());
            }
            ConfigCommands::Path => {
                let path = Config::config_path().ok_or_else(|| eyre!("No default config path found"))?;
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}
