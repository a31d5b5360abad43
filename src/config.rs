use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{OptionExt, Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::resolver::{CacheSettings, ResolverSettings, ScoringConfig};

/// Durations as human-readable strings, e.g. "24h" or "750ms"
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// JSON search endpoint of the target catalog
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,
    /// 0 disables client-side rate limiting
    pub requests_per_minute: u32,
    pub max_candidates: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/search".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(5),
            requests_per_minute: 60,
            max_candidates: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(with = "humantime_duration")]
    pub ttl_resolved: Duration,
    #[serde(with = "humantime_duration")]
    pub ttl_not_found: Duration,
    pub capacity: usize,
    /// Where the CLI keeps the cache between runs; unset keeps it in memory
    pub persist_path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let settings = CacheSettings::default();
        Self {
            ttl_resolved: settings.ttl_resolved,
            ttl_not_found: settings.ttl_not_found,
            capacity: settings.capacity,
            persist_path: None,
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            ttl_resolved: self.ttl_resolved,
            ttl_not_found: self.ttl_not_found,
            capacity: self.capacity,
        }
    }

    /// Get expanded persistence path
    pub fn persist_path(&self) -> Option<PathBuf> {
        self.persist_path.as_deref().map(expand_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    pub max_attempts: usize,
    #[serde(with = "humantime_duration")]
    pub retry_min_delay: Duration,
    #[serde(with = "humantime_duration")]
    pub retry_max_delay: Duration,
    pub video_fallback: bool,
    pub concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let settings = ResolverSettings::default();
        Self {
            timeout: settings.timeout,
            max_attempts: settings.max_attempts,
            retry_min_delay: settings.retry_min_delay,
            retry_max_delay: settings.retry_max_delay,
            video_fallback: settings.video_fallback,
            concurrency: settings.concurrency,
        }
    }
}

impl ResolverConfig {
    pub fn settings(&self) -> ResolverSettings {
        ResolverSettings {
            timeout: self.timeout,
            max_attempts: self.max_attempts.max(1),
            retry_min_delay: self.retry_min_delay,
            retry_max_delay: self.retry_max_delay.max(self.retry_min_delay),
            video_fallback: self.video_fallback,
            concurrency: self.concurrency.max(1),
        }
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).wrap_err("Invalid config")
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("track-resolver").join("config.toml"))
    }

    /// Load the default config file, falling back to defaults when it doesn't exist
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the defaults to the default config path unless a file is already there
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_eyre("No config directory on this platform")?;
        Self::default().write_new(&path)?;
        Ok(path)
    }

    fn write_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            tracing::info!(path = %path.display(), "Config file already exists");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
