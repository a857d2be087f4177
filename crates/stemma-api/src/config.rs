//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use stemma_core::envvar::{env_bool, env_string, env_u16, env_u64};
use stemma_core::{Error, Result};
use stemma_engine::CheckThresholds;

/// CORS configuration for browser-based access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. Use `["*"]` to allow all origins (development only).
    /// Empty list disables CORS entirely.
    pub allowed_origins: Vec<String>,

    /// Max age for preflight cache (seconds).
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Default: disabled (secure-by-default).
            allowed_origins: Vec::new(),
            max_age_seconds: 3600,
        }
    }
}

/// Configuration for the Stemma API server.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub http_port: u16,

    /// Directory holding `manifest.json`, `catalog.json`, backups, and
    /// the snapshot tree.
    pub artifact_root: PathBuf,

    /// Enable debug mode (pretty logs instead of JSON).
    pub debug: bool,

    /// CORS configuration.
    pub cors: CorsConfig,

    /// Broad-check thresholds.
    pub thresholds: CheckThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            artifact_root: PathBuf::from("."),
            debug: false,
            cors: CorsConfig::default(),
            thresholds: CheckThresholds::default(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `STEMMA_HTTP_PORT`
    /// - `STEMMA_ARTIFACT_ROOT`
    /// - `STEMMA_DEBUG`
    /// - `STEMMA_CORS_ALLOWED_ORIGINS` (comma-separated, or `*`)
    /// - `STEMMA_CORS_MAX_AGE_SECONDS`
    /// - `OBS_VOLUME_THRESHOLD_PCT`
    /// - `OBS_FRESHNESS_THRESHOLD_MINUTES`
    /// - `OBS_REFERENCE_FRESHNESS_THRESHOLD_MINUTES`
    ///
    /// The `OBS_*` thresholds fall back to their defaults on out-of-range
    /// values; the `STEMMA_*` variables fail fast on unparseable values.
    ///
    /// # Errors
    ///
    /// Returns an error if a `STEMMA_*` variable is present but cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_u16("STEMMA_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(root) = env_string("STEMMA_ARTIFACT_ROOT") {
            config.artifact_root = PathBuf::from(root);
        }
        if let Some(debug) = env_bool("STEMMA_DEBUG")? {
            config.debug = debug;
        }
        if let Some(origins) = env_string("STEMMA_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = parse_cors_allowed_origins(&origins);
        }
        if let Some(max_age) = env_u64("STEMMA_CORS_MAX_AGE_SECONDS")? {
            config.cors.max_age_seconds = max_age;
        }

        config.thresholds = CheckThresholds::from_env();

        if !config.artifact_root.as_os_str().is_empty() && !config.artifact_root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "STEMMA_ARTIFACT_ROOT is not a directory: {}",
                config.artifact_root.display()
            )));
        }

        Ok(config)
    }
}

fn parse_cors_allowed_origins(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed == "*" {
        return vec!["*".to_string()];
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
