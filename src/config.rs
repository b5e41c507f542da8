//! Configuration management for the Reading Copilot server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::chunker::{ChunkerConfig, DEFAULT_MAX_CHARS, DEFAULT_MERGE_DISTANCE};
use crate::extraction::{DEFAULT_CACHE_CAPACITY, DEFAULT_EXTRACT_TIMEOUT_SECS};
use crate::selector::DEFAULT_MIN_THRESHOLD;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scorer: ScorerConfig,
    pub engine: EngineConfig,
    pub chunker: ChunkerConfig,
    pub extraction: ExtractionConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Azure OpenAI scoring service
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Auto-highlight run tuning
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Chunks per scoring call
    pub batch_size: usize,
    /// Scoring calls in flight at once
    pub scoring_concurrency: usize,
    /// Default minimum relevance, in [0, 1]
    pub min_threshold: f32,
    /// Multiplier applied to the density word budget
    pub soft_cap_multiplier: f32,
    /// Capacity of the engine's event channel
    pub event_buffer: usize,
    /// Directory for run reports; none disables them
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Documents whose lines stay cached
    pub cache_capacity: usize,
    pub timeout_secs: u64,
}

/// Run retention
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// How long a finished run is kept when nobody fetches it
    pub retention_secs: u64,
    /// How long a finished run is kept once its terminal state was fetched
    pub fetched_grace_secs: u64,
    pub cleanup_interval_secs: u64,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: String,
        min: f32,
        max: f32,
    },
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            endpoint: None,
            api_key: None,
            deployment: "gpt-4o-mini".to_string(),
            api_version: "2024-05-01-preview".to_string(),
            max_tokens: 250,
            timeout_secs: 60,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_size: 8,
            scoring_concurrency: 1,
            min_threshold: DEFAULT_MIN_THRESHOLD,
            soft_cap_multiplier: 1.0,
            event_buffer: 64,
            log_dir: None,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            timeout_secs: DEFAULT_EXTRACT_TIMEOUT_SECS,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            retention_secs: 3600,
            fetched_grace_secs: 60,
            cleanup_interval_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            database: DatabaseConfig {
                url: "sqlite:./readingcopilot.db".to_string(),
            },
            scorer: ScorerConfig::default(),
            engine: EngineConfig::default(),
            chunker: ChunkerConfig::default(),
            extraction: ExtractionConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Parse an env var, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let min_threshold = env_or("RC_MIN_RELEVANCE_THRESHOLD", defaults.engine.min_threshold);
        if !(0.0..=1.0).contains(&min_threshold) {
            return Err(ConfigError::OutOfRange {
                key: "RC_MIN_RELEVANCE_THRESHOLD",
                value: min_threshold.to_string(),
                min: 0.0,
                max: 1.0,
            });
        }

        let soft_cap_multiplier = env_or("RC_SOFT_CAP_MULTIPLIER", defaults.engine.soft_cap_multiplier);
        if !(soft_cap_multiplier.is_finite() && soft_cap_multiplier > 0.0) {
            return Err(ConfigError::OutOfRange {
                key: "RC_SOFT_CAP_MULTIPLIER",
                value: soft_cap_multiplier.to_string(),
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env_or("SERVER_PORT", defaults.server.port),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            scorer: ScorerConfig {
                endpoint: env_opt("RC_AZURE_OPENAI_ENDPOINT"),
                api_key: env_opt("RC_AZURE_OPENAI_KEY"),
                deployment: env_opt("RC_AZURE_OPENAI_DEPLOYMENT")
                    .unwrap_or(defaults.scorer.deployment),
                api_version: env_opt("RC_AZURE_OPENAI_API_VERSION")
                    .unwrap_or(defaults.scorer.api_version),
                max_tokens: env_or("RC_AZURE_OPENAI_MAX_TOKENS", defaults.scorer.max_tokens),
                timeout_secs: env_or("RC_SCORER_TIMEOUT_SECS", defaults.scorer.timeout_secs),
            },
            engine: EngineConfig {
                batch_size: env_or("RC_BATCH_SIZE", defaults.engine.batch_size).max(1),
                scoring_concurrency: env_or(
                    "RC_SCORING_CONCURRENCY",
                    defaults.engine.scoring_concurrency,
                )
                .max(1),
                min_threshold,
                soft_cap_multiplier,
                event_buffer: env_or("RC_EVENT_BUFFER", defaults.engine.event_buffer).max(1),
                log_dir: env_opt("RC_LOG_DIR").map(PathBuf::from),
            },
            chunker: ChunkerConfig {
                max_chars: env_or("RC_CHUNK_MAX_CHARS", DEFAULT_MAX_CHARS).max(1),
                merge_distance: env_or("RC_CHUNK_MERGE_DISTANCE", DEFAULT_MERGE_DISTANCE),
            },
            extraction: ExtractionConfig {
                cache_capacity: env_or("RC_LINE_CACHE_SIZE", defaults.extraction.cache_capacity),
                timeout_secs: env_or("RC_EXTRACT_TIMEOUT_SECS", defaults.extraction.timeout_secs),
            },
            registry: RegistryConfig {
                retention_secs: env_or("RC_RUN_RETENTION_SECS", defaults.registry.retention_secs),
                fetched_grace_secs: env_or(
                    "RC_RUN_FETCHED_GRACE_SECS",
                    defaults.registry.fetched_grace_secs,
                ),
                cleanup_interval_secs: env_or(
                    "RC_RUN_CLEANUP_INTERVAL_SECS",
                    defaults.registry.cleanup_interval_secs,
                )
                .max(1),
            },
        })
    }
}
