//! Configuration management for the TourGuide engine
//!
//! Provides strongly-typed configuration with validation, environment variable parsing,
//! and sensible defaults. Every value has a default, so an empty environment boots a
//! local instance with generated users and the simulated oracle.
//!
//! # Example
//! ```no_run
//! use tourguide::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Proximity buffer: {} miles", config.rewards.default_proximity_buffer_miles);
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Reward computation configuration
    pub rewards: RewardsConfig,
    /// Rewards oracle configuration
    pub oracle: OracleConfig,
    /// Attraction catalog configuration
    pub catalog: CatalogConfig,
    /// User tracking configuration
    pub tracking: TrackingConfig,
    /// API server configuration
    pub api: ApiConfig,
}

/// Reward engine configuration
#[derive(Debug, Clone)]
pub struct RewardsConfig {
    /// Reward qualification threshold at startup, in miles
    pub default_proximity_buffer_miles: f64,
    /// Threshold for "attractions near me" queries, in miles (independent of the buffer)
    pub attraction_proximity_range_miles: f64,
    /// How many attractions the nearby query returns
    pub nearby_attractions_count: usize,
    /// Size of the reward worker pool
    pub worker_count: usize,
    /// Interval between scheduled reward passes
    pub update_interval: Duration,
    /// Deadline for one scheduled pass over all users
    pub batch_timeout: Duration,
}

/// Which points oracle backs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleMode {
    /// Random points after a random delay
    Simulated,
    /// Remote service at `REWARDS_ORACLE_URL`
    Http,
    /// The catalog's base points, no network
    BasePoints,
}

impl std::str::FromStr for OracleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "http" => Ok(Self::Http),
            "base" | "base_points" => Ok(Self::BasePoints),
            other => Err(format!("unknown oracle mode '{}'", other)),
        }
    }
}

/// Rewards oracle configuration
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub mode: OracleMode,
    /// Remote oracle base URL, required in `Http` mode
    pub url: Option<String>,
    /// Per-call timeout enforced by the adapter
    pub call_timeout: Duration,
    /// Latency bounds of the simulated oracle
    pub simulated_min_latency: Duration,
    pub simulated_max_latency: Duration,
}

/// Attraction catalog configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// JSON or TOML catalog; the built-in catalog is used when unset
    pub attractions_file: Option<PathBuf>,
}

/// User tracking configuration
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Seed the repository with generated users
    pub test_mode: bool,
    /// Number of generated users in test mode
    pub internal_user_count: usize,
    /// Interval between location polls; zero disables the tracker
    pub tracking_interval: Duration,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Port for the Prometheus exporter (with the `metrics` feature)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Try to load .env file (ignore if not found)
        dotenvy::dotenv().ok();

        let config = Self {
            rewards: RewardsConfig::from_env()?,
            oracle: OracleConfig::from_env()?,
            catalog: CatalogConfig::from_env(),
            tracking: TrackingConfig::from_env()?,
            api: ApiConfig::from_env()?,
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let buffer = self.rewards.default_proximity_buffer_miles;
        if !buffer.is_finite() || buffer < 0.0 {
            return Err(Error::InvalidConfig {
                key: "REWARDS_PROXIMITY_BUFFER_MILES",
                message: format!("must be a non-negative number of miles, got {}", buffer).into(),
            });
        }

        let range = self.rewards.attraction_proximity_range_miles;
        if !range.is_finite() || range < 0.0 {
            return Err(Error::InvalidConfig {
                key: "ATTRACTION_PROXIMITY_RANGE_MILES",
                message: format!("must be a non-negative number of miles, got {}", range).into(),
            });
        }

        if self.rewards.worker_count == 0 {
            return Err(Error::InvalidConfig {
                key: "REWARDS_WORKERS",
                message: "worker pool needs at least one worker".into(),
            });
        }

        if self.rewards.nearby_attractions_count == 0 {
            return Err(Error::InvalidConfig {
                key: "NEARBY_ATTRACTIONS_COUNT",
                message: "must be at least 1".into(),
            });
        }

        if self.oracle.simulated_max_latency < self.oracle.simulated_min_latency {
            return Err(Error::InvalidConfig {
                key: "ORACLE_SIMULATED_MAX_LATENCY_MS",
                message: "max latency must be >= min latency".into(),
            });
        }

        // HTTP batches need room for calls still in flight at their deadline
        if self.api.request_timeout <= self.oracle.call_timeout {
            return Err(Error::InvalidConfig {
                key: "API_REQUEST_TIMEOUT_SECS",
                message: format!(
                    "must exceed the oracle call timeout ({}ms)",
                    self.oracle.call_timeout.as_millis()
                )
                .into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Rewards:");
        info!(
            "    Proximity buffer: {} miles",
            self.rewards.default_proximity_buffer_miles
        );
        info!(
            "    Attraction range: {} miles (nearest {})",
            self.rewards.attraction_proximity_range_miles, self.rewards.nearby_attractions_count
        );
        info!("    Workers: {}", self.rewards.worker_count);
        info!("    Update Interval: {:?}", self.rewards.update_interval);
        info!("  Oracle:");
        match (self.oracle.mode, &self.oracle.url) {
            (OracleMode::Http, Some(url)) => info!("    Remote: {}", mask_url(url)),
            (mode, _) => info!("    {:?}", mode),
        }
        info!("  Catalog:");
        match &self.catalog.attractions_file {
            Some(path) => info!("    File: {}", path.display()),
            None => info!("    Built-in"),
        }
        info!("  Tracking:");
        info!("    Test mode: {}", self.tracking.test_mode);
        if self.tracking.test_mode {
            info!("    Internal users: {}", self.tracking.internal_user_count);
        }
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rewards: RewardsConfig {
                default_proximity_buffer_miles: 10.0,
                attraction_proximity_range_miles: 200.0,
                nearby_attractions_count: 5,
                worker_count: default_worker_count(),
                update_interval: Duration::from_secs(300),
                batch_timeout: Duration::from_secs(240),
            },
            oracle: OracleConfig {
                mode: OracleMode::Simulated,
                url: None,
                call_timeout: Duration::from_secs(5),
                simulated_min_latency: Duration::from_millis(1),
                simulated_max_latency: Duration::from_millis(1000),
            },
            catalog: CatalogConfig {
                attractions_file: None,
            },
            tracking: TrackingConfig {
                test_mode: true,
                internal_user_count: 100,
                tracking_interval: Duration::from_secs(300),
            },
            api: ApiConfig {
                port: 8080,
                host: "0.0.0.0".to_string(),
                request_timeout: Duration::from_secs(30),
                cors_enabled: true,
                metrics_port: 9000,
            },
        }
    }
}

impl RewardsConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            default_proximity_buffer_miles: get_env_parsed_or("REWARDS_PROXIMITY_BUFFER_MILES", 10.0)?,
            attraction_proximity_range_miles: get_env_parsed_or(
                "ATTRACTION_PROXIMITY_RANGE_MILES",
                200.0,
            )?,
            nearby_attractions_count: get_env_parsed_or("NEARBY_ATTRACTIONS_COUNT", 5)?,
            worker_count: get_env_parsed_or("REWARDS_WORKERS", default_worker_count())?,
            update_interval: Duration::from_secs(get_env_parsed_or("REWARDS_UPDATE_INTERVAL_SECS", 300)?),
            batch_timeout: Duration::from_secs(get_env_parsed_or("REWARDS_BATCH_TIMEOUT_SECS", 240)?),
        })
    }
}

impl OracleConfig {
    fn from_env() -> Result<Self> {
        let url = get_env_opt("REWARDS_ORACLE_URL");
        let default_mode = if url.is_some() {
            OracleMode::Http
        } else {
            OracleMode::Simulated
        };
        let mode = get_env_parsed_or("REWARDS_ORACLE_MODE", default_mode)?;
        if mode == OracleMode::Http && url.is_none() {
            return Err(Error::MissingEnvVar {
                var: "REWARDS_ORACLE_URL",
            });
        }

        Ok(Self {
            mode,
            url,
            call_timeout: Duration::from_millis(get_env_parsed_or("ORACLE_TIMEOUT_MS", 5000)?),
            simulated_min_latency: Duration::from_millis(get_env_parsed_or(
                "ORACLE_SIMULATED_MIN_LATENCY_MS",
                1,
            )?),
            simulated_max_latency: Duration::from_millis(get_env_parsed_or(
                "ORACLE_SIMULATED_MAX_LATENCY_MS",
                1000,
            )?),
        })
    }
}

impl CatalogConfig {
    fn from_env() -> Self {
        Self {
            attractions_file: get_env_opt("ATTRACTIONS_FILE").map(PathBuf::from),
        }
    }
}

impl TrackingConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            test_mode: get_env_parsed_or("TEST_MODE", true)?,
            internal_user_count: get_env_parsed_or("INTERNAL_USER_COUNT", 100)?,
            tracking_interval: Duration::from_secs(get_env_parsed_or("TRACKING_INTERVAL_SECS", 300)?),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: get_env_parsed_or("API_PORT", 8080)?,
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(get_env_parsed_or("API_REQUEST_TIMEOUT_SECS", 30)?),
            cors_enabled: get_env_parsed_or("API_CORS_ENABLED", true)?,
            metrics_port: get_env_parsed_or("METRICS_PORT", 9000)?,
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Oracle calls dominate, so the pool is sized well above the core count
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 4
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a non-empty environment variable
fn get_env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get and parse environment variable, falling back to `default` when unset
fn get_env_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match get_env_opt(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
    }
}

/// Mask sensitive parts of URL
fn mask_url(url: &str) -> String {
    // Only the userinfo part of the authority can hold a password
    let start = url.find("://").map_or(0, |i| i + 3);
    let end = url[start..]
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .map_or(url.len(), |i| start + i);
    let authority = &url[start..end];

    if let Some(at_pos) = authority.rfind('@') {
        if let Some(colon_pos) = authority[..at_pos].find(':') {
            return format!(
                "{}****{}",
                &url[..start + colon_pos + 1],
                &url[start + at_pos..]
            );
        }
    }
    url.to_string()
}
