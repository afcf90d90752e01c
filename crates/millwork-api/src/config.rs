//! Server configuration assembled from the environment.

use axum::http::HeaderValue;

use millwork_core::{defaults, Result, ScoringPolicy};
use millwork_jobs::WorkerConfig;
use millwork_review::ReviewConfig;
use millwork_sync::SyncConfig;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// Settings for every service behind the API.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub scoring: ScoringPolicy,
    pub review: ReviewConfig,
    pub sync: SyncConfig,
    pub worker: WorkerConfig,
    pub allowed_origins: Vec<HeaderValue>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let scoring = ScoringPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            review: ReviewConfig::default().with_thresholds(scoring.thresholds),
            scoring,
            sync: SyncConfig::default(),
            worker: WorkerConfig::default(),
            allowed_origins: parse_allowed_origins(DEFAULT_ALLOWED_ORIGINS),
        }
    }
}

impl AppConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HOST` | `0.0.0.0` |
    /// | `PORT` | `3000` |
    /// | `ALLOWED_ORIGINS` | `http://localhost:3000` |
    /// | `MILLWORK_SCORING_POLICY` | built-in policy |
    ///
    /// Review, sync and worker settings read their own variables. A scoring
    /// policy file that fails to load or validate is an error.
    pub fn from_env() -> Result<Self> {
        let scoring = ScoringPolicy::from_env()?;
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::SERVER_PORT);
        let origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string());
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            review: ReviewConfig::from_env().with_thresholds(scoring.thresholds),
            scoring,
            sync: SyncConfig::from_env(),
            worker: WorkerConfig::from_env(),
            allowed_origins: parse_allowed_origins(&origins),
        })
    }
}

/// Comma-separated origins. Invalid entries are skipped with a warning.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}
