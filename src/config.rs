use crate::learner::LearnerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_workers() -> usize {
    num_cpus::get().clamp(1, 3)
}

/// Every tunable of the pipeline. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // boundary detection
    pub max_block_bytes: usize,
    pub idle_flush_ms: u64,
    pub idle_check_interval_ms: u64,
    pub max_sources: usize,

    // worker pool
    pub workers: usize,
    pub queue_capacity: usize,
    pub submit_wait_ms: u64,

    // aggregation
    pub cache_ttl_secs: u64,
    pub cache_refresh_secs: u64,

    // learner
    pub retrain_interval_secs: u64,
    pub min_samples: usize,
    pub learner_window_days: u32,
    pub pattern_expiry_days: u32,
    pub min_pattern_frequency: u64,
    pub min_pattern_confidence: f64,

    pub enrich_new_records: bool,

    pub shutdown_grace_ms: u64,
    pub dispose_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_block_bytes: 50_000,
            idle_flush_ms: 3_000,
            idle_check_interval_ms: 1_000,
            max_sources: 64,
            workers: default_workers(),
            queue_capacity: 50,
            submit_wait_ms: 100,
            cache_ttl_secs: 10 * 60,
            cache_refresh_secs: 15 * 60,
            retrain_interval_secs: 6 * 60 * 60,
            min_samples: 50,
            learner_window_days: 30,
            pattern_expiry_days: 30,
            min_pattern_frequency: 5,
            min_pattern_confidence: 0.8,
            enrich_new_records: false,
            shutdown_grace_ms: 5_000,
            dispose_grace_ms: 1_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_block_bytes", self.max_block_bytes as u64),
            ("idle_flush_ms", self.idle_flush_ms),
            ("idle_check_interval_ms", self.idle_check_interval_ms),
            ("max_sources", self.max_sources as u64),
            ("workers", self.workers as u64),
            ("queue_capacity", self.queue_capacity as u64),
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("cache_refresh_secs", self.cache_refresh_secs),
            ("retrain_interval_secs", self.retrain_interval_secs),
            ("learner_window_days", u64::from(self.learner_window_days)),
            ("pattern_expiry_days", u64::from(self.pattern_expiry_days)),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if !(0.0..=1.0).contains(&self.min_pattern_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_pattern_confidence must be within [0, 1], got {}",
                self.min_pattern_confidence
            )));
        }
        Ok(())
    }

    pub fn idle_flush(&self) -> Duration { Duration::from_millis(self.idle_flush_ms) }
    pub fn idle_check_interval(&self) -> Duration { Duration::from_millis(self.idle_check_interval_ms) }
    pub fn submit_wait(&self) -> Duration { Duration::from_millis(self.submit_wait_ms) }
    pub fn cache_ttl(&self) -> Duration { Duration::from_secs(self.cache_ttl_secs) }
    pub fn cache_refresh(&self) -> Duration { Duration::from_secs(self.cache_refresh_secs) }
    pub fn retrain_interval(&self) -> Duration { Duration::from_secs(self.retrain_interval_secs) }
    pub fn shutdown_grace(&self) -> Duration { Duration::from_millis(self.shutdown_grace_ms) }
    pub fn dispose_grace(&self) -> Duration { Duration::from_millis(self.dispose_grace_ms) }

    pub fn learner(&self) -> LearnerConfig {
        LearnerConfig {
            min_samples: self.min_samples,
            min_frequency: self.min_pattern_frequency,
            min_confidence: self.min_pattern_confidence,
            expiry: chrono::Duration::days(i64::from(self.pattern_expiry_days)),
        }
    }
}
