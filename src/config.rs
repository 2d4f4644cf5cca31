use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::policy::PolicyStrategy;

/// Overrides `max_loop_duration_secs` when set to a non-negative number.
pub const MAX_LOOP_ENV: &str = "VITALGUARD_MAX_LOOP_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifierSettings {
    /// HTTPS endpoint accepting `{destination, text}` JSON bodies.
    pub endpoint: String,
    pub destination: String,
}

/// Every tunable of the engine. Passed by value into each constructor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Expected share of outliers in the fitting batch.
    pub contamination_fraction: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub random_seed: u64,

    pub camera_sample_duration_secs: f64,
    /// Pause between frame grabs inside a sampling window.
    pub camera_frame_interval_ms: u64,
    /// Mean absolute grayscale difference above which a frame counts as motion.
    pub motion_threshold: f64,
    /// Directory of frames used as the video source. No camera when unset.
    pub video_source: Option<String>,

    pub max_loop_duration_secs: f64,
    pub policy: PolicyStrategy,

    pub notifier: Option<NotifierSettings>,
    /// Minimum spacing between delivered alerts; 0 disables rate limiting.
    pub notification_cooldown_secs: u64,
    /// How long a finished run waits for queued alerts to go out.
    pub outbox_drain_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            contamination_fraction: 0.18,
            n_estimators: 100,
            max_samples: 256,
            random_seed: 42,
            camera_sample_duration_secs: 5.0,
            camera_frame_interval_ms: 33,
            motion_threshold: 10.0,
            video_source: None,
            max_loop_duration_secs: 60.0,
            policy: PolicyStrategy::RiskOnly,
            notifier: None,
            notification_cooldown_secs: 0,
            outbox_drain_timeout_secs: 30,
        }
    }
}

impl MonitorConfig {
    pub fn camera_sample_duration(&self) -> Duration {
        Duration::from_secs_f64(self.camera_sample_duration_secs.max(0.0))
    }

    pub fn camera_frame_interval(&self) -> Duration {
        Duration::from_millis(self.camera_frame_interval_ms)
    }

    pub fn max_loop_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_loop_duration_secs.max(0.0))
    }

    pub fn notification_cooldown(&self) -> Duration {
        Duration::from_secs(self.notification_cooldown_secs)
    }

    pub fn outbox_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.outbox_drain_timeout_secs)
    }

    fn apply_env_overrides(&mut self) {
        let Ok(raw) = std::env::var(MAX_LOOP_ENV) else {
            return;
        };
        match raw.trim().parse::<f64>() {
            Ok(secs) if secs >= 0.0 => self.max_loop_duration_secs = secs,
            _ => log::warn!("ignoring {MAX_LOOP_ENV}={raw:?}: not a non-negative number"),
        }
    }
}

pub struct ConfigStore;

impl ConfigStore {
    /// Reads the config at `path`, falling back to defaults when the file
    /// does not exist. Environment overrides are applied last.
    pub fn load(path: &Path) -> Result<MonitorConfig> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config in {}", path.display()))?
        } else {
            log::info!("No config at {}, using defaults", path.display());
            MonitorConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save(path: &Path, config: &MonitorConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(config)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
