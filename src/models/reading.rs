use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of physiological features fed to the anomaly scorer.
pub const FEATURE_DIM: usize = 3;

/// Column names, in feature-vector order.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = ["heart_rate", "oxygen_saturation", "glucose"];

pub type FeatureVector = [f64; FEATURE_DIM];

/// A single physiological sample from the telemetry stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
    pub glucose: f64,
}

impl Reading {
    pub fn features(&self) -> FeatureVector {
        [self.heart_rate, self.oxygen_saturation, self.glucose]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyLabel {
    Normal,
    Anomalous,
}

impl AnomalyLabel {
    pub fn is_anomalous(self) -> bool {
        matches!(self, AnomalyLabel::Anomalous)
    }
}

/// A reading with the scorer's verdict attached.
///
/// `anomaly_score` is higher for more normal points; negative scores fall
/// outside the learned envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoredReading {
    pub reading: Reading,
    pub anomaly_label: AnomalyLabel,
    pub anomaly_score: f64,
}
