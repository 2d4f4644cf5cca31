use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reading::{AnomalyLabel, Reading};

pub const NO_ALERT_MESSAGE: &str = "No alert needed";

/// Camera evidence gathered over one sampling window. Not persisted beyond
/// the decision it was taken for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraSample {
    pub motion_detected: bool,
    pub face_detected: bool,
}

/// Identifies the reading a decision was made for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadingRef {
    /// Position in the telemetry stream.
    pub sequence: usize,
    pub timestamp: DateTime<Utc>,
}

/// Final per-reading outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub reading_ref: ReadingRef,
    pub reading: Reading,
    pub anomaly_label: AnomalyLabel,
    pub anomaly_score: f64,
    pub rule_triggered: bool,
    pub risk_flag: bool,
    pub camera_sample: Option<CameraSample>,
    pub decision_flag: bool,
    pub alert_message: String,
}

impl Decision {
    pub fn is_alert(&self) -> bool {
        self.decision_flag
    }
}
