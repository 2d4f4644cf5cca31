//! Fuses the anomaly label, the clinical rules and optional camera evidence
//! into one decision per reading.

use serde::{Deserialize, Serialize};

use crate::alerts::AlertComposer;
use crate::models::{CameraSample, Decision, ReadingRef, ScoredReading, NO_ALERT_MESSAGE};
use crate::scoring::RuleEngine;

/// How camera evidence feeds into the final decision.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStrategy {
    /// Alert on every at-risk reading. Camera evidence is recorded for
    /// audit only.
    #[default]
    RiskOnly,
    /// Alert only when the camera saw motion and no face. Without a camera
    /// sample this falls back to the risk flag.
    Corroborated,
}

impl PolicyStrategy {
    pub fn combine(self, risk_flag: bool, camera: Option<CameraSample>) -> bool {
        match self {
            PolicyStrategy::RiskOnly => risk_flag,
            PolicyStrategy::Corroborated => {
                risk_flag
                    && camera
                        .map(|sample| sample.motion_detected && !sample.face_detected)
                        .unwrap_or(true)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskAssessment {
    pub rule_triggered: bool,
    pub risk_flag: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionPolicy {
    strategy: PolicyStrategy,
    rules: RuleEngine,
    composer: AlertComposer,
}

impl DecisionPolicy {
    pub fn new(strategy: PolicyStrategy) -> Self {
        Self {
            strategy,
            rules: RuleEngine::default(),
            composer: AlertComposer,
        }
    }

    pub fn strategy(&self) -> PolicyStrategy {
        self.strategy
    }

    /// Either an anomalous label or a tripped rule puts the reading at risk.
    pub fn assess(&self, scored: &ScoredReading) -> RiskAssessment {
        let rule_triggered = self.rules.evaluate(&scored.reading);
        RiskAssessment {
            rule_triggered,
            risk_flag: scored.anomaly_label.is_anomalous() || rule_triggered,
        }
    }

    pub fn decide(
        &self,
        reading_ref: ReadingRef,
        scored: &ScoredReading,
        risk: RiskAssessment,
        camera: Option<CameraSample>,
    ) -> Decision {
        let decision_flag = self.strategy.combine(risk.risk_flag, camera);
        let alert_message = if decision_flag {
            self.composer.compose(scored)
        } else {
            NO_ALERT_MESSAGE.to_string()
        };

        Decision {
            reading_ref,
            reading: scored.reading,
            anomaly_label: scored.anomaly_label,
            anomaly_score: scored.anomaly_score,
            rule_triggered: risk.rule_triggered,
            risk_flag: risk.risk_flag,
            camera_sample: camera,
            decision_flag,
            alert_message,
        }
    }
}
