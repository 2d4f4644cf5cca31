use crate::models::Reading;

/// Hard clinical thresholds. Either one tripping marks a reading at risk
/// regardless of what the statistical model says.
#[derive(Debug, Clone, Copy)]
pub struct RuleEngine {
    /// Tachycardia: strictly above this many beats per minute.
    pub heart_rate_max: f64,
    /// Hypoxemia: strictly below this SpO2 percentage.
    pub oxygen_saturation_min: f64,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self {
            heart_rate_max: 120.0,
            oxygen_saturation_min: 85.0,
        }
    }
}

impl RuleEngine {
    pub fn evaluate(&self, reading: &Reading) -> bool {
        reading.heart_rate > self.heart_rate_max
            || reading.oxygen_saturation < self.oxygen_saturation_min
    }
}
