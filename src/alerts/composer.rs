use crate::models::ScoredReading;

pub const CALL_TO_ACTION: &str = "Immediate attention required: check on the patient now.";

/// Renders the alert payload. Non-finite values are rendered as-is
/// (`NaN`, `inf`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertComposer;

impl AlertComposer {
    pub fn compose(&self, scored: &ScoredReading) -> String {
        let reading = &scored.reading;
        format!(
            "EMERGENCY ALERT\n\
             Abnormal vital signs detected.\n\
             Heart rate: {:.1} bpm\n\
             Oxygen saturation: {:.1}%\n\
             Glucose: {:.1} mg/dL\n\
             Risk score: {:.3}\n\
             {}",
            reading.heart_rate,
            reading.oxygen_saturation,
            reading.glucose,
            scored.anomaly_score,
            CALL_TO_ACTION,
        )
    }
}
