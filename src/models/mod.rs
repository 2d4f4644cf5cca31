pub mod decision;
pub mod reading;

pub use decision::{CameraSample, Decision, ReadingRef, NO_ALERT_MESSAGE};
pub use reading::{AnomalyLabel, FeatureVector, Reading, ScoredReading, FEATURE_DIM, FEATURE_NAMES};
