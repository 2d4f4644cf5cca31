use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::alerts::DeliveryOutcome;
use crate::models::Decision;

use super::state::LoopStatus;

#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub run_id: Uuid,
    pub status: LoopStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    /// One per processed reading, in stream order.
    pub decisions: Vec<Decision>,
    /// Readings left unconsumed after a timeout.
    pub unprocessed: usize,
    /// Sequences whose processing failed; they have no decision.
    pub failed_rows: Vec<usize>,
    pub camera_invocations: usize,
    pub deliveries: Vec<DeliveryOutcome>,
}

impl MonitorReport {
    pub fn alerts(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|decision| decision.is_alert())
    }

    pub fn consumed(&self) -> usize {
        self.decisions.len() + self.failed_rows.len()
    }
}
