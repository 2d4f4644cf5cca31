use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    #[default]
    Idle,
    Running,
    Completed,
    TimedOut,
}

/// Run state of one pass over the telemetry stream.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub status: LoopStatus,
    pub started_at: Option<DateTime<Utc>>,
    max_duration: Duration,
    running_anchor: Option<Instant>,
}

impl LoopState {
    pub fn new(max_duration: Duration) -> Self {
        Self {
            status: LoopStatus::default(),
            started_at: None,
            max_duration,
            running_anchor: None,
        }
    }

    /// Idle -> Running. No-op once running.
    pub fn begin(&mut self, now: Instant) {
        if self.status == LoopStatus::Idle {
            self.status = LoopStatus::Running;
            self.started_at = Some(Utc::now());
            self.running_anchor = Some(now);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.running_anchor
            .map(|anchor| anchor.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Only meaningful while running. A zero budget is exceeded immediately.
    pub fn deadline_exceeded(&self) -> bool {
        self.status == LoopStatus::Running && self.elapsed() >= self.max_duration
    }

    pub fn time_out(&mut self) {
        if self.status == LoopStatus::Running {
            self.status = LoopStatus::TimedOut;
        }
    }

    /// Stream exhausted. An empty stream goes straight from Idle.
    pub fn complete(&mut self) {
        if matches!(self.status, LoopStatus::Idle | LoopStatus::Running) {
            self.status = LoopStatus::Completed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_times_out_on_first_check() {
        let mut state = LoopState::new(Duration::ZERO);
        state.begin(Instant::now());
        assert_eq!(state.status, LoopStatus::Running);
        assert!(state.deadline_exceeded());
        state.time_out();
        assert_eq!(state.status, LoopStatus::TimedOut);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut state = LoopState::new(Duration::from_secs(60));
        state.begin(Instant::now());
        assert!(!state.deadline_exceeded());
        state.complete();
        state.time_out();
        state.begin(Instant::now());
        assert_eq!(state.status, LoopStatus::Completed);
    }

    #[test]
    fn idle_state_never_reports_a_deadline() {
        let state = LoopState::new(Duration::ZERO);
        assert!(!state.deadline_exceeded());
    }

    #[test]
    fn fresh_state_is_idle() {
        assert_eq!(LoopStatus::default(), LoopStatus::Idle);
        let state = LoopState::new(Duration::from_secs(60));
        assert_eq!(state.status, LoopStatus::Idle);
        assert_eq!(state.started_at, None);
    }
}
