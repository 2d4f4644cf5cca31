use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::alerts::{AlertOutbox, Notifier, OutboundAlert};
use crate::config::MonitorConfig;
use crate::models::{CameraSample, Decision, FeatureVector, Reading, ReadingRef, ScoredReading};
use crate::policy::DecisionPolicy;
use crate::scoring::{ForestParams, IsolationForest};
use crate::sensing::CameraCorroborator;

use super::decision_log::DecisionLog;
use super::report::MonitorReport;
use super::state::{LoopState, LoopStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Drives readings through scoring, rules, camera corroboration and the
/// decision policy, strictly one reading at a time.
pub struct MonitorLoop {
    config: MonitorConfig,
    policy: DecisionPolicy,
    camera: Option<Arc<CameraCorroborator>>,
    notifier: Option<(Arc<dyn Notifier>, String)>,
}

impl MonitorLoop {
    pub fn new(config: MonitorConfig) -> Self {
        let policy = DecisionPolicy::new(config.policy);
        Self {
            config,
            policy,
            camera: None,
            notifier: None,
        }
    }

    pub fn with_camera(mut self, camera: CameraCorroborator) -> Self {
        self.camera = Some(Arc::new(camera));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, destination: impl Into<String>) -> Self {
        self.notifier = Some((notifier, destination.into()));
        self
    }

    /// Fits the anomaly scorer once over every reading, then runs the loop.
    /// Fit failures are fatal: no reading is decided without a model.
    pub async fn run(&self, readings: &[Reading]) -> Result<MonitorReport> {
        let batch: Vec<FeatureVector> = readings.iter().map(Reading::features).collect();
        let forest = IsolationForest::fit(&batch, ForestParams::from(&self.config))
            .context("failed to fit anomaly scorer")?;

        let scored = readings
            .iter()
            .map(|reading| forest.score_reading(reading))
            .collect();

        Ok(self.run_scored(scored).await)
    }

    /// Runs the loop over readings that already carry an anomaly verdict.
    /// Must be called from within a tokio runtime.
    pub async fn run_scored(&self, scored: Vec<ScoredReading>) -> MonitorReport {
        let run_id = Uuid::new_v4();
        let total = scored.len();
        let mut state = LoopState::new(self.config.max_loop_duration());
        let mut decisions = DecisionLog::new();
        let mut failed_rows = Vec::new();
        let mut camera_invocations = 0;
        let mut unprocessed = 0;

        let mut outbox = self.notifier.as_ref().map(|(notifier, destination)| {
            AlertOutbox::start(
                Arc::clone(notifier),
                destination.clone(),
                self.config.notification_cooldown(),
            )
        });

        log_info!(
            "monitor run {run_id} starting over {total} reading(s), policy {:?}",
            self.policy.strategy()
        );

        for (sequence, reading) in scored.iter().enumerate() {
            state.begin(Instant::now());

            if state.deadline_exceeded() {
                state.time_out();
                unprocessed = total - sequence;
                log_warn!(
                    "monitor run {run_id} timed out after {}ms, {unprocessed} reading(s) left unprocessed",
                    state.elapsed().as_millis()
                );
                break;
            }

            match self.process(sequence, reading, &mut camera_invocations).await {
                Ok(decision) => {
                    if decision.is_alert() {
                        if let Some(outbox) = outbox.as_mut() {
                            outbox.enqueue(OutboundAlert::from_decision(&decision));
                        }
                    }
                    log_debug!(
                        "reading #{sequence} at {}: risk={} alert={}",
                        reading.reading.timestamp,
                        decision.risk_flag,
                        decision.decision_flag
                    );
                    decisions.append(decision);
                }
                Err(err) => {
                    log_error!(
                        "reading #{sequence} at {} failed, continuing: {err:?}",
                        reading.reading.timestamp
                    );
                    failed_rows.push(sequence);
                }
            }
        }

        state.complete();
        let decided = decisions.len();

        let deliveries = match outbox.take() {
            Some(outbox) => outbox.shutdown(self.config.outbox_drain_timeout()).await,
            None => Vec::new(),
        };

        let report = MonitorReport {
            run_id,
            status: state.status,
            started_at: state.started_at,
            elapsed_ms: state.elapsed().as_millis() as u64,
            decisions: decisions.into_entries(),
            unprocessed,
            failed_rows,
            camera_invocations,
            deliveries,
        };

        let finished = match report.status {
            LoopStatus::TimedOut => "timed out",
            _ => "completed",
        };
        log_info!(
            "monitor run {run_id} {finished}: {decided} decision(s), {} alert(s), {} failed, {} unprocessed",
            report.alerts().count(),
            report.failed_rows.len(),
            report.unprocessed
        );

        report
    }

    async fn process(
        &self,
        sequence: usize,
        scored: &ScoredReading,
        camera_invocations: &mut usize,
    ) -> Result<Decision> {
        let reading_ref = ReadingRef {
            sequence,
            timestamp: scored.reading.timestamp,
        };
        let risk = self.policy.assess(scored);

        let camera = if risk.risk_flag {
            self.corroborate(camera_invocations).await?
        } else {
            None
        };

        Ok(self.policy.decide(reading_ref, scored, risk, camera))
    }

    /// Samples the camera on a blocking worker and waits for the full window.
    /// A device failure means no evidence, not an error.
    async fn corroborate(&self, camera_invocations: &mut usize) -> Result<Option<CameraSample>> {
        let Some(camera) = &self.camera else {
            return Ok(None);
        };
        *camera_invocations += 1;

        let camera = Arc::clone(camera);
        let sampled = tokio::task::spawn_blocking(move || camera.sample())
            .await
            .context("camera sampling worker failed")?;

        match sampled {
            Ok(sample) => Ok(Some(sample)),
            Err(err) => {
                log_warn!("no camera corroboration available: {err}");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{DeliveryReport, DeliveryStatus};
    use crate::error::CameraError;
    use crate::models::{AnomalyLabel, NO_ALERT_MESSAGE};
    use crate::policy::PolicyStrategy;
    use crate::sensing::{FrameStream, PresenceDetector, SamplingParams, VideoDevice};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use image::{DynamicImage, GrayImage, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingDevice {
        opens: Arc<AtomicUsize>,
        fail_open: bool,
    }

    struct AlternatingStream {
        tick: u8,
    }

    impl FrameStream for AlternatingStream {
        fn read_frame(&mut self) -> Result<DynamicImage, CameraError> {
            self.tick = self.tick.wrapping_add(1);
            let level = if self.tick % 2 == 0 { 30 } else { 120 };
            Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([level]))))
        }

        fn release(&mut self) {}
    }

    impl VideoDevice for CountingDevice {
        fn describe(&self) -> String {
            "counting".into()
        }

        fn open(&self) -> Result<Box<dyn FrameStream>, CameraError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(CameraError::DeviceUnavailable("busy".into()));
            }
            Ok(Box::new(AlternatingStream { tick: 0 }))
        }
    }

    struct AlwaysFace;

    impl PresenceDetector for AlwaysFace {
        fn name(&self) -> &str {
            "always"
        }

        fn detect(&self, _frame: &GrayImage) -> usize {
            1
        }
    }

    struct CrashingDetector;

    impl PresenceDetector for CrashingDetector {
        fn name(&self) -> &str {
            "crashing"
        }

        fn detect(&self, _frame: &GrayImage) -> usize {
            panic!("cascade file corrupted");
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        texts: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, _destination: &str, text: &str) -> DeliveryReport {
            self.texts.lock().unwrap().push(text.to_string());
            DeliveryReport::delivered()
        }
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            camera_sample_duration_secs: 0.01,
            camera_frame_interval_ms: 1,
            ..MonitorConfig::default()
        }
    }

    fn camera(
        fail_open: bool,
        detectors: Vec<Arc<dyn PresenceDetector>>,
    ) -> (CameraCorroborator, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let device = Arc::new(CountingDevice {
            opens: Arc::clone(&opens),
            fail_open,
        });
        let corroborator =
            CameraCorroborator::new(device, detectors, SamplingParams::from(&test_config()));
        (corroborator, opens)
    }

    fn scored(seq: i64, heart_rate: f64, oxygen_saturation: f64, label: AnomalyLabel) -> ScoredReading {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        ScoredReading {
            reading: Reading {
                timestamp: start + ChronoDuration::seconds(seq),
                heart_rate,
                oxygen_saturation,
                glucose: 100.0,
            },
            anomaly_label: label,
            anomaly_score: if label.is_anomalous() { -0.02 } else { 0.05 },
        }
    }

    fn mixed_stream() -> Vec<ScoredReading> {
        vec![
            scored(0, 75.0, 97.0, AnomalyLabel::Normal),
            scored(1, 130.0, 97.0, AnomalyLabel::Normal),
            scored(2, 78.0, 96.0, AnomalyLabel::Anomalous),
            scored(3, 72.0, 82.0, AnomalyLabel::Normal),
            scored(4, 80.0, 98.0, AnomalyLabel::Normal),
        ]
    }

    #[tokio::test]
    async fn camera_runs_once_per_at_risk_reading_only() {
        let (camera, opens) = camera(false, Vec::new());
        let monitor = MonitorLoop::new(test_config()).with_camera(camera);

        let report = monitor.run_scored(mixed_stream()).await;

        assert_eq!(report.status, LoopStatus::Completed);
        assert_eq!(report.decisions.len(), 5);
        assert_eq!(opens.load(Ordering::SeqCst), 3);
        assert_eq!(report.camera_invocations, 3);

        let flags: Vec<bool> = report.decisions.iter().map(|d| d.decision_flag).collect();
        assert_eq!(flags, vec![false, true, true, true, false]);
        assert_eq!(report.decisions[0].alert_message, NO_ALERT_MESSAGE);
        assert_eq!(report.decisions[0].camera_sample, None);
        assert!(report.decisions[1].camera_sample.unwrap().motion_detected);
    }

    #[tokio::test]
    async fn decisions_keep_stream_order() {
        let monitor = MonitorLoop::new(test_config());
        let report = monitor.run_scored(mixed_stream()).await;
        let sequences: Vec<usize> = report
            .decisions
            .iter()
            .map(|d| d.reading_ref.sequence)
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn unavailable_camera_fails_open() {
        let (camera, opens) = camera(true, Vec::new());
        let monitor = MonitorLoop::new(MonitorConfig {
            policy: PolicyStrategy::Corroborated,
            ..test_config()
        })
        .with_camera(camera);

        let report = monitor
            .run_scored(vec![scored(0, 140.0, 90.0, AnomalyLabel::Normal)])
            .await;

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        let decision = &report.decisions[0];
        assert_eq!(decision.camera_sample, None);
        assert!(decision.decision_flag);
        assert!(decision.alert_message.contains("140.0 bpm"));
    }

    #[tokio::test]
    async fn corroborated_policy_suppresses_when_a_face_is_seen() {
        let (camera, _) = camera(false, vec![Arc::new(AlwaysFace)]);
        let monitor = MonitorLoop::new(MonitorConfig {
            policy: PolicyStrategy::Corroborated,
            ..test_config()
        })
        .with_camera(camera);

        let report = monitor
            .run_scored(vec![scored(0, 140.0, 90.0, AnomalyLabel::Normal)])
            .await;

        let decision = &report.decisions[0];
        assert!(decision.risk_flag);
        assert!(!decision.decision_flag);
        assert_eq!(decision.alert_message, NO_ALERT_MESSAGE);
    }

    #[tokio::test]
    async fn zero_budget_times_out_without_decisions() {
        let monitor = MonitorLoop::new(MonitorConfig {
            max_loop_duration_secs: 0.0,
            ..test_config()
        });

        let report = monitor.run_scored(mixed_stream()).await;

        assert_eq!(report.status, LoopStatus::TimedOut);
        assert!(report.decisions.is_empty());
        assert_eq!(report.unprocessed, 5);
    }

    #[tokio::test]
    async fn crashing_sample_is_isolated_to_its_reading() {
        let (camera, _) = camera(false, vec![Arc::new(CrashingDetector)]);
        let monitor = MonitorLoop::new(test_config()).with_camera(camera);

        let report = monitor.run_scored(mixed_stream()).await;

        assert_eq!(report.status, LoopStatus::Completed);
        assert_eq!(report.failed_rows, vec![1, 2, 3]);
        assert_eq!(report.decisions.len(), 2);
        assert_eq!(report.consumed(), 5);
    }

    #[tokio::test]
    async fn alerts_are_handed_to_the_notifier() {
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = MonitorLoop::new(test_config()).with_notifier(notifier.clone(), "ward-7");

        let report = monitor.run_scored(mixed_stream()).await;

        assert_eq!(report.deliveries.len(), 3);
        assert!(report
            .deliveries
            .iter()
            .all(|outcome| outcome.status == DeliveryStatus::Delivered));
        let texts = notifier.texts.lock().unwrap();
        assert!(texts[0].contains("130.0 bpm"));
    }

    #[tokio::test]
    async fn fit_failure_is_fatal() {
        let monitor = MonitorLoop::new(test_config());
        assert!(monitor.run(&[]).await.is_err());
    }
}
