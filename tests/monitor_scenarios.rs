use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::{Duration, TimeZone, Utc};
use image::{DynamicImage, GrayImage, Luma};
use rand::{rngs::StdRng, Rng, SeedableRng};

use vitalguard_lib::config::MonitorConfig;
use vitalguard_lib::error::CameraError;
use vitalguard_lib::models::{AnomalyLabel, Reading, ScoredReading, NO_ALERT_MESSAGE};
use vitalguard_lib::monitor::{LoopStatus, MonitorLoop};
use vitalguard_lib::scoring::RuleEngine;
use vitalguard_lib::sensing::{CameraCorroborator, FrameStream, SamplingParams, VideoDevice};

struct StillCamera {
    opens: Arc<AtomicUsize>,
    broken: bool,
}

struct StillStream;

impl FrameStream for StillStream {
    fn read_frame(&mut self) -> Result<DynamicImage, CameraError> {
        Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([64]))))
    }

    fn release(&mut self) {}
}

impl VideoDevice for StillCamera {
    fn describe(&self) -> String {
        "still".into()
    }

    fn open(&self) -> Result<Box<dyn FrameStream>, CameraError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(CameraError::DeviceUnavailable("no such device".into()));
        }
        Ok(Box::new(StillStream))
    }
}

fn config() -> MonitorConfig {
    MonitorConfig {
        camera_sample_duration_secs: 0.005,
        camera_frame_interval_ms: 1,
        ..MonitorConfig::default()
    }
}

fn monitor_with_camera(config: MonitorConfig, broken: bool) -> (MonitorLoop, Arc<AtomicUsize>) {
    let opens = Arc::new(AtomicUsize::new(0));
    let device = Arc::new(StillCamera {
        opens: Arc::clone(&opens),
        broken,
    });
    let camera = CameraCorroborator::new(device, Vec::new(), SamplingParams::from(&config));
    (MonitorLoop::new(config).with_camera(camera), opens)
}

fn reading(seq: i64, heart_rate: f64, oxygen_saturation: f64, glucose: f64) -> Reading {
    Reading {
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::seconds(seq),
        heart_rate,
        oxygen_saturation,
        glucose,
    }
}

fn telemetry(rows: usize) -> Vec<Reading> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..rows)
        .map(|i| {
            let (hr, spo2) = match i % 17 {
                5 => (rng.gen_range(121.0..150.0), rng.gen_range(92.0..99.0)),
                11 => (rng.gen_range(70.0..90.0), rng.gen_range(78.0..84.9)),
                _ => (rng.gen_range(62.0..95.0), rng.gen_range(94.0..100.0)),
            };
            reading(i as i64, hr, spo2, rng.gen_range(80.0..130.0))
        })
        .collect()
}

#[tokio::test]
async fn every_reading_gets_one_decision_and_risk_drives_the_camera() {
    let readings = telemetry(60);
    let (monitor, opens) = monitor_with_camera(config(), false);

    let report = monitor.run(&readings).await.unwrap();

    assert_eq!(report.status, LoopStatus::Completed);
    assert_eq!(report.decisions.len(), readings.len());

    let rules = RuleEngine::default();
    let mut at_risk = 0;
    for (decision, reading) in report.decisions.iter().zip(&readings) {
        assert_eq!(decision.reading, *reading);
        let expected_risk = decision.anomaly_label == AnomalyLabel::Anomalous || rules.evaluate(reading);
        assert_eq!(decision.risk_flag, expected_risk);

        if decision.risk_flag {
            at_risk += 1;
            assert!(decision.camera_sample.is_some());
            assert!(decision.decision_flag);
            assert!(decision.alert_message.contains("bpm"));
        } else {
            assert!(decision.camera_sample.is_none());
            assert!(!decision.decision_flag);
            assert_eq!(decision.alert_message, NO_ALERT_MESSAGE);
        }
    }

    assert!(at_risk >= 7, "rule-tripping rows alone account for 7");
    assert_eq!(opens.load(Ordering::SeqCst), at_risk);
    assert_eq!(report.camera_invocations, at_risk);
}

#[tokio::test]
async fn same_batch_and_seed_give_identical_verdicts() {
    let readings = telemetry(80);
    let monitor = MonitorLoop::new(config());

    let first = monitor.run(&readings).await.unwrap();
    let second = monitor.run(&readings).await.unwrap();

    let verdicts = |report: &vitalguard_lib::monitor::MonitorReport| -> Vec<(AnomalyLabel, f64)> {
        report
            .decisions
            .iter()
            .map(|d| (d.anomaly_label, d.anomaly_score))
            .collect()
    };
    assert_eq!(verdicts(&first), verdicts(&second));
}

#[tokio::test]
async fn anomalous_but_clinically_normal_row_still_alerts() {
    let (monitor, _) = monitor_with_camera(config(), false);
    let row = ScoredReading {
        reading: reading(3, 82.6, 99.7, 105.4),
        anomaly_label: AnomalyLabel::Anomalous,
        anomaly_score: -0.003_24,
    };

    let report = monitor.run_scored(vec![row]).await;
    let decision = &report.decisions[0];

    assert!(decision.decision_flag);
    for fragment in ["82.6 bpm", "99.7%", "105.4 mg/dL", "-0.003"] {
        assert!(
            decision.alert_message.contains(fragment),
            "missing {fragment:?} in {}",
            decision.alert_message
        );
    }
}

#[tokio::test]
async fn normal_row_skips_the_camera() {
    let (monitor, opens) = monitor_with_camera(config(), false);
    let row = ScoredReading {
        reading: reading(0, 75.0, 97.0, 100.0),
        anomaly_label: AnomalyLabel::Normal,
        anomaly_score: 0.04,
    };

    let report = monitor.run_scored(vec![row]).await;

    assert!(!report.decisions[0].decision_flag);
    assert_eq!(report.decisions[0].alert_message, NO_ALERT_MESSAGE);
    assert_eq!(opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_budget_records_nothing() {
    let monitor = MonitorLoop::new(MonitorConfig {
        max_loop_duration_secs: 0.0,
        ..config()
    });

    let report = monitor.run(&telemetry(20)).await.unwrap();

    assert_eq!(report.status, LoopStatus::TimedOut);
    assert!(report.decisions.is_empty());
    assert_eq!(report.unprocessed, 20);
}

#[tokio::test]
async fn broken_camera_still_yields_a_decision() {
    let (monitor, opens) = monitor_with_camera(config(), true);
    let row = ScoredReading {
        reading: reading(0, 128.0, 95.0, 100.0),
        anomaly_label: AnomalyLabel::Normal,
        anomaly_score: 0.01,
    };

    let report = monitor.run_scored(vec![row]).await;
    let decision = &report.decisions[0];

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert!(decision.risk_flag);
    assert_eq!(decision.decision_flag, decision.risk_flag);
    assert_eq!(decision.camera_sample, None);
}

#[tokio::test]
async fn constant_feature_column_refuses_to_start() {
    let readings: Vec<Reading> = (0..10).map(|i| reading(i, 70.0 + i as f64, 98.0, 100.0 + i as f64)).collect();
    let monitor = MonitorLoop::new(config());

    let err = monitor.run(&readings).await.unwrap_err();
    assert!(format!("{err:#}").contains("oxygen_saturation"));
}
