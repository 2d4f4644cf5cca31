pub mod alerts;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod policy;
pub mod scoring;
pub mod sensing;
pub mod telemetry;
mod utils;

use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use alerts::{HttpNotifier, LogNotifier, Notifier};
use config::{ConfigStore, MonitorConfig};
use monitor::MonitorLoop;
use sensing::{CameraCorroborator, FrameDirectoryDevice, SamplingParams};

const USAGE: &str = "usage: vitalguard <telemetry.jsonl> [config.json]";
const DEFAULT_CONFIG: &str = "vitalguard.json";
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn build_notifier(config: &MonitorConfig) -> Result<(Arc<dyn Notifier>, String)> {
    match &config.notifier {
        Some(settings) => {
            let notifier = HttpNotifier::new(settings.endpoint.clone())?;
            Ok((Arc::new(notifier), settings.destination.clone()))
        }
        None => {
            warn!("No notifier configured; alerts will only be logged");
            Ok((Arc::new(LogNotifier), "log".to_string()))
        }
    }
}

fn build_monitor(config: MonitorConfig, notifier: Arc<dyn Notifier>, destination: String) -> MonitorLoop {
    let camera = config.video_source.as_ref().map(|source| {
        info!("Camera corroboration from {source}");
        CameraCorroborator::new(
            Arc::new(FrameDirectoryDevice::new(source)),
            Vec::new(),
            SamplingParams::from(&config),
        )
    });
    if camera.is_none() {
        warn!("No video source configured; decisions proceed without camera evidence");
    }

    let monitor = MonitorLoop::new(config).with_notifier(notifier, destination);
    match camera {
        Some(camera) => monitor.with_camera(camera),
        None => monitor,
    }
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(telemetry_path) = args.next().map(PathBuf::from) else {
        bail!(USAGE);
    };
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = ConfigStore::load(&config_path)?;
    let readings = telemetry::load_jsonl(&telemetry_path)
        .with_context(|| format!("Failed to load telemetry from {}", telemetry_path.display()))?;
    info!("Loaded {} reading(s) from {}", readings.len(), telemetry_path.display());

    // The notifier may hold a blocking HTTP client; keep a handle here so it
    // is dropped outside the runtime.
    let (notifier, destination) = build_notifier(&config)?;
    let monitor = build_monitor(config, Arc::clone(&notifier), destination);

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let report = runtime.block_on(monitor.run(&readings))?;
    // A send abandoned by the outbox may still be blocking a pool thread.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for decision in &report.decisions {
        serde_json::to_writer(&mut out, decision)?;
        writeln!(out)?;
    }

    info!(
        "Run {} finished {:?}: {} alert(s), {} delivery outcome(s), {} camera sample(s)",
        report.run_id,
        report.status,
        report.alerts().count(),
        report.deliveries.len(),
        report.camera_invocations
    );

    drop(monitor);
    drop(notifier);
    Ok(())
}
