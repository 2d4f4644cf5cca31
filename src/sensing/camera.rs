use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use image::GrayImage;

use crate::config::MonitorConfig;
use crate::error::CameraError;
use crate::models::CameraSample;

use super::device::{CaptureSession, VideoDevice};
use super::motion::mean_abs_diff;
use super::presence::{any_present, PresenceDetector};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub duration: Duration,
    pub motion_threshold: f64,
    pub frame_interval: Duration,
}

impl From<&MonitorConfig> for SamplingParams {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            duration: config.camera_sample_duration(),
            motion_threshold: config.motion_threshold,
            frame_interval: config.camera_frame_interval(),
        }
    }
}

/// What one frame contributed to the window.
#[derive(Debug, Clone, Copy)]
struct FrameObservation {
    motion_score: f64,
    presence: bool,
}

/// Fold state over a sampling window. Both flags are sticky.
#[derive(Debug, Clone, Copy, Default)]
struct SampleAccumulator {
    motion_detected: bool,
    face_detected: bool,
    frames: usize,
}

impl SampleAccumulator {
    fn absorb(self, observation: FrameObservation, motion_threshold: f64) -> Self {
        Self {
            motion_detected: self.motion_detected || observation.motion_score > motion_threshold,
            face_detected: self.face_detected || observation.presence,
            frames: self.frames + 1,
        }
    }

    fn finish(self) -> CameraSample {
        CameraSample {
            motion_detected: self.motion_detected,
            face_detected: self.face_detected,
        }
    }
}

/// Samples a video source for a fixed wall-clock window and reports whether
/// motion and a person were seen. Blocking; call from a blocking context.
pub struct CameraCorroborator {
    device: Arc<dyn VideoDevice>,
    detectors: Vec<Arc<dyn PresenceDetector>>,
    params: SamplingParams,
}

impl CameraCorroborator {
    pub fn new(
        device: Arc<dyn VideoDevice>,
        detectors: Vec<Arc<dyn PresenceDetector>>,
        params: SamplingParams,
    ) -> Self {
        Self {
            device,
            detectors,
            params,
        }
    }

    pub fn sample(&self) -> Result<CameraSample, CameraError> {
        let mut session = CaptureSession::acquire(self.device.as_ref())?;
        let mut previous = session
            .read_frame()
            .map_err(|err| {
                CameraError::DeviceUnavailable(format!("first frame unreadable: {err}"))
            })?
            .to_luma8();

        let started = Instant::now();
        let mut acc = SampleAccumulator::default();

        while started.elapsed() < self.params.duration {
            let remaining = self.params.duration.saturating_sub(started.elapsed());
            let pause = self.params.frame_interval.min(remaining);
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }

            let frame = match session.read_frame() {
                Ok(frame) => frame.to_luma8(),
                Err(err) => {
                    log_warn!(
                        "frame read failed after {} frame(s), closing window early: {err}",
                        acc.frames
                    );
                    break;
                }
            };

            let observation = self.observe(&previous, &frame, acc.face_detected);
            acc = acc.absorb(observation, self.params.motion_threshold);
            previous = frame;
        }

        log_debug!(
            "camera window done: {} frame(s) in {}ms, motion={}, face={}",
            acc.frames,
            started.elapsed().as_millis(),
            acc.motion_detected,
            acc.face_detected
        );

        Ok(acc.finish())
    }

    fn observe(&self, previous: &GrayImage, frame: &GrayImage, face_seen: bool) -> FrameObservation {
        FrameObservation {
            motion_score: mean_abs_diff(previous, frame),
            // Once a face has been seen the flag cannot change; skip the detectors.
            presence: !face_seen && any_present(&self.detectors, frame),
        }
    }
}
