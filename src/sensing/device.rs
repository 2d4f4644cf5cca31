//! Video source boundary.
//!
//! A `VideoDevice` opens a fresh `FrameStream` per sampling window. The
//! stream is held by a `CaptureSession`, which releases it on drop so the
//! device is freed on every exit path, unwinding included.

use image::DynamicImage;

use crate::error::CameraError;

pub trait FrameStream: Send {
    /// Blocks until the next frame is available.
    fn read_frame(&mut self) -> Result<DynamicImage, CameraError>;

    /// Frees the device and any buffered frame. Must be idempotent.
    fn release(&mut self);
}

pub trait VideoDevice: Send + Sync {
    /// Index or URI, for logs.
    fn describe(&self) -> String;

    fn open(&self) -> Result<Box<dyn FrameStream>, CameraError>;
}

/// Exclusive hold on an opened stream for the lifetime of one sampling call.
pub struct CaptureSession {
    stream: Box<dyn FrameStream>,
}

impl CaptureSession {
    pub fn acquire(device: &dyn VideoDevice) -> Result<Self, CameraError> {
        let stream = device.open()?;
        log::debug!("capture session opened on {}", device.describe());
        Ok(Self { stream })
    }

    pub fn read_frame(&mut self) -> Result<DynamicImage, CameraError> {
        self.stream.read_frame()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stream.release();
        log::debug!("capture session released");
    }
}
