use std::{
    fs,
    path::{Path, PathBuf},
};

use image::DynamicImage;

use crate::error::CameraError;

use super::device::{FrameStream, VideoDevice};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Plays back the image files of a directory, in file-name order, looping
/// at the end. Stands in for a capture device addressed by path.
pub struct FrameDirectoryDevice {
    dir: PathBuf,
}

impl FrameDirectoryDevice {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl VideoDevice for FrameDirectoryDevice {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn open(&self) -> Result<Box<dyn FrameStream>, CameraError> {
        let frames = list_frames(&self.dir)?;
        if frames.is_empty() {
            return Err(CameraError::DeviceUnavailable(format!(
                "no frames in {}",
                self.dir.display()
            )));
        }
        Ok(Box::new(FrameDirectoryStream {
            frames,
            cursor: 0,
            released: false,
        }))
    }
}

struct FrameDirectoryStream {
    frames: Vec<PathBuf>,
    cursor: usize,
    released: bool,
}

impl FrameStream for FrameDirectoryStream {
    fn read_frame(&mut self) -> Result<DynamicImage, CameraError> {
        if self.released {
            return Err(CameraError::FrameRead("stream already released".into()));
        }

        let path = &self.frames[self.cursor % self.frames.len()];
        self.cursor += 1;
        image::open(path).map_err(|err| CameraError::FrameRead(format!("{}: {err}", path.display())))
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.clear();
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| CameraError::DeviceUnavailable(format!("{}: {err}", dir.display())))?;

    let mut frames: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    frames.sort();
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_frame(dir: &Path, name: &str, value: u8) {
        GrayImage::from_pixel(4, 4, Luma([value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let device = FrameDirectoryDevice::new("/definitely/not/a/camera");
        assert!(matches!(
            device.open(),
            Err(CameraError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();
        let device = FrameDirectoryDevice::new(dir.path());
        assert!(matches!(
            device.open(),
            Err(CameraError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn frames_play_in_name_order_and_loop() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "002.png", 200);
        write_frame(dir.path(), "001.png", 10);

        let mut stream = FrameDirectoryDevice::new(dir.path()).open().unwrap();
        let values: Vec<u8> = (0..3)
            .map(|_| stream.read_frame().unwrap().to_luma8().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(values, vec![10, 200, 10]);
    }

    #[test]
    fn reads_fail_after_release() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "001.png", 10);

        let mut stream = FrameDirectoryDevice::new(dir.path()).open().unwrap();
        stream.release();
        stream.release();
        assert!(matches!(stream.read_frame(), Err(CameraError::FrameRead(_))));
    }
}
