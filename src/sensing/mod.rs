pub mod camera;
pub mod device;
pub mod frame_directory;
pub mod motion;
pub mod presence;

pub use camera::{CameraCorroborator, SamplingParams};
pub use device::{CaptureSession, FrameStream, VideoDevice};
pub use frame_directory::FrameDirectoryDevice;
pub use presence::PresenceDetector;
