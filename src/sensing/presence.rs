use image::GrayImage;

/// Detects a person in a grayscale frame (frontal face, profile face, ...).
pub trait PresenceDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Number of regions found in `frame`.
    fn detect(&self, frame: &GrayImage) -> usize;
}

/// True when any detector reports at least one region. Stops at the first hit.
pub fn any_present(detectors: &[std::sync::Arc<dyn PresenceDetector>], frame: &GrayImage) -> bool {
    detectors.iter().any(|detector| {
        let regions = detector.detect(frame);
        if regions > 0 {
            log::trace!("{} found {} region(s)", detector.name(), regions);
        }
        regions > 0
    })
}
