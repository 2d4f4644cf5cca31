use image::GrayImage;

/// Mean absolute per-pixel intensity difference between two grayscale
/// frames, in `[0, 255]`.
///
/// Frames of different dimensions are treated as a full scene change and
/// return `f64::INFINITY`.
pub fn mean_abs_diff(previous: &GrayImage, current: &GrayImage) -> f64 {
    if previous.dimensions() != current.dimensions() {
        return f64::INFINITY;
    }

    let pixel_count = previous.as_raw().len();
    if pixel_count == 0 {
        return 0.0;
    }

    let total: u64 = previous
        .as_raw()
        .iter()
        .zip(current.as_raw())
        .map(|(a, b)| u64::from(a.abs_diff(*b)))
        .sum();

    total as f64 / pixel_count as f64
}
