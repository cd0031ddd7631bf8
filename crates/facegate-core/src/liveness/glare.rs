//! Specular-highlight analysis of the face region.

use super::{CheckOutcome, LivenessConfig, LivenessError};
use crate::frame::{self, Frame};
use crate::types::{FaceBox, LivenessCheck};

/// Share of blown-out pixels above which the face is rejected.
pub const DEFAULT_GLARE_RATIO: f32 = 0.10;

/// Histogram bins (of 256) counted as blown out: values 250–255.
pub const DEFAULT_TOP_BINS: usize = 6;

/// Fail when too much of the face box is clipped to near-maximum brightness.
///
/// Errors if the face box does not overlap the frame.
pub fn check_glare(
    frame: &Frame,
    face: &FaceBox,
    config: &LivenessConfig,
) -> Result<CheckOutcome, LivenessError> {
    let roi = frame.crop(face).ok_or_else(|| {
        LivenessError::internal(
            LivenessCheck::Glare,
            format!(
                "face box {face:?} does not overlap {}x{} frame",
                frame.width(),
                frame.height()
            ),
        )
    })?;

    let ratio = highlight_ratio(&value_histogram(&roi), config.glare_top_bins);

    tracing::debug!(ratio, threshold = config.glare_ratio_threshold, "glare check");

    if ratio > config.glare_ratio_threshold {
        Ok(CheckOutcome::new(
            LivenessCheck::Glare,
            false,
            ratio,
            "excessive glare (possible screen)",
        ))
    } else {
        Ok(CheckOutcome::new(
            LivenessCheck::Glare,
            true,
            ratio,
            "reflection levels normal",
        ))
    }
}

/// 256-bin histogram of the HSV value channel.
pub fn value_histogram(frame: &Frame) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for px in frame.pixels() {
        hist[frame::hsv_value(px) as usize] += 1;
    }
    hist
}

/// Fraction of histogram mass in the `top_bins` brightest bins.
pub fn highlight_ratio(hist: &[u32; 256], top_bins: usize) -> f32 {
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 0.0;
    }
    let start = 256 - top_bins.min(256);
    let high: u64 = hist[start..].iter().map(|&c| c as u64).sum();
    (high as f64 / total as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> Frame {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .flat_map(|(x, y)| f(x, y))
            .collect();
        Frame::from_rgb(width, height, data).unwrap()
    }

    fn whole(frame: &Frame) -> FaceBox {
        FaceBox::new(0, frame.width() as i32, frame.height() as i32, 0)
    }

    #[test]
    fn test_half_blown_out_fails() {
        let f = frame(20, 20, |x, _| if x < 10 { [255, 255, 255] } else { [120, 90, 80] });
        let outcome = check_glare(&f, &whole(&f), &LivenessConfig::default()).unwrap();
        assert!(!outcome.passed);
        assert!((outcome.score - 0.5).abs() < 1e-6);
        assert_eq!(outcome.reason, "excessive glare (possible screen)");
    }

    #[test]
    fn test_normal_gradient_passes() {
        // Brightness ramps 40..=240, never reaching the clipped bins.
        let f = frame(201, 10, |x, _| {
            let v = 40 + x as u8;
            [v, (v as u32 * 8 / 10) as u8, (v as u32 * 7 / 10) as u8]
        });
        let outcome = check_glare(&f, &whole(&f), &LivenessConfig::default()).unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn test_only_face_region_counts() {
        // Bright background, normal face in the middle
        let f = frame(30, 30, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) {
                [150, 110, 90]
            } else {
                [255, 255, 255]
            }
        });
        let face = FaceBox::new(10, 20, 20, 10);
        let outcome = check_glare(&f, &face, &LivenessConfig::default()).unwrap();
        assert!(outcome.passed);
    }

    #[test]
    fn test_ratio_at_threshold_passes() {
        // Exactly 10% clipped: strictly-greater comparison keeps it.
        let f = frame(10, 10, |x, y| if y == 0 && x < 10 { [250, 0, 0] } else { [100, 100, 100] });
        let outcome = check_glare(&f, &whole(&f), &LivenessConfig::default()).unwrap();
        assert!((outcome.score - 0.1).abs() < 1e-6);
        assert!(outcome.passed);
    }

    #[test]
    fn test_value_uses_brightest_channel() {
        // Saturated red highlights are still blown out in V.
        let f = frame(4, 1, |_, _| [252, 10, 10]);
        let hist = value_histogram(&f);
        assert_eq!(hist[252], 4);
        assert_eq!(highlight_ratio(&hist, DEFAULT_TOP_BINS), 1.0);
    }

    #[test]
    fn test_box_outside_frame_is_internal_failure() {
        let f = frame(10, 10, |_, _| [100, 100, 100]);
        let err = check_glare(&f, &FaceBox::new(50, 80, 90, 60), &LivenessConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            LivenessError::InternalCheckFailure {
                check: LivenessCheck::Glare,
                ..
            }
        ));
    }

    #[test]
    fn test_highlight_ratio_empty_histogram() {
        assert_eq!(highlight_ratio(&[0u32; 256], DEFAULT_TOP_BINS), 0.0);
    }
}
