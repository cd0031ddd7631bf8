//! Blur detection via the variance of the Laplacian.

use super::CheckOutcome;
use crate::frame::Frame;
use crate::types::LivenessCheck;

/// Laplacian variance below which a frame is considered blurry.
pub const DEFAULT_BLUR_THRESHOLD: f32 = 100.0;

/// Pass when the grayscale Laplacian variance reaches `blur_threshold`.
///
/// A sharp frame is necessary for liveness, not sufficient.
pub fn check_sharpness(frame: &Frame, blur_threshold: f32) -> CheckOutcome {
    let gray = frame.grayscale();
    let variance =
        laplacian_variance(&gray, frame.width() as usize, frame.height() as usize) as f32;

    tracing::debug!(variance, blur_threshold, "sharpness check");

    if variance < blur_threshold {
        CheckOutcome::new(
            LivenessCheck::Sharpness,
            false,
            variance,
            "image too blurry (possible screen replay)",
        )
    } else {
        CheckOutcome::new(LivenessCheck::Sharpness, true, variance, "image clarity ok")
    }
}

/// Variance of the 4-neighbour Laplacian response over the whole image.
///
/// Borders are mirrored without repeating the edge pixel (`dcb|abcd|cba`).
pub fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    let n = width * height;
    if n == 0 || gray.len() < n {
        return 0.0;
    }

    let px = |x: isize, y: isize| -> f64 {
        let x = reflect(x, width);
        let y = reflect(y, height);
        gray[y * width + x] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..height as isize {
        for x in 0..width as isize {
            let lap = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

fn reflect(i: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let r = if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    };
    r.clamp(0, len - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Frame {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .flat_map(|(x, y)| {
                let v = f(x, y);
                [v, v, v]
            })
            .collect();
        Frame::from_rgb(width, height, data).unwrap()
    }

    /// xorshift32 noise, deterministic across runs.
    fn noise(width: u32, height: u32, seed: u32) -> Frame {
        let mut state = seed;
        let values: Vec<u8> = (0..width * height)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state & 0xff) as u8
            })
            .collect();
        gray_frame(width, height, |x, y| values[(y * width + x) as usize])
    }

    #[test]
    fn test_uniform_frame_is_blurry() {
        let frame = gray_frame(32, 32, |_, _| 128);
        let outcome = check_sharpness(&frame, DEFAULT_BLUR_THRESHOLD);
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.reason.contains("too blurry"));
    }

    #[test]
    fn test_noise_frame_is_sharp() {
        let frame = noise(64, 64, 0x9e37_79b9);
        let outcome = check_sharpness(&frame, DEFAULT_BLUR_THRESHOLD);
        assert!(outcome.passed, "noise variance too low: {}", outcome.score);
        assert!(outcome.score > 10_000.0);
    }

    #[test]
    fn test_smooth_gradient_is_blurry() {
        // A linear ramp has zero second derivative away from the borders.
        let frame = gray_frame(64, 64, |x, _| (x * 2) as u8);
        let outcome = check_sharpness(&frame, DEFAULT_BLUR_THRESHOLD);
        assert!(!outcome.passed);
    }

    #[test]
    fn test_checkerboard_known_variance() {
        // Alternating 0/100: interior Laplacian is ±400, mean 0 → variance 160000.
        let gray: Vec<u8> = (0..16)
            .flat_map(|y| (0..16).map(move |x| if (x + y) % 2 == 0 { 0 } else { 100 }))
            .collect();
        let var = laplacian_variance(&gray, 16, 16);
        assert!((var - 160_000.0).abs() < 1e-6, "got {var}");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(laplacian_variance(&[], 0, 0), 0.0);
    }

    #[test]
    fn test_single_pixel() {
        assert_eq!(laplacian_variance(&[200], 1, 1), 0.0);
    }

    #[test]
    fn test_reflect_borders() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(2, 5), 2);
        assert_eq!(reflect(-1, 1), 0);
    }
}
