//! Frequency-domain screen/print detection.
//!
//! The grayscale frame is zero-padded to a size with only 2, 3 and 5 as
//! prime factors, transformed with a 2D FFT, and the log-magnitude spectrum
//! is averaged outside a disk around DC. Pixel grids and halftone patterns
//! push that average up.

use super::{CheckOutcome, LivenessConfig};
use crate::frame::Frame;
use crate::types::LivenessCheck;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Radius (px) of the low-frequency disk removed before scoring.
pub const DEFAULT_MASK_RADIUS: usize = 30;

/// Score the frame's high-frequency energy.
///
/// With `moire_max_energy` unset the check always passes and only reports
/// the score.
pub fn check_moire(frame: &Frame, config: &LivenessConfig) -> CheckOutcome {
    let gray = frame.grayscale();
    let energy = high_frequency_energy(
        &gray,
        frame.width() as usize,
        frame.height() as usize,
        config.moire_mask_radius,
    ) as f32;

    tracing::debug!(energy, max = ?config.moire_max_energy, "moire check");

    match config.moire_max_energy {
        Some(max) if energy > max => CheckOutcome::new(
            LivenessCheck::Moire,
            false,
            energy,
            "periodic high-frequency pattern (possible screen or print)",
        ),
        _ => CheckOutcome::new(
            LivenessCheck::Moire,
            true,
            energy,
            "frequency analysis complete",
        ),
    }
}

/// Mean of `20 * ln(|F| + 1)` over the centred spectrum, excluding a disk of
/// `mask_radius` around the zero-frequency bin. Returns 0.0 if nothing is left.
pub fn high_frequency_energy(gray: &[u8], width: usize, height: usize, mask_radius: usize) -> f64 {
    if width == 0 || height == 0 || gray.len() < width * height {
        return 0.0;
    }

    let rows = optimal_dft_size(height);
    let cols = optimal_dft_size(width);

    // Zero padding on the bottom and right.
    let mut buf = vec![Complex::new(0.0f64, 0.0); rows * cols];
    for y in 0..height {
        for x in 0..width {
            buf[y * cols + x] = Complex::new(gray[y * width + x] as f64, 0.0);
        }
    }

    let mut planner = FftPlanner::<f64>::new();

    // Row transforms: the buffer is `rows` consecutive FFTs of length `cols`.
    planner.plan_fft_forward(cols).process(&mut buf);

    // Column transforms on the transposed buffer.
    let mut cols_major = vec![Complex::new(0.0f64, 0.0); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            cols_major[c * rows + r] = buf[r * cols + c];
        }
    }
    planner.plan_fft_forward(rows).process(&mut cols_major);

    let (cy, cx) = ((rows / 2) as i64, (cols / 2) as i64);
    let radius_sq = (mask_radius * mask_radius) as i64;

    let mut total = 0.0f64;
    let mut count = 0usize;
    for c in 0..cols {
        // Position of this bin after shifting DC to the centre.
        let sx = ((c + cols / 2) % cols) as i64;
        for r in 0..rows {
            let sy = ((r + rows / 2) % rows) as i64;
            let (dx, dy) = (sx - cx, sy - cy);
            if dx * dx + dy * dy <= radius_sq {
                continue;
            }
            total += 20.0 * (cols_major[c * rows + r].norm() + 1.0).ln();
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Smallest size `>= n` whose only prime factors are 2, 3 and 5.
pub fn optimal_dft_size(n: usize) -> usize {
    let mut candidate = n.max(1);
    loop {
        let mut m = candidate;
        for p in [2, 3, 5] {
            while m % p == 0 {
                m /= p;
            }
        }
        if m == 1 {
            return candidate;
        }
        candidate += 1;
    }
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

    #[test]
    fn test_optimal_dft_size() {
        assert_eq!(optimal_dft_size(0), 1);
        assert_eq!(optimal_dft_size(1), 1);
        assert_eq!(optimal_dft_size(7), 8);
        assert_eq!(optimal_dft_size(11), 12);
        assert_eq!(optimal_dft_size(97), 100);
        assert_eq!(optimal_dft_size(480), 480);
        assert_eq!(optimal_dft_size(481), 486);
    }

    #[test]
    fn test_uniform_frame_has_no_high_frequency_energy() {
        let frame = gray_frame(64, 64, |_, _| 128);
        let outcome = check_moire(&frame, &LivenessConfig::default());
        assert!(outcome.passed);
        assert!(outcome.score < 1.0, "got {}", outcome.score);
    }

    #[test]
    fn test_grid_pattern_raises_energy() {
        let uniform = gray_frame(96, 96, |_, _| 128);
        // 2px pixel grid, as seen when photographing a screen up close
        let grid = gray_frame(96, 96, |x, y| if (x / 2 + y / 2) % 2 == 0 { 30 } else { 220 });

        let config = LivenessConfig::default();
        let flat_score = check_moire(&uniform, &config).score;
        let grid_score = check_moire(&grid, &config).score;
        assert!(
            grid_score > flat_score,
            "grid {grid_score} should exceed uniform {flat_score}"
        );
    }

    #[test]
    fn test_diagnostic_only_by_default() {
        let grid = gray_frame(96, 96, |x, _| if x % 2 == 0 { 0 } else { 255 });
        let outcome = check_moire(&grid, &LivenessConfig::default());
        assert!(outcome.passed);
        assert_eq!(outcome.reason, "frequency analysis complete");
    }

    #[test]
    fn test_enforced_threshold_rejects() {
        let grid = gray_frame(96, 96, |x, _| if x % 2 == 0 { 0 } else { 255 });
        let config = LivenessConfig {
            moire_max_energy: Some(0.0),
            ..LivenessConfig::default()
        };
        let outcome = check_moire(&grid, &config);
        assert!(!outcome.passed);
        assert!(outcome.reason.contains("possible screen"));
    }

    #[test]
    fn test_small_frame_fully_masked() {
        // 8x8 spectrum fits entirely inside the 30 px disk.
        let frame = gray_frame(8, 8, |x, y| ((x * y) % 255) as u8);
        assert_eq!(check_moire(&frame, &LivenessConfig::default()).score, 0.0);
    }

    #[test]
    fn test_padding_accepts_odd_sizes() {
        let frame = gray_frame(67, 61, |x, y| ((x * 7 + y * 3) % 256) as u8);
        let score = check_moire(&frame, &LivenessConfig::default()).score;
        assert!(score.is_finite());
        assert!(score > 0.0);
    }
}
