//! Active liveness via eye-aspect-ratio blink detection.
//!
//! Open eyes have an EAR around 0.3; it falls towards zero while the lids
//! close. A printed photo or a still screen never dips.

use super::{CheckOutcome, LivenessConfig, LivenessError};
use crate::types::{EyeLandmarks, LivenessCheck, Point};

/// Mean EAR below which both eyes are considered closed.
pub const DEFAULT_EYE_AR_THRESHOLD: f32 = 0.25;

/// Starting value for the running minimum EAR.
const INITIAL_MIN_EAR: f32 = 1.0;

/// Result of scanning a landmark sequence for a blink.
#[derive(Debug, Clone, PartialEq)]
pub struct BlinkResult {
    pub blink_detected: bool,
    /// Lowest per-face mean EAR seen in the sequence (1.0 if no face was seen).
    pub min_ear: f32,
    pub frames_analysed: usize,
}

/// Eye aspect ratio: (|p2 - p6| + |p3 - p5|) / (2 |p1 - p4|).
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> Result<f32, LivenessError> {
    let vertical_a = dist(eye[1], eye[5]);
    let vertical_b = dist(eye[2], eye[4]);
    let horizontal = dist(eye[0], eye[3]);

    if !horizontal.is_finite() || horizontal <= f32::EPSILON {
        return Err(LivenessError::internal(
            LivenessCheck::Blink,
            format!("degenerate eye landmarks: horizontal span {horizontal}"),
        ));
    }

    let ear = (vertical_a + vertical_b) / (2.0 * horizontal);
    if !ear.is_finite() {
        return Err(LivenessError::internal(
            LivenessCheck::Blink,
            "non-finite eye landmarks",
        ));
    }
    Ok(ear)
}

/// Scan every face in every frame; a blink is any face whose mean EAR drops
/// below `threshold`.
///
/// `sequence[i]` holds the landmarks of all faces found in frame `i`.
pub fn detect_blink(
    sequence: &[Vec<EyeLandmarks>],
    threshold: f32,
) -> Result<BlinkResult, LivenessError> {
    let mut blink_detected = false;
    let mut min_ear = INITIAL_MIN_EAR;

    for faces in sequence {
        for face in faces {
            let left = eye_aspect_ratio(&face.left)?;
            let right = eye_aspect_ratio(&face.right)?;
            let avg = (left + right) / 2.0;

            min_ear = min_ear.min(avg);
            if avg < threshold {
                blink_detected = true;
            }
        }
    }

    Ok(BlinkResult {
        blink_detected,
        min_ear,
        frames_analysed: sequence.len(),
    })
}

/// Blink sub-check. A sequence shorter than two frames cannot show a blink
/// and fails outright.
pub fn check_blink(
    sequence: &[Vec<EyeLandmarks>],
    config: &LivenessConfig,
) -> Result<CheckOutcome, LivenessError> {
    if sequence.len() < 2 {
        return Ok(CheckOutcome::new(
            LivenessCheck::Blink,
            false,
            INITIAL_MIN_EAR,
            "insufficient frames for blink detection (need at least 2)",
        ));
    }

    let result = detect_blink(sequence, config.eye_ar_threshold)?;

    tracing::debug!(
        frames = result.frames_analysed,
        min_ear = result.min_ear,
        blink = result.blink_detected,
        "blink check"
    );

    let reason = if result.blink_detected {
        "blink detected"
    } else {
        "no blink detected (possible static photo)"
    };
    Ok(CheckOutcome::new(
        LivenessCheck::Blink,
        result.blink_detected,
        result.min_ear,
        reason,
    ))
}

fn dist(a: Point, b: Point) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
