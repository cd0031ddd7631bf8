//! Liveness detection — is this a live capture or a replayed photo/screen?
//!
//! Passive checks look at a single still frame:
//!
//! - [`sharpness`]: variance of the Laplacian. Re-photographed screens and
//!   out-of-focus replays come out blurry.
//! - [`moire`]: high-frequency energy of the 2D spectrum. Pixel grids and
//!   halftone prints leave periodic energy away from DC.
//! - [`glare`]: share of blown-out highlights inside the face box. Screens
//!   and glossy paper clip far more often than skin.
//!
//! The active check ([`blink`]) needs a short burst of frames and looks for
//! an eye-aspect-ratio dip.
//!
//! # Threat Coverage
//!
//! - **Blocks:** blurry replays, glossy prints and screens under direct light,
//!   static photographs when a frame burst is required.
//! - **Does not block:** sharp video replays with a blink, 3D masks.

pub mod blink;
pub mod glare;
pub mod moire;
pub mod sharpness;
pub mod verifier;

use crate::extractor::ExtractError;
use crate::types::{CheckScore, LivenessCheck};
use serde::Deserialize;
use thiserror::Error;

pub use verifier::{LivenessVerifier, SpoofClassifier};

/// Thresholds for every liveness signal. Tune per camera.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Minimum Laplacian variance for a frame to count as sharp.
    pub blur_threshold: f32,
    /// Radius (px) of the low-frequency disk excluded from the Moiré score.
    pub moire_mask_radius: usize,
    /// Maximum high-frequency energy before a frame is rejected.
    /// `None` keeps the Moiré check diagnostic-only.
    pub moire_max_energy: Option<f32>,
    /// Maximum share of near-white V-channel pixels inside the face box.
    pub glare_ratio_threshold: f32,
    /// Number of top histogram bins counted as blown out.
    pub glare_top_bins: usize,
    /// Mean EAR below which the eyes count as closed.
    pub eye_ar_threshold: f32,
    /// Fail single-frame verification because no blink can be observed.
    pub require_blink: bool,
    /// Minimum classifier "real" score, when a classifier is installed.
    pub spoof_score_threshold: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            blur_threshold: sharpness::DEFAULT_BLUR_THRESHOLD,
            moire_mask_radius: moire::DEFAULT_MASK_RADIUS,
            moire_max_energy: None,
            glare_ratio_threshold: glare::DEFAULT_GLARE_RATIO,
            glare_top_bins: glare::DEFAULT_TOP_BINS,
            eye_ar_threshold: blink::DEFAULT_EYE_AR_THRESHOLD,
            require_blink: false,
            spoof_score_threshold: verifier::DEFAULT_SPOOF_SCORE_THRESHOLD,
        }
    }
}

/// Result of one sub-check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub check: LivenessCheck,
    pub passed: bool,
    pub score: f32,
    pub reason: String,
}

impl CheckOutcome {
    pub fn new(check: LivenessCheck, passed: bool, score: f32, reason: impl Into<String>) -> Self {
        Self {
            check,
            passed,
            score,
            reason: reason.into(),
        }
    }

    pub fn to_score(&self) -> CheckScore {
        CheckScore {
            check: self.check,
            passed: self.passed,
            score: self.score,
        }
    }
}

#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("{check} check failed internally: {detail}")]
    InternalCheckFailure {
        check: LivenessCheck,
        detail: String,
    },
    #[error("no frames supplied")]
    NoFrames,
    #[error("extractor: {0}")]
    Extract(#[from] ExtractError),
}

impl LivenessError {
    pub(crate) fn internal(check: LivenessCheck, detail: impl Into<String>) -> Self {
        LivenessError::InternalCheckFailure {
            check,
            detail: detail.into(),
        }
    }
}
