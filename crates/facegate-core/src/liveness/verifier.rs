//! Combines the individual liveness checks into one verdict.
//!
//! Required checks run in a fixed order: sharpness, Moiré, glare (with a face
//! box), classifier (if installed), blink (for a frame sequence). The first
//! failing check ends verification and its reason becomes the verdict's
//! reason.

use super::{blink, glare, moire, sharpness, CheckOutcome, LivenessConfig, LivenessError};
use crate::extractor::{self, FeatureExtractor};
use crate::frame::Frame;
use crate::types::{CheckScore, EyeLandmarks, FaceBox, LivenessCheck, LivenessVerdict};

/// Default minimum "real" score for an installed spoof classifier.
pub const DEFAULT_SPOOF_SCORE_THRESHOLD: f32 = 0.5;

const VERIFIED_REASON: &str = "liveness verified";

/// Optional learned spoof detector.
pub trait SpoofClassifier: Send + Sync {
    /// Probability in [0, 1] that the frame shows a live face.
    fn real_score(&self, frame: &Frame) -> Result<f32, LivenessError>;
}

/// Runs the configured checks and short-circuits on the first failure.
pub struct LivenessVerifier {
    config: LivenessConfig,
    classifier: Option<Box<dyn SpoofClassifier>>,
}

impl Default for LivenessVerifier {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}

impl LivenessVerifier {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            classifier: None,
        }
    }

    /// Install a learned spoof classifier, run after the passive checks.
    pub fn with_classifier(mut self, classifier: Box<dyn SpoofClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    /// Single-frame verification. Glare is only checked when a face box is given.
    pub fn verify_passive(
        &self,
        frame: &Frame,
        face: Option<&FaceBox>,
    ) -> Result<LivenessVerdict, LivenessError> {
        let mut run = VerdictBuilder::default();
        if let Some(verdict) = self.run_passive(frame, face, &mut run)? {
            return Ok(verdict);
        }
        Ok(run.pass())
    }

    /// Blink check over a frame burst, using the extractor for eye landmarks.
    pub fn verify_active<E: FeatureExtractor + ?Sized>(
        &self,
        frames: &[Frame],
        extractor: &E,
    ) -> Result<LivenessVerdict, LivenessError> {
        let sequence = collect_landmarks(frames, extractor)?;
        self.verify_landmarks(&sequence)
    }

    /// Blink check over landmarks already extracted per frame.
    pub fn verify_landmarks(
        &self,
        sequence: &[Vec<EyeLandmarks>],
    ) -> Result<LivenessVerdict, LivenessError> {
        let mut run = VerdictBuilder::default();
        let outcome = blink::check_blink(sequence, &self.config)?;
        if let Some(verdict) = run.record(outcome) {
            return Ok(verdict);
        }
        Ok(run.pass())
    }

    /// Full policy: passive checks on the first frame, then the blink check
    /// when several frames are supplied or a blink is required.
    pub fn verify<E: FeatureExtractor + ?Sized>(
        &self,
        frames: &[Frame],
        face: Option<&FaceBox>,
        extractor: &E,
    ) -> Result<LivenessVerdict, LivenessError> {
        let first = frames.first().ok_or(LivenessError::NoFrames)?;

        let mut run = VerdictBuilder::default();
        if let Some(verdict) = self.run_passive(first, face, &mut run)? {
            return Ok(verdict);
        }

        if frames.len() > 1 || self.config.require_blink {
            let sequence = collect_landmarks(frames, extractor)?;
            let outcome = blink::check_blink(&sequence, &self.config)?;
            if let Some(verdict) = run.record(outcome) {
                return Ok(verdict);
            }
        }

        Ok(run.pass())
    }

    fn run_passive(
        &self,
        frame: &Frame,
        face: Option<&FaceBox>,
        run: &mut VerdictBuilder,
    ) -> Result<Option<LivenessVerdict>, LivenessError> {
        let outcome = sharpness::check_sharpness(frame, self.config.blur_threshold);
        if let Some(verdict) = run.record(outcome) {
            return Ok(Some(verdict));
        }

        let outcome = moire::check_moire(frame, &self.config);
        if let Some(verdict) = run.record(outcome) {
            return Ok(Some(verdict));
        }

        if let Some(face) = face {
            let outcome = glare::check_glare(frame, face, &self.config)?;
            if let Some(verdict) = run.record(outcome) {
                return Ok(Some(verdict));
            }
        }

        if let Some(classifier) = &self.classifier {
            let score = classifier.real_score(frame)?;
            if !score.is_finite() {
                return Err(LivenessError::internal(
                    LivenessCheck::Classifier,
                    format!("classifier returned {score}"),
                ));
            }
            let passed = score >= self.config.spoof_score_threshold;
            let reason = if passed {
                "classifier accepted frame"
            } else {
                "spoof detected by classifier"
            };
            let outcome = CheckOutcome::new(LivenessCheck::Classifier, passed, score, reason);
            if let Some(verdict) = run.record(outcome) {
                return Ok(Some(verdict));
            }
        }

        Ok(None)
    }
}

fn collect_landmarks<E: FeatureExtractor + ?Sized>(
    frames: &[Frame],
    extractor: &E,
) -> Result<Vec<Vec<EyeLandmarks>>, LivenessError> {
    frames
        .iter()
        .map(|frame| extractor::extract_landmarks(extractor, frame).map_err(LivenessError::from))
        .collect()
}

/// Accumulates scores and turns the first failure into a verdict.
#[derive(Default)]
struct VerdictBuilder {
    scores: Vec<CheckScore>,
}

impl VerdictBuilder {
    fn record(&mut self, outcome: CheckOutcome) -> Option<LivenessVerdict> {
        self.scores.push(outcome.to_score());
        if outcome.passed {
            return None;
        }
        tracing::info!(
            check = %outcome.check,
            score = outcome.score,
            reason = %outcome.reason,
            "liveness rejected"
        );
        Some(LivenessVerdict {
            passed: false,
            scores: std::mem::take(&mut self.scores),
            reason: outcome.reason,
        })
    }

    fn pass(self) -> LivenessVerdict {
        tracing::debug!(checks = self.scores.len(), "liveness verified");
        LivenessVerdict {
            passed: true,
            scores: self.scores,
            reason: VERIFIED_REASON.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{DetectedFace, ExtractError};
    use crate::types::{Embedding, Point};

    fn frame(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> Frame {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .flat_map(|(x, y)| f(x, y))
            .collect();
        Frame::from_rgb(width, height, data).unwrap()
    }

    /// Sharp, moderately lit texture with no clipped highlights.
    fn live_frame() -> Frame {
        frame(48, 48, |x, y| {
            let v = if (x + y) % 2 == 0 { 60 } else { 180 };
            [v, v, v]
        })
    }

    fn blurry_frame() -> Frame {
        frame(48, 48, |_, _| [128, 128, 128])
    }

    /// Sharp texture whose face box is mostly blown out.
    fn glare_frame() -> Frame {
        frame(48, 48, |x, y| {
            if x < 36 {
                [255, 255, 255]
            } else if (x + y) % 2 == 0 {
                [0, 0, 0]
            } else {
                [200, 200, 200]
            }
        })
    }

    fn face_box() -> FaceBox {
        FaceBox::new(0, 48, 48, 0)
    }

    fn eyes(open: f32) -> EyeLandmarks {
        let eye = |cx: f32| -> [Point; 6] {
            let h = open / 2.0;
            [
                (cx - 15.0, 50.0),
                (cx - 5.0, 50.0 - h),
                (cx + 5.0, 50.0 - h),
                (cx + 15.0, 50.0),
                (cx + 5.0, 50.0 + h),
                (cx - 5.0, 50.0 + h),
            ]
        };
        EyeLandmarks {
            left: eye(100.0),
            right: eye(160.0),
        }
    }

    /// Returns landmarks keyed on the frame's top-left red value: 0 = closed.
    struct ScriptedEyes;

    impl FeatureExtractor for ScriptedEyes {
        fn extract(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractError> {
            let open = if frame.data()[0] == 0 { 1.0 } else { 9.0 };
            Ok(vec![DetectedFace {
                face_box: face_box(),
                embedding: Embedding::new(vec![0.0; 4]),
                landmarks: Some(eyes(open)),
            }])
        }
    }

    struct FixedScore(f32);

    impl SpoofClassifier for FixedScore {
        fn real_score(&self, _frame: &Frame) -> Result<f32, LivenessError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_passive_live_frame_passes() {
        let verdict = LivenessVerifier::default()
            .verify_passive(&live_frame(), Some(&face_box()))
            .unwrap();
        assert!(verdict.passed, "{verdict:?}");
        assert_eq!(verdict.reason, VERIFIED_REASON);
        let checks: Vec<_> = verdict.scores.iter().map(|s| s.check).collect();
        assert_eq!(
            checks,
            vec![LivenessCheck::Sharpness, LivenessCheck::Moire, LivenessCheck::Glare]
        );
    }

    #[test]
    fn test_passive_blurry_short_circuits() {
        let verdict = LivenessVerifier::default()
            .verify_passive(&blurry_frame(), Some(&face_box()))
            .unwrap();
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("too blurry"));
        // Nothing after sharpness ran
        assert_eq!(verdict.scores.len(), 1);
    }

    #[test]
    fn test_passive_glare_rejected() {
        let verdict = LivenessVerifier::default()
            .verify_passive(&glare_frame(), Some(&face_box()))
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, "excessive glare (possible screen)");
        assert!(verdict.score(LivenessCheck::Moire).is_some());
    }

    #[test]
    fn test_passive_without_box_skips_glare() {
        let verdict = LivenessVerifier::default()
            .verify_passive(&glare_frame(), None)
            .unwrap();
        assert!(verdict.passed);
        assert!(verdict.score(LivenessCheck::Glare).is_none());
    }

    #[test]
    fn test_enforced_moire_blocks() {
        let config = LivenessConfig {
            moire_max_energy: Some(0.0),
            ..LivenessConfig::default()
        };
        let verdict = LivenessVerifier::new(config)
            .verify_passive(&live_frame(), None)
            .unwrap();
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("periodic"));
    }

    #[test]
    fn test_classifier_rejects_spoof() {
        let verifier = LivenessVerifier::default().with_classifier(Box::new(FixedScore(0.2)));
        let verdict = verifier.verify_passive(&live_frame(), None).unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, "spoof detected by classifier");
        assert_eq!(verdict.score(LivenessCheck::Classifier), Some(0.2));
    }

    #[test]
    fn test_classifier_nan_is_internal_failure() {
        let verifier = LivenessVerifier::default().with_classifier(Box::new(FixedScore(f32::NAN)));
        assert!(verifier.verify_passive(&live_frame(), None).is_err());
    }

    #[test]
    fn test_active_blink_passes() {
        let closed = frame(4, 4, |_, _| [0, 0, 0]);
        let open = frame(4, 4, |_, _| [200, 200, 200]);
        let verdict = LivenessVerifier::default()
            .verify_active(&[open.clone(), closed, open], &ScriptedEyes)
            .unwrap();
        assert!(verdict.passed);
        assert!(verdict.score(LivenessCheck::Blink).unwrap() < 0.25);
    }

    #[test]
    fn test_active_static_fails() {
        let open = frame(4, 4, |_, _| [200, 200, 200]);
        let verdict = LivenessVerifier::default()
            .verify_active(&[open.clone(), open], &ScriptedEyes)
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, "no blink detected (possible static photo)");
    }

    #[test]
    fn test_verify_sequence_requires_blink() {
        let live = live_frame();
        let verdict = LivenessVerifier::default()
            .verify(&[live.clone(), live], Some(&face_box()), &ScriptedEyes)
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.scores.last().unwrap().check, LivenessCheck::Blink);
    }

    #[test]
    fn test_verify_single_frame_with_required_blink_fails() {
        let config = LivenessConfig {
            require_blink: true,
            ..LivenessConfig::default()
        };
        let verdict = LivenessVerifier::new(config)
            .verify(&[live_frame()], None, &ScriptedEyes)
            .unwrap();
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("insufficient frames"));
    }

    #[test]
    fn test_verify_single_frame_passive_only() {
        let verdict = LivenessVerifier::default()
            .verify(&[live_frame()], Some(&face_box()), &ScriptedEyes)
            .unwrap();
        assert!(verdict.passed);
        assert!(verdict.score(LivenessCheck::Blink).is_none());
    }

    #[test]
    fn test_verify_no_frames() {
        let err = LivenessVerifier::default()
            .verify(&[], None, &ScriptedEyes)
            .unwrap_err();
        assert!(matches!(err, LivenessError::NoFrames));
    }
}
