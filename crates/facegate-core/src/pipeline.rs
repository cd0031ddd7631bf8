//! End-to-end flows: enrollment, recognition, liveness-gated authentication.
//!
//! The pipeline owns an extractor and a template store and wires them to the
//! matcher and the liveness verifier.

use crate::distance::MatchError;
use crate::extractor::{self, ExtractError, FeatureExtractor};
use crate::frame::Frame;
use crate::liveness::{LivenessConfig, LivenessError, LivenessVerifier};
use crate::matcher::{IdentityMatcher, MatcherConfig};
use crate::store::{StoreError, TemplateStore};
use crate::types::{Embedding, FaceBox, LivenessVerdict, MatchResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of usable images for an enrollment.
pub const DEFAULT_MIN_TEMPLATES: usize = 5;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    pub min_templates: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            min_templates: DEFAULT_MIN_TEMPLATES,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub matcher: MatcherConfig,
    pub liveness: LivenessConfig,
    pub enrollment: EnrollmentConfig,
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("at least {required} images are required, got {supplied}")]
    TooFewImages { supplied: usize, required: usize },
    #[error("identity '{0}' is already enrolled")]
    AlreadyEnrolled(String),
    #[error("not enough usable images: {succeeded} encoded, {failed} failed, {required} required")]
    InsufficientTemplates {
        succeeded: usize,
        failed: usize,
        required: usize,
    },
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("extractor: {0}")]
    Extract(#[from] ExtractError),
    #[error("matcher: {0}")]
    Match(#[from] MatchError),
    #[error("liveness: {0}")]
    Liveness(#[from] LivenessError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Summary of a successful enrollment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollOutcome {
    pub identity_id: String,
    pub templates: usize,
    /// Images that were skipped (no face, several faces, undecodable).
    pub failed: usize,
}

/// Match result for one face in a recognition frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizedFace {
    pub face_box: FaceBox,
    pub result: MatchResult,
    pub confidence: f32,
}

/// Result of liveness-gated authentication.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthOutcome {
    /// Liveness failed; matching was not attempted.
    Denied { verdict: LivenessVerdict },
    Authenticated {
        identity_id: String,
        distance: f32,
        confidence: f32,
        verdict: LivenessVerdict,
    },
    /// Live, but no enrolled identity is close enough.
    Unrecognized {
        best_distance: f32,
        verdict: LivenessVerdict,
    },
}

pub struct Pipeline<E, S> {
    extractor: E,
    store: S,
    matcher: IdentityMatcher,
    verifier: LivenessVerifier,
    enrollment: EnrollmentConfig,
}

impl<E: FeatureExtractor, S: TemplateStore> Pipeline<E, S> {
    pub fn new(extractor: E, store: S, config: PipelineConfig) -> Self {
        Self {
            extractor,
            store,
            matcher: IdentityMatcher::new(config.matcher),
            verifier: LivenessVerifier::new(config.liveness),
            enrollment: config.enrollment,
        }
    }

    /// Replace the liveness verifier, e.g. to install a spoof classifier.
    pub fn with_verifier(mut self, verifier: LivenessVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn verifier(&self) -> &LivenessVerifier {
        &self.verifier
    }

    /// Encode every image (exactly one face each) and store the templates.
    ///
    /// Images that cannot be encoded are skipped; enrollment fails if fewer
    /// than `min_templates` remain.
    pub fn enroll(&self, id: &str, name: &str, frames: &[Frame]) -> Result<EnrollOutcome, EnrollError> {
        let required = self.enrollment.min_templates.max(1);
        if frames.len() < required {
            return Err(EnrollError::TooFewImages {
                supplied: frames.len(),
                required,
            });
        }

        if self.store.identity_exists(id)? {
            tracing::warn!(id, "enroll: identity already exists");
            return Err(EnrollError::AlreadyEnrolled(id.to_string()));
        }

        let mut embeddings: Vec<Embedding> = Vec::with_capacity(frames.len());
        let mut failed = 0usize;
        for (i, frame) in frames.iter().enumerate() {
            match extractor::extract_single(&self.extractor, frame) {
                Ok(face) => embeddings.push(face.embedding),
                Err(e) => {
                    tracing::debug!(image = i, error = %e, "enroll: image skipped");
                    failed += 1;
                }
            }
        }

        if embeddings.len() < required {
            tracing::warn!(
                id,
                succeeded = embeddings.len(),
                failed,
                "enroll: not enough usable images"
            );
            return Err(EnrollError::InsufficientTemplates {
                succeeded: embeddings.len(),
                failed,
                required,
            });
        }

        let templates = embeddings.len();
        self.store
            .append_templates(id, name, embeddings)
            .map_err(|e| match e {
                StoreError::AlreadyExists(id) => EnrollError::AlreadyEnrolled(id),
                other => EnrollError::Store(other),
            })?;

        tracing::info!(id, templates, failed, "enrolled successfully");
        Ok(EnrollOutcome {
            identity_id: id.to_string(),
            templates,
            failed,
        })
    }

    /// Match a probe embedding against every enrolled identity.
    pub fn match_probe(
        &self,
        probe: &Embedding,
        threshold: Option<f32>,
    ) -> Result<MatchResult, PipelineError> {
        let identities = self.store.list_identities()?;
        Ok(self.matcher.match_probe(probe, &identities, threshold)?)
    }

    /// Identify every face in a single frame, without liveness screening.
    pub fn recognize(&self, frame: &Frame) -> Result<Vec<RecognizedFace>, PipelineError> {
        let faces = extractor::extract_faces(&self.extractor, frame)?;
        let identities = self.store.list_identities()?;

        let mut recognized = Vec::with_capacity(faces.len());
        for face in faces {
            let result = self.matcher.match_probe(&face.embedding, &identities, None)?;
            let confidence = result.confidence();
            tracing::debug!(
                face = ?face.face_box,
                matched = ?result.identity_id(),
                distance = result.distance(),
                "recognize: face processed"
            );
            recognized.push(RecognizedFace {
                face_box: face.face_box,
                result,
                confidence,
            });
        }
        Ok(recognized)
    }

    /// Screen the frames for liveness, then match the single face of the first frame.
    pub fn authenticate(&self, frames: &[Frame]) -> Result<AuthOutcome, PipelineError> {
        let first = frames.first().ok_or(LivenessError::NoFrames)?;
        let face = extractor::extract_single(&self.extractor, first)?;

        let verdict = self
            .verifier
            .verify(frames, Some(&face.face_box), &self.extractor)?;
        if !verdict.passed {
            return Ok(AuthOutcome::Denied { verdict });
        }

        let result = self.match_probe(&face.embedding, None)?;
        let outcome = match result {
            MatchResult::Matched {
                identity_id,
                distance,
            } => {
                let confidence = (1.0 - distance).clamp(0.0, 1.0);
                tracing::info!(identity = %identity_id, distance, "authenticated");
                AuthOutcome::Authenticated {
                    identity_id,
                    distance,
                    confidence,
                    verdict,
                }
            }
            MatchResult::NoMatch { best_distance } => {
                tracing::info!(best_distance, "authentication: no matching identity");
                AuthOutcome::Unrecognized {
                    best_distance,
                    verdict,
                }
            }
        };
        Ok(outcome)
    }
}
