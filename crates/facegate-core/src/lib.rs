//! facegate-core — Template matching and liveness verification.
//!
//! Matches probe embeddings against per-identity template sets and screens
//! frames for spoofing (blur, screen/print patterns, glare, blinks). Face
//! detection and embedding models plug in through [`FeatureExtractor`].

pub mod distance;
pub mod extractor;
pub mod frame;
pub mod liveness;
pub mod matcher;
pub mod pipeline;
pub mod store;
pub mod types;

pub use distance::{DistanceMetric, Euclidean, MatchError};
pub use extractor::{DetectedFace, ExtractError, FeatureExtractor};
pub use frame::{Frame, FrameError};
pub use liveness::{LivenessConfig, LivenessError, LivenessVerifier, SpoofClassifier};
pub use matcher::{IdentityMatcher, MatcherConfig};
pub use pipeline::{
    AuthOutcome, EnrollError, EnrollOutcome, EnrollmentConfig, Pipeline, PipelineConfig,
    PipelineError, RecognizedFace,
};
pub use store::{InMemoryStore, StoreError, TemplateStore};
pub use types::{
    CheckScore, Embedding, EyeLandmarks, FaceBox, Identity, IdentityError, LivenessCheck,
    LivenessVerdict, MatchResult, Point,
};
