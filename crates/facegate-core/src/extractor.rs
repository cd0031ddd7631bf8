//! Feature extractor seam.
//!
//! Face detection, embedding and landmark models live outside this crate.
//! Anything that can turn a frame into boxes, embeddings and eye landmarks
//! plugs in through [`FeatureExtractor`].

use crate::frame::{Frame, FrameError};
use crate::types::{Embedding, EyeLandmarks, FaceBox};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFace,
    #[error("multiple faces detected ({0}); exactly one is required")]
    MultipleFaces(usize),
    #[error("could not decode image: {0}")]
    DecodeFailure(String),
    #[error("extractor backend failed: {0}")]
    Backend(String),
}

impl From<FrameError> for ExtractError {
    fn from(e: FrameError) -> Self {
        ExtractError::DecodeFailure(e.to_string())
    }
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub face_box: FaceBox,
    pub embedding: Embedding,
    /// Eye contours, when the backend produces them.
    pub landmarks: Option<EyeLandmarks>,
}

/// External face analysis capability.
pub trait FeatureExtractor {
    /// Find every face in the frame.
    ///
    /// Implementations return [`ExtractError::NoFace`] rather than an empty list.
    fn extract(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractError>;
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for &T {
    fn extract(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractError> {
        (**self).extract(frame)
    }
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for Box<T> {
    fn extract(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractError> {
        (**self).extract(frame)
    }
}

/// Extract faces, mapping an empty result to [`ExtractError::NoFace`].
pub fn extract_faces<E: FeatureExtractor + ?Sized>(
    extractor: &E,
    frame: &Frame,
) -> Result<Vec<DetectedFace>, ExtractError> {
    let faces = extractor.extract(frame)?;
    if faces.is_empty() {
        return Err(ExtractError::NoFace);
    }
    Ok(faces)
}

/// Extract exactly one face, as enrollment requires.
pub fn extract_single<E: FeatureExtractor + ?Sized>(
    extractor: &E,
    frame: &Frame,
) -> Result<DetectedFace, ExtractError> {
    let mut faces = extract_faces(extractor, frame)?;
    if faces.len() > 1 {
        return Err(ExtractError::MultipleFaces(faces.len()));
    }
    faces.pop().ok_or(ExtractError::NoFace)
}

/// Eye landmarks for every face in the frame; a frame without faces yields none.
pub fn extract_landmarks<E: FeatureExtractor + ?Sized>(
    extractor: &E,
    frame: &Frame,
) -> Result<Vec<EyeLandmarks>, ExtractError> {
    match extractor.extract(frame) {
        Ok(faces) => Ok(faces.into_iter().filter_map(|f| f.landmarks).collect()),
        Err(ExtractError::NoFace) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
