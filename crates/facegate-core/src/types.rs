use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Face location in pixel coordinates, in (top, right, bottom, left) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl FaceBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Face embedding vector. Dimensionality is fixed by the extractor (e.g. 128).
///
/// Values are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity '{0}' has no templates")]
    EmptyTemplates(String),
}

/// An enrolled person: a stable identifier, a display name and at least one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IdentityRecord")]
pub struct Identity {
    id: String,
    name: String,
    templates: Vec<Embedding>,
}

impl Identity {
    /// Build an identity, rejecting an empty template set.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        templates: Vec<Embedding>,
    ) -> Result<Self, IdentityError> {
        let id = id.into();
        if templates.is_empty() {
            return Err(IdentityError::EmptyTemplates(id));
        }
        Ok(Self {
            id,
            name: name.into(),
            templates,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn templates(&self) -> &[Embedding] {
        &self.templates
    }

    /// Add more templates to the set. Existing templates are left untouched.
    pub fn append(&mut self, templates: Vec<Embedding>) {
        self.templates.extend(templates);
    }
}

#[derive(Deserialize)]
struct IdentityRecord {
    id: String,
    name: String,
    templates: Vec<Embedding>,
}

impl TryFrom<IdentityRecord> for Identity {
    type Error = IdentityError;

    fn try_from(record: IdentityRecord) -> Result<Self, Self::Error> {
        Identity::new(record.id, record.name, record.templates)
    }
}

/// Outcome of matching a probe embedding against the enrolled identities.
///
/// The best distance is reported on rejection too, for threshold tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchResult {
    Matched { identity_id: String, distance: f32 },
    NoMatch { best_distance: f32 },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }

    pub fn identity_id(&self) -> Option<&str> {
        match self {
            MatchResult::Matched { identity_id, .. } => Some(identity_id),
            MatchResult::NoMatch { .. } => None,
        }
    }

    /// Distance of the best candidate, accepted or not.
    pub fn distance(&self) -> f32 {
        match self {
            MatchResult::Matched { distance, .. } => *distance,
            MatchResult::NoMatch { best_distance } => *best_distance,
        }
    }

    /// `1 - distance` clamped to [0, 1] for an accepted match, 0.0 otherwise.
    pub fn confidence(&self) -> f32 {
        match self {
            MatchResult::Matched { distance, .. } => (1.0 - distance).clamp(0.0, 1.0),
            MatchResult::NoMatch { .. } => 0.0,
        }
    }
}

/// Landmark point in pixel coordinates.
pub type Point = (f32, f32);

/// Six ordered contour points per eye: [outer corner, top-outer, top-inner,
/// inner corner, bottom-inner, bottom-outer].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    pub left: [Point; 6],
    pub right: [Point; 6],
}

/// Which liveness signal produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessCheck {
    Sharpness,
    Moire,
    Glare,
    Blink,
    Classifier,
}

impl LivenessCheck {
    pub fn name(&self) -> &'static str {
        match self {
            LivenessCheck::Sharpness => "sharpness",
            LivenessCheck::Moire => "moire",
            LivenessCheck::Glare => "glare",
            LivenessCheck::Blink => "blink",
            LivenessCheck::Classifier => "classifier",
        }
    }
}

impl std::fmt::Display for LivenessCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Score recorded by a single sub-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckScore {
    pub check: LivenessCheck,
    pub passed: bool,
    pub score: f32,
}

/// Combined liveness decision for one verification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessVerdict {
    pub passed: bool,
    /// Scores of every check that ran, in execution order.
    pub scores: Vec<CheckScore>,
    pub reason: String,
}

impl LivenessVerdict {
    pub fn score(&self, check: LivenessCheck) -> Option<f32> {
        self.scores.iter().find(|s| s.check == check).map(|s| s.score)
    }
}
