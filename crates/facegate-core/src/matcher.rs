//! Probe-to-gallery identity matching.
//!
//! Every identity is scored by its closest template, so an identity matches
//! when any one of its enrolled looks matches. The scan is linear in the
//! total number of templates.

use crate::distance::{DistanceMetric, Euclidean, MatchError};
use crate::types::{Embedding, Identity, MatchResult};
use serde::Deserialize;

/// Ceiling for the running best distance; also the distance reported for an empty gallery.
pub const NO_MATCH_DISTANCE: f32 = 1.0;

/// Default acceptance threshold for Euclidean face distance.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// A match is accepted only when the best distance is strictly below this.
    pub threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Finds the enrolled identity closest to a probe embedding.
#[derive(Debug, Clone)]
pub struct IdentityMatcher<M = Euclidean> {
    metric: M,
    config: MatcherConfig,
}

impl IdentityMatcher<Euclidean> {
    pub fn new(config: MatcherConfig) -> Self {
        Self::with_metric(Euclidean, config)
    }
}

impl Default for IdentityMatcher<Euclidean> {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl<M: DistanceMetric> IdentityMatcher<M> {
    pub fn with_metric(metric: M, config: MatcherConfig) -> Self {
        Self { metric, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match against the configured threshold unless `threshold` overrides it.
    pub fn match_probe(
        &self,
        probe: &Embedding,
        identities: &[Identity],
        threshold: Option<f32>,
    ) -> Result<MatchResult, MatchError> {
        self.find_match(probe, identities, threshold.unwrap_or(self.config.threshold))
    }

    /// Scan all identities and accept the closest one if it beats `threshold`.
    ///
    /// Ties go to the identity seen first, so the result is deterministic for a
    /// fixed iteration order.
    pub fn find_match(
        &self,
        probe: &Embedding,
        identities: &[Identity],
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        let mut best_distance = NO_MATCH_DISTANCE;
        let mut best_identity: Option<&Identity> = None;

        for identity in identities {
            let Some(min_distance) = self.closest_template(probe, identity)? else {
                continue;
            };
            if min_distance < best_distance {
                best_distance = min_distance;
                best_identity = Some(identity);
            }
        }

        let result = match best_identity {
            Some(identity) if best_distance < threshold => MatchResult::Matched {
                identity_id: identity.id().to_string(),
                distance: best_distance,
            },
            _ => MatchResult::NoMatch { best_distance },
        };

        tracing::debug!(
            identities = identities.len(),
            threshold,
            best_distance,
            matched = ?result.identity_id(),
            "match scan complete"
        );

        Ok(result)
    }

    /// Minimum distance from the probe to any of the identity's templates.
    fn closest_template(
        &self,
        probe: &Embedding,
        identity: &Identity,
    ) -> Result<Option<f32>, MatchError> {
        let mut min: Option<f32> = None;
        for template in identity.templates() {
            let d = self.metric.distance(probe, template)?;
            min = Some(match min {
                Some(m) if m <= d => m,
                _ => d,
            });
        }
        Ok(min)
    }
}
