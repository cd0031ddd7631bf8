use facegate_core::{Embedding, EyeLandmarks, FaceBox};
use std::sync::Arc;
use zbus::interface;

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use crate::store::{SqliteTemplateStore, StoreError};

/// Shared state accessible by D-Bus method handlers.
pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
    pub store: SqliteTemplateStore,
}

/// D-Bus interface for the Facegate daemon.
///
/// Bus name: org.facegate.Facegate1
/// Object path: /org/facegate/Facegate1
pub struct FacegateService {
    pub state: Arc<AppState>,
}

fn failed(context: &str, err: impl std::fmt::Display) -> zbus::fdo::Error {
    tracing::error!(error = %err, "{context} failed");
    zbus::fdo::Error::Failed(err.to_string())
}

fn engine_error(context: &str, err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Frame(e) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        EngineError::Match(e) => zbus::fdo::Error::InvalidArgs(e.to_string()),
        other => failed(context, other),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, json: &str) -> zbus::fdo::Result<T> {
    serde_json::from_str(json)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid {what}: {e}")))
}

#[interface(name = "org.facegate.Facegate1")]
impl FacegateService {
    /// Enroll a new identity from a JSON array of embeddings.
    ///
    /// Returns the number of templates stored.
    async fn enroll(&self, id: &str, name: &str, embeddings_json: &str) -> zbus::fdo::Result<u32> {
        tracing::info!(id, name, "enroll requested");

        if id.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("identity id must not be empty".into()));
        }
        let embeddings: Vec<Embedding> = parse_json("embeddings", embeddings_json)?;
        let required = self.state.config.enrollment.min_templates;
        if embeddings.len() < required {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "{} embeddings supplied, at least {required} required",
                embeddings.len()
            )));
        }

        let stored = self
            .state
            .store
            .append_templates(id, name, embeddings)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_)
                | StoreError::InconsistentDim { .. }
                | StoreError::InvalidEmbeddingValue
                | StoreError::InvalidBlob(_)
                | StoreError::Identity(_) => zbus::fdo::Error::InvalidArgs(e.to_string()),
                other => failed("enroll", other),
            })?;

        tracing::info!(id, templates = stored, "identity enrolled");
        Ok(stored as u32)
    }

    /// Match a probe embedding (JSON array) against every enrolled identity.
    ///
    /// A threshold `<= 0` selects the configured default.
    async fn match_probe(&self, probe_json: &str, threshold: f64) -> zbus::fdo::Result<String> {
        let probe: Embedding = parse_json("probe", probe_json)?;
        let threshold = (threshold > 0.0).then_some(threshold as f32);

        let identities = self
            .state
            .store
            .list_identities()
            .await
            .map_err(|e| failed("match", e))?;
        tracing::debug!(gallery = identities.len(), ?threshold, "match requested");

        let result = self
            .state
            .engine
            .match_probe(identities, probe, threshold)
            .await
            .map_err(|e| engine_error("match", e))?;

        tracing::info!(
            matched = result.is_match(),
            distance = result.distance(),
            "match complete"
        );
        to_json(&result)
    }

    /// Run single-frame liveness checks on an encoded image (PNG, JPEG, ...).
    ///
    /// `face_box` is `(top, right, bottom, left)` and is only used when `has_box` is set.
    async fn verify_passive(
        &self,
        image: Vec<u8>,
        face_box: (i32, i32, i32, i32),
        has_box: bool,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), has_box, "verify_passive requested");
        let face_box = has_box.then(|| {
            let (top, right, bottom, left) = face_box;
            FaceBox::new(top, right, bottom, left)
        });

        let verdict = self
            .state
            .engine
            .verify_passive(image, face_box)
            .await
            .map_err(|e| engine_error("verify_passive", e))?;
        to_json(&verdict)
    }

    /// Run the blink check on a JSON array of per-frame eye landmark lists.
    async fn verify_active(&self, landmarks_json: &str) -> zbus::fdo::Result<String> {
        let landmarks: Vec<Vec<EyeLandmarks>> = parse_json("landmarks", landmarks_json)?;
        tracing::info!(frames = landmarks.len(), "verify_active requested");

        let verdict = self
            .state
            .engine
            .verify_active(landmarks)
            .await
            .map_err(|e| engine_error("verify_active", e))?;
        to_json(&verdict)
    }

    /// List enrolled identities (metadata only) as JSON.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let summaries = self
            .state
            .store
            .list_summaries()
            .await
            .map_err(|e| failed("list_identities", e))?;
        to_json(&summaries)
    }

    /// Remove an identity and all its templates.
    async fn remove_identity(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "remove_identity requested");
        self.state
            .store
            .remove(id)
            .await
            .map_err(|e| failed("remove_identity", e))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let (identities, templates) = self
            .state
            .store
            .counts()
            .await
            .map_err(|e| failed("status", e))?;
        let config = &self.state.config;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": identities,
            "templates": templates,
            "match_threshold": config.matcher.threshold,
            "blur_threshold": config.liveness.blur_threshold,
            "moire_max_energy": config.liveness.moire_max_energy,
            "glare_ratio_threshold": config.liveness.glare_ratio_threshold,
            "eye_ar_threshold": config.liveness.eye_ar_threshold,
            "min_templates": config.enrollment.min_templates,
            "db_path": config.db_path.display().to_string(),
        })
        .to_string())
    }
}
