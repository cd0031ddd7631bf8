use facegate_core::{
    Embedding, EyeLandmarks, FaceBox, Frame, FrameError, Identity, IdentityMatcher,
    LivenessConfig, LivenessError, LivenessVerdict, LivenessVerifier, MatchError, MatchResult,
    MatcherConfig,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("match error: {0}")]
    Match(#[from] MatchError),
    #[error("liveness error: {0}")]
    Liveness(#[from] LivenessError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine did not answer within {0}s")]
    Timeout(u64),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Match {
        identities: Vec<Identity>,
        probe: Embedding,
        threshold: Option<f32>,
        reply: oneshot::Sender<Result<MatchResult, EngineError>>,
    },
    VerifyPassive {
        image: Vec<u8>,
        face_box: Option<FaceBox>,
        reply: oneshot::Sender<Result<LivenessVerdict, EngineError>>,
    },
    VerifyActive {
        landmarks: Vec<Vec<EyeLandmarks>>,
        reply: oneshot::Sender<Result<LivenessVerdict, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Compare a probe against the supplied identities.
    pub async fn match_probe(
        &self,
        identities: Vec<Identity>,
        probe: Embedding,
        threshold: Option<f32>,
    ) -> Result<MatchResult, EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(
            EngineRequest::Match {
                identities,
                probe,
                threshold,
                reply,
            },
            reply_rx,
        )
        .await
    }

    /// Decode an encoded image and run the single-frame liveness checks.
    pub async fn verify_passive(
        &self,
        image: Vec<u8>,
        face_box: Option<FaceBox>,
    ) -> Result<LivenessVerdict, EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(
            EngineRequest::VerifyPassive {
                image,
                face_box,
                reply,
            },
            reply_rx,
        )
        .await
    }

    /// Run the blink check over per-frame eye landmarks.
    pub async fn verify_active(
        &self,
        landmarks: Vec<Vec<EyeLandmarks>>,
    ) -> Result<LivenessVerdict, EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.request(EngineRequest::VerifyActive { landmarks, reply }, reply_rx)
            .await
    }

    async fn request<T>(
        &self,
        req: EngineRequest,
        reply_rx: oneshot::Receiver<Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        self.tx
            .send(req)
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(reply) => reply.map_err(|_| EngineError::ChannelClosed)?,
            Err(_) => Err(EngineError::Timeout(self.timeout.as_secs())),
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// FFT and histogram work is CPU-bound, so it stays off the async runtime.
/// Requests are served one at a time in arrival order.
pub fn spawn_engine(
    matcher: MatcherConfig,
    liveness: LivenessConfig,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let matcher = IdentityMatcher::new(matcher);
    let verifier = LivenessVerifier::new(liveness);

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Match {
                        identities,
                        probe,
                        threshold,
                        reply,
                    } => {
                        let result = matcher
                            .match_probe(&probe, &identities, threshold)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::VerifyPassive {
                        image,
                        face_box,
                        reply,
                    } => {
                        let _ = reply.send(run_passive(&verifier, &image, face_box.as_ref()));
                    }
                    EngineRequest::VerifyActive { landmarks, reply } => {
                        let result = verifier
                            .verify_landmarks(&landmarks)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, timeout })
}

fn run_passive(
    verifier: &LivenessVerifier,
    image: &[u8],
    face_box: Option<&FaceBox>,
) -> Result<LivenessVerdict, EngineError> {
    let frame = Frame::decode(image)?;
    tracing::debug!(
        width = frame.width(),
        height = frame.height(),
        has_box = face_box.is_some(),
        "verify_passive: frame decoded"
    );
    Ok(verifier.verify_passive(&frame, face_box)?)
}
