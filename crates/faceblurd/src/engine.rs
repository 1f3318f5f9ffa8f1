use faceblur_core::ops::{self, BlurOutcome, FaceReport, OpError, ThumbnailOutcome};
use faceblur_core::{FaceDetect, NormalizedBox};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Op(#[from] OpError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Op(e) if e.is_not_found())
    }
}

/// Messages sent from tool handlers to the engine thread.
enum EngineRequest {
    Thumbnail {
        image_path: PathBuf,
        save_path: Option<PathBuf>,
        reply: oneshot::Sender<Result<ThumbnailOutcome, OpError>>,
    },
    DetectFaces {
        image_path: PathBuf,
        reply: oneshot::Sender<Result<FaceReport, OpError>>,
    },
    Blur {
        image_path: PathBuf,
        bbox: NormalizedBox,
        save_path: Option<PathBuf>,
        reply: oneshot::Sender<Result<BlurOutcome, OpError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub async fn create_thumbnail(
        &self,
        image_path: PathBuf,
        save_path: Option<PathBuf>,
    ) -> Result<ThumbnailOutcome, EngineError> {
        self.request(|reply| EngineRequest::Thumbnail { image_path, save_path, reply })
            .await
    }

    pub async fn detect_faces(&self, image_path: PathBuf) -> Result<FaceReport, EngineError> {
        self.request(|reply| EngineRequest::DetectFaces { image_path, reply })
            .await
    }

    pub async fn blur(
        &self,
        image_path: PathBuf,
        bbox: NormalizedBox,
        save_path: Option<PathBuf>,
    ) -> Result<BlurOutcome, EngineError> {
        self.request(|reply| EngineRequest::Blur { image_path, bbox, save_path, reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, OpError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread takes ownership of the loaded detector and runs every image
/// operation to completion, one request at a time. It exits once all
/// handles are dropped.
pub fn spawn_engine(detector: Box<dyn FaceDetect>, queue_depth: usize) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("faceblur-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Thumbnail { image_path, save_path, reply } => {
                        let result = ops::create_thumbnail(&image_path, save_path.as_deref());
                        log_failure("create_thumbnail", &result);
                        let _ = reply.send(result);
                    }
                    EngineRequest::DetectFaces { image_path, reply } => {
                        let result = ops::detect_faces(&*detector, &image_path);
                        log_failure("detect_faces", &result);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Blur { image_path, bbox, save_path, reply } => {
                        let result = ops::blur(&image_path, &bbox, save_path.as_deref());
                        log_failure("blur", &result);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn log_failure<T>(operation: &str, result: &Result<T, OpError>) {
    if let Err(err) = result {
        tracing::warn!(operation, error = %err, "operation failed");
    }
}
