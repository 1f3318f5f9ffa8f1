//! faceblur-core: face detection and region blurring for image tools.
//!
//! Detects faces with SCRFD running on ONNX Runtime, reports them as
//! size-independent normalized boxes, and blurs caller-chosen regions back
//! into the image with transparency preserved.

pub mod compositor;
pub mod detector;
pub mod geometry;
pub mod ops;
pub mod output;
pub mod types;

pub use compositor::{BlurStep, BLUR_SIGMA};
pub use detector::{DetectorError, DetectorOptions, FaceDetect, ScrfdDetector};
pub use ops::{BlurFacesOutcome, BlurOutcome, FaceReport, OpError, ThumbnailOutcome};
pub use types::{NormalizedBox, PixelBox, Rect, ResolvedRegion};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";

/// Default model directory: `$XDG_DATA_HOME/faceblur/models`, falling back
/// to `~/.local/share/faceblur/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        });
    data_dir.join("faceblur").join("models")
}
