use faceblur_core::detector::{
    DetectorOptions, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INTRA_THREADS, DEFAULT_NMS_THRESHOLD,
};
use std::path::PathBuf;
use std::str::FromStr;

/// Server configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// File name of the SCRFD model inside `model_dir`.
    pub detector_model: String,
    /// ONNX Runtime intra-op thread count.
    pub intra_threads: usize,
    /// Minimum SCRFD score for a face to be reported.
    pub confidence_threshold: f32,
    /// IoU above which overlapping detections are merged.
    pub nms_threshold: f32,
    /// Pending tool calls the engine queue accepts before callers wait.
    pub queue_depth: usize,
}

impl Config {
    /// Load configuration from `FACEBLUR_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: lookup("FACEBLUR_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(faceblur_core::default_model_dir),
            detector_model: lookup("FACEBLUR_DETECTOR_MODEL")
                .unwrap_or_else(|| faceblur_core::DETECTOR_MODEL_FILE.to_string()),
            intra_threads: parse_var::<usize>(lookup("FACEBLUR_INTRA_THREADS"))
                .filter(|&v| v > 0)
                .unwrap_or(DEFAULT_INTRA_THREADS),
            confidence_threshold: parse_var(lookup("FACEBLUR_CONFIDENCE_THRESHOLD"))
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            nms_threshold: parse_var(lookup("FACEBLUR_NMS_THRESHOLD"))
                .unwrap_or(DEFAULT_NMS_THRESHOLD),
            queue_depth: parse_var::<usize>(lookup("FACEBLUR_QUEUE_DEPTH"))
                .filter(|&v| v > 0)
                .unwrap_or(4),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            confidence_threshold: self.confidence_threshold,
            nms_threshold: self.nms_threshold,
            intra_threads: self.intra_threads,
        }
    }
}

fn parse_var<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}
