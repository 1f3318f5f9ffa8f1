//! Face detection: the [`FaceDetect`] seam and its SCRFD backend.
//!
//! The SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model is decoded anchor-free over three strides, filtered with
//! NMS, and mapped back into source pixel coordinates.

use crate::types::PixelBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_MIN_OUTPUTS: usize = 6;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface and set FACEBLUR_MODEL_DIR")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face localization model.
///
/// Implementations are loaded once and then only read; `detect` may be
/// called from any thread. Returns one box per face in source pixel
/// coordinates, or an empty vector when nothing was found.
pub trait FaceDetect: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<PixelBox>, DetectorError>;
}

/// Tuning knobs for [`ScrfdDetector`].
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub intra_threads: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            intra_threads: DEFAULT_INTRA_THREADS,
        }
    }
}

/// Scale and padding applied when fitting the image into the model input.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    // ort needs exclusive access to run a session.
    session: Mutex<Session>,
    input_size: usize,
    stride_indices: [StrideOutputIndices; 3],
    options: DetectorOptions,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path, options: DetectorOptions) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(options.intra_threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            confidence_threshold = options.confidence_threshold,
            nms_threshold = options.nms_threshold,
            "loaded SCRFD model"
        );

        if output_names.len() < SCRFD_MIN_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session: Mutex::new(session),
            input_size: SCRFD_INPUT_SIZE,
            stride_indices,
            options,
        })
    }
}

impl FaceDetect for ScrfdDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<PixelBox>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::EmptyImage);
        }

        let (input, letterbox) = letterbox(image, self.input_size);

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::InferenceFailed("detector session poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_size,
                &letterbox,
                self.options.confidence_threshold,
            ));
        }

        let mut faces: Vec<PixelBox> = nms(all_detections, self.options.nms_threshold)
            .into_iter()
            .map(|b| clip_to_image(b, width, height))
            .filter(|b| b.area() > 0.0)
            .collect();
        faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        tracing::debug!(width, height, faces = faces.len(), "SCRFD detection finished");
        Ok(faces)
    }
}

/// Fit an RGB image into a square NCHW tensor, centred with padding.
fn letterbox(image: &RgbImage, input_size: usize) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = image.dimensions();
    let scale = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);

    let new_w = ((width as f32 * scale).round() as usize).clamp(1, input_size);
    let new_h = ((height as f32 * scale).round() as usize).clamp(1, input_size);
    let pad_x = (input_size - new_w) as f32 / 2.0;
    let pad_y = (input_size - new_h) as f32 / 2.0;

    let resized = imageops::resize(image, new_w as u32, new_h as u32, FilterType::Triangle);

    let pad_x_start = pad_x.floor() as usize;
    let pad_y_start = pad_y.floor() as usize;

    // A mean-valued pad pixel normalizes to exactly 0.0
    let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = pad_x_start + x as usize;
        let ty = pad_y_start + y as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Map output tensor names to stride slots.
///
/// Named exports ("score_8", "bbox_16", ...) are matched by name; anything
/// else falls back to the standard ordering [0-2] = scores, [3-5] = bboxes.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [indices[0], indices[1], indices[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes"
            );
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode detections for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<PixelBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut detections = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let bbox_off = idx * 4;
        let Some(dist) = bboxes.get(bbox_off..bbox_off + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * step;
        let anchor_y = (cell / grid) as f32 * step;

        // Distances to each edge, in units of the stride
        let x1 = anchor_x - dist[0] * step;
        let y1 = anchor_y - dist[1] * step;
        let x2 = anchor_x + dist[2] * step;
        let y2 = anchor_y + dist[3] * step;

        detections.push(PixelBox {
            xmin: (x1 - letterbox.pad_x) / letterbox.scale,
            ymin: (y1 - letterbox.pad_y) / letterbox.scale,
            xmax: (x2 - letterbox.pad_x) / letterbox.scale,
            ymax: (y2 - letterbox.pad_y) / letterbox.scale,
            confidence: score,
        });
    }

    detections
}

fn clip_to_image(b: PixelBox, width: u32, height: u32) -> PixelBox {
    PixelBox {
        xmin: b.xmin.clamp(0.0, width as f32),
        ymin: b.ymin.clamp(0.0, height as f32),
        xmax: b.xmax.clamp(0.0, width as f32),
        ymax: b.ymax.clamp(0.0, height as f32),
        confidence: b.confidence,
    }
}

/// Non-Maximum Suppression: drop boxes overlapping a higher-scoring one.
fn nms(mut detections: Vec<PixelBox>, iou_threshold: f32) -> Vec<PixelBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<PixelBox> = Vec::new();
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &PixelBox, b: &PixelBox) -> f32 {
    let inter = PixelBox::new(
        a.xmin.max(b.xmin),
        a.ymin.max(b.ymin),
        a.xmax.min(b.xmax),
        a.ymax.min(b.ymax),
    )
    .area();
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(xmin: f32, ymin: f32, xmax: f32, ymax: f32, confidence: f32) -> PixelBox {
        PixelBox { xmin, ymin, xmax, ymax, confidence }
    }

    #[test]
    fn test_iou_identical() {
        let a = scored(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = scored(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = scored(20.0, 20.0, 30.0, 30.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = scored(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = scored(5.0, 0.0, 15.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            scored(5.0, 5.0, 105.0, 105.0, 0.8),
            scored(0.0, 0.0, 100.0, 100.0, 0.9),
            scored(200.0, 200.0, 250.0, 250.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(2, 0), (5, 3), (8, 6)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_letterbox_wide_image_pads_vertically() {
        let image = RgbImage::from_pixel(320, 160, image::Rgb([255, 255, 255]));
        let (tensor, info) = letterbox(&image, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((info.scale - 2.0).abs() < 1e-6);
        assert_eq!(info.pad_x, 0.0);
        assert_eq!(info.pad_y, 160.0);

        let white = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        // Padding rows normalize to zero, image rows keep the pixel value
        assert_eq!(tensor[[0, 0, 0, 320]], 0.0);
        assert!((tensor[[0, 1, 320, 320]] - white).abs() < 1e-3);
        assert_eq!(tensor[[0, 2, 639, 0]], 0.0);
    }

    #[test]
    fn test_decode_stride_maps_back_through_letterbox() {
        // Single confident anchor at cell (1, 1) of stride 32 on a 64px input
        let stride = 32;
        let input_size = 64;
        let grid = input_size / stride;
        let mut scores = vec![0.0f32; grid * grid * SCRFD_ANCHORS_PER_CELL];
        let mut bboxes = vec![0.0f32; scores.len() * 4];
        let idx = (grid + 1) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);

        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 16.0 };
        let faces = decode_stride(&scores, &bboxes, stride, input_size, &letterbox, 0.5);

        assert_eq!(faces.len(), 1);
        let face = faces[0];
        // Anchor centre (32, 32), +-16 px, then undo padding and scale
        assert!((face.xmin - 8.0).abs() < 1e-6);
        assert!((face.ymin - 0.0).abs() < 1e-6);
        assert!((face.xmax - 24.0).abs() < 1e-6);
        assert!((face.ymax - 16.0).abs() < 1e-6);
        assert!((face.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_skips_low_scores() {
        let scores = vec![0.5f32; 8];
        let bboxes = vec![1.0f32; 32];
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        assert!(decode_stride(&scores, &bboxes, 32, 64, &letterbox, 0.5).is_empty());
    }

    #[test]
    fn test_clip_to_image() {
        let clipped = clip_to_image(scored(-4.0, 2.0, 130.0, 90.0, 0.7), 100, 80);
        assert_eq!(clipped, scored(0.0, 2.0, 100.0, 80.0, 0.7));
    }

    #[test]
    fn test_load_missing_model() {
        let result = ScrfdDetector::load(Path::new("/nonexistent/det_10g.onnx"), DetectorOptions::default());
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }
}
