//! The image operations exposed as tools: thumbnail, face detection, blur.
//!
//! Each operation is one synchronous unit of work that opens the source file,
//! processes it, and (except detection) writes one output file. Failures come
//! back as [`OpError`]; turning them into user-facing text is left to callers.

use crate::compositor::{blur_region, BlurStep, BLUR_SIGMA};
use crate::detector::{DetectorError, FaceDetect};
use crate::geometry::{normalize, resolve_region};
use crate::output::{resolve_blur_output, resolve_thumbnail_output};
use crate::types::NormalizedBox;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Thumbnails fit inside a square of this many pixels.
pub const THUMBNAIL_MAX_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum OpError {
    #[error("image file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("cannot save {}: {source}", path.display())]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
}

impl OpError {
    /// True when the source image does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OpError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailOutcome {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Faces found by [`detect_faces`], in the order the detector returned them.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceReport {
    NoFaces,
    Faces(Vec<NormalizedBox>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlurOutcome {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub step: BlurStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlurFacesOutcome {
    pub path: PathBuf,
    pub format: ImageFormat,
    /// Faces found by the detector.
    pub faces: usize,
    /// Faces whose region was non-empty and got blurred.
    pub blurred: usize,
}

/// Open and decode an image, reporting a missing file as [`OpError::NotFound`].
pub fn open_image(path: &Path) -> Result<DynamicImage, OpError> {
    let read_err = |source: std::io::Error| {
        if source.kind() == ErrorKind::NotFound {
            OpError::NotFound(path.to_path_buf())
        } else {
            OpError::Read { path: path.to_path_buf(), source }
        }
    };

    ImageReader::open(path)
        .map_err(read_err)?
        .with_guessed_format()
        .map_err(read_err)?
        .decode()
        .map_err(|source| OpError::Decode { path: path.to_path_buf(), source })
}

/// Downscale `image_path` to fit in [`THUMBNAIL_MAX_SIZE`] and save it.
///
/// Aspect ratio is preserved and small images are never enlarged. The output
/// keeps the extension it is given, and the format follows that extension.
pub fn create_thumbnail(image_path: &Path, save_path: Option<&Path>) -> Result<ThumbnailOutcome, OpError> {
    let image = open_image(image_path)?;
    let (width, height) = thumbnail_dimensions(image.width(), image.height(), THUMBNAIL_MAX_SIZE);

    let thumbnail = if (width, height) == (image.width(), image.height()) {
        image
    } else {
        image.resize_exact(width, height, FilterType::CatmullRom)
    };

    let path = resolve_thumbnail_output(image_path, save_path);
    let format = ImageFormat::from_path(&path)
        .map_err(|source| OpError::Save { path: path.clone(), source })?;

    let thumbnail = match format {
        // No alpha channel in JPEG
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(thumbnail.to_rgb8()),
        _ => thumbnail,
    };
    thumbnail
        .save_with_format(&path, format)
        .map_err(|source| OpError::Save { path: path.clone(), source })?;

    tracing::info!(source = %image_path.display(), output = %path.display(), width, height, "thumbnail saved");
    Ok(ThumbnailOutcome { path, width, height })
}

/// Largest size within `max` × `max` with the same aspect ratio, never
/// larger than the input. Both results are at least 1.
pub fn thumbnail_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = |side: u32, long: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(max) + u64::from(long) / 2) / u64::from(long);
        (scaled as u32).max(1)
    };
    if width >= height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}

/// Run face detection and report the boxes as fractions of the image size.
pub fn detect_faces(detector: &dyn FaceDetect, image_path: &Path) -> Result<FaceReport, OpError> {
    let image = open_image(image_path)?.to_rgb8();
    let (width, height) = image.dimensions();

    let faces = detector.detect(&image)?;
    tracing::info!(source = %image_path.display(), width, height, faces = faces.len(), "face detection finished");

    if faces.is_empty() {
        return Ok(FaceReport::NoFaces);
    }
    Ok(FaceReport::Faces(
        faces.iter().map(|face| normalize(face, width, height)).collect(),
    ))
}

/// Blur the region `bbox` (fractions of the image size) and save the result.
///
/// The image is converted to RGBA first, so the output always has an alpha
/// channel and is written in a format that can hold it. A region that is
/// empty after clamping is not an error: the converted image is saved as is.
pub fn blur(image_path: &Path, bbox: &NormalizedBox, save_path: Option<&Path>) -> Result<BlurOutcome, OpError> {
    let mut image = open_image(image_path)?.to_rgba8();
    let (width, height) = image.dimensions();

    let region = resolve_region(bbox, width, height);
    let step = blur_region(&mut image, &region, BLUR_SIGMA);

    let output = resolve_blur_output(image_path, save_path);
    image
        .save_with_format(&output.path, output.format)
        .map_err(|source| OpError::Save { path: output.path.clone(), source })?;

    tracing::info!(
        source = %image_path.display(),
        output = %output.path.display(),
        format = ?output.format,
        ?step,
        "blurred image saved"
    );
    Ok(BlurOutcome { path: output.path, format: output.format, step })
}

/// Detect every face and blur each one in a single pass.
///
/// Boxes go through the same normalize and resolve steps a remote caller
/// would use, so the result matches calling [`detect_faces`] and then
/// [`blur`] once per face.
pub fn blur_faces(
    detector: &dyn FaceDetect,
    image_path: &Path,
    save_path: Option<&Path>,
) -> Result<BlurFacesOutcome, OpError> {
    let decoded = open_image(image_path)?;
    let faces = detector.detect(&decoded.to_rgb8())?;

    let mut image = decoded.to_rgba8();
    let (width, height) = image.dimensions();

    let mut blurred = 0;
    for face in &faces {
        let region = resolve_region(&normalize(face, width, height), width, height);
        if let BlurStep::Blurred(_) = blur_region(&mut image, &region, BLUR_SIGMA) {
            blurred += 1;
        }
    }

    let output = resolve_blur_output(image_path, save_path);
    image
        .save_with_format(&output.path, output.format)
        .map_err(|source| OpError::Save { path: output.path.clone(), source })?;

    tracing::info!(
        source = %image_path.display(),
        output = %output.path.display(),
        faces = faces.len(),
        blurred,
        "blurred detected faces"
    );
    Ok(BlurFacesOutcome { path: output.path, format: output.format, faces: faces.len(), blurred })
}
