//! Save-path derivation and output format selection.

use image::ImageFormat;
use std::path::{Path, PathBuf};

pub const BLUR_SUFFIX: &str = "_blur";
pub const THUMBNAIL_SUFFIX: &str = "_thumbnail";

/// Extensions whose formats can carry an alpha channel.
pub const TRANSPARENT_EXTENSIONS: [&str; 4] = ["png", "gif", "tiff", "webp"];

/// Where an operation writes its result, and in which format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub path: PathBuf,
    pub format: ImageFormat,
}

/// Insert `suffix` between the file stem and its extension.
///
/// `photos/cat.png` with `_blur` becomes `photos/cat_blur.png`; a path
/// without an extension gets the suffix appended.
pub fn derive_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match source.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    source.with_file_name(file_name)
}

/// Output for a blurred image, which may contain transparency.
///
/// Extensions outside [`TRANSPARENT_EXTENSIONS`] are replaced with `.png`.
/// The returned format always matches the final extension.
pub fn resolve_blur_output(source: &Path, save_path: Option<&Path>) -> OutputSpec {
    let requested = match save_path {
        Some(p) => p.to_path_buf(),
        None => derive_path(source, BLUR_SUFFIX),
    };

    let format = transparent_format(&requested);
    let path = match format {
        Some(_) => requested,
        None => {
            tracing::debug!(
                requested = %requested.display(),
                "extension cannot hold transparency; saving as PNG"
            );
            requested.with_extension("png")
        }
    };

    OutputSpec { path, format: format.unwrap_or(ImageFormat::Png) }
}

/// Output for a thumbnail: the extension and its format are kept as given.
pub fn resolve_thumbnail_output(source: &Path, save_path: Option<&Path>) -> PathBuf {
    match save_path {
        Some(p) => p.to_path_buf(),
        None => derive_path(source, THUMBNAIL_SUFFIX),
    }
}

fn transparent_format(path: &Path) -> Option<ImageFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some(ImageFormat::Png),
        "gif" => Some(ImageFormat::Gif),
        "tiff" => Some(ImageFormat::Tiff),
        "webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}
