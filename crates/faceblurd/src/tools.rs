//! Tool definitions and the string rendering of operation results.
//!
//! Operations report typed outcomes; this is the only place they become the
//! human-readable messages the calling agent sees.

use crate::engine::{EngineError, EngineHandle};
use crate::protocol::{CallToolResult, ToolDefinition};
use faceblur_core::ops::{BlurOutcome, FaceReport, ThumbnailOutcome};
use faceblur_core::NormalizedBox;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

pub const CREATE_THUMBNAIL: &str = "create_thumbnail";
pub const DETECT_FACES: &str = "detect_faces";
pub const BLUR: &str = "blur";

#[derive(Error, Debug)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThumbnailArgs {
    pub image_path: String,
    #[serde(default)]
    pub save_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectFacesArgs {
    pub image_path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlurArgs {
    pub image_path: String,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    #[serde(default)]
    pub save_path: Option<String>,
}

/// A parsed `tools/call` request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    CreateThumbnail(ThumbnailArgs),
    DetectFaces(DetectFacesArgs),
    Blur(BlurArgs),
}

impl ToolCall {
    /// Match a tool name and decode its arguments.
    pub fn parse(name: &str, arguments: Option<Value>) -> Result<Self, ToolCallError> {
        let arguments = arguments.unwrap_or_else(|| json!({}));
        let invalid = |source| ToolCallError::InvalidArguments { tool: name.to_string(), source };

        match name {
            CREATE_THUMBNAIL => serde_json::from_value(arguments).map(Self::CreateThumbnail).map_err(invalid),
            DETECT_FACES => serde_json::from_value(arguments).map(Self::DetectFaces).map_err(invalid),
            BLUR => serde_json::from_value(arguments).map(Self::Blur).map_err(invalid),
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::CreateThumbnail(_) => CREATE_THUMBNAIL,
            ToolCall::DetectFaces(_) => DETECT_FACES,
            ToolCall::Blur(_) => BLUR,
        }
    }
}

/// Run a tool on the engine and render its result.
///
/// Never fails: every operation error is rendered into the returned text.
pub async fn call(engine: &EngineHandle, call: ToolCall) -> CallToolResult {
    tracing::info!(tool = call.name(), "tool call");
    match call {
        ToolCall::CreateThumbnail(args) => {
            let result = engine
                .create_thumbnail(PathBuf::from(args.image_path), optional_path(args.save_path))
                .await;
            render_thumbnail(result)
        }
        ToolCall::DetectFaces(args) => {
            let result = engine.detect_faces(PathBuf::from(args.image_path)).await;
            render_faces(result)
        }
        ToolCall::Blur(args) => {
            let bbox = NormalizedBox::new(args.xmin, args.ymin, args.xmax, args.ymax);
            let image_path = PathBuf::from(&args.image_path);
            let result = engine.blur(image_path, bbox, optional_path(args.save_path)).await;
            render_blur(&args.image_path, result)
        }
    }
}

/// Empty strings count as "not given".
fn optional_path(path: Option<String>) -> Option<PathBuf> {
    path.filter(|p| !p.is_empty()).map(PathBuf::from)
}

pub fn render_thumbnail(result: Result<ThumbnailOutcome, EngineError>) -> CallToolResult {
    match result {
        Ok(outcome) => CallToolResult::text(format!("Thumbnail saved to {}", outcome.path.display()), false),
        Err(err) => CallToolResult::text(format!("Error creating thumbnail: {err}"), true),
    }
}

pub fn render_faces(result: Result<FaceReport, EngineError>) -> CallToolResult {
    match result {
        Ok(FaceReport::Faces(boxes)) => {
            let boxes: Vec<[f64; 4]> = boxes.into_iter().map(NormalizedBox::to_array).collect();
            CallToolResult::text(format!("Detected faces: {boxes:?}"), false)
        }
        Ok(FaceReport::NoFaces) => CallToolResult::text("No faces detected.", false),
        Err(err) => CallToolResult::text(format!("Error detecting faces: {err}"), true),
    }
}

pub fn render_blur(image_path: &str, result: Result<BlurOutcome, EngineError>) -> CallToolResult {
    match result {
        Ok(outcome) => CallToolResult::text(format!("Blurred image saved to {}", outcome.path.display()), false),
        Err(err) if err.is_not_found() => {
            CallToolResult::text(format!("Error: Image file not found ({image_path})"), true)
        }
        Err(err) => CallToolResult::text(format!("Error applying blur: {err}"), true),
    }
}

/// Definitions advertised by `tools/list`.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: CREATE_THUMBNAIL,
            description: "Create a thumbnail (at most 100x100 pixels, aspect ratio kept) of an image \
                and save it. Without save_path the thumbnail is written next to the original with \
                '_thumbnail' added to the file name. Returns the saved path or an error message.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "image_path": { "type": "string", "description": "Path of the source image." },
                    "save_path": { "type": "string", "description": "Where to save the thumbnail." }
                },
                "required": ["image_path"]
            }),
        },
        ToolDefinition {
            name: DETECT_FACES,
            description: "Detect faces in an image. Returns one [xmin, ymin, xmax, ymax] box per \
                face as fractions (0.0-1.0) of the image width and height, rounded to two decimals, \
                or 'No faces detected.'. The boxes can be passed directly to the blur tool.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "image_path": { "type": "string", "description": "Path of the image to scan." }
                },
                "required": ["image_path"]
            }),
        },
        ToolDefinition {
            name: BLUR,
            description: "Blur a rectangular region of an image and save the result. Coordinates are \
                fractions (0.0-1.0) of the image width and height. Without save_path the result is \
                written next to the original with '_blur' added to the file name. The output keeps \
                transparency, so extensions other than png, gif, tiff and webp are replaced by png.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "image_path": { "type": "string", "description": "Path of the source image." },
                    "xmin": { "type": "number", "description": "Left edge, fraction of the width." },
                    "ymin": { "type": "number", "description": "Top edge, fraction of the height." },
                    "xmax": { "type": "number", "description": "Right edge, fraction of the width." },
                    "ymax": { "type": "number", "description": "Bottom edge, fraction of the height." },
                    "save_path": { "type": "string", "description": "Where to save the blurred image." }
                },
                "required": ["image_path", "xmin", "ymin", "xmax", "ymax"]
            }),
        },
    ]
}
