use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceblur_core::{ops, NormalizedBox, ScrfdDetector};
use faceblurd::config::Config;
use faceblurd::engine::EngineError;
use faceblurd::protocol::{CallToolResult, Content};
use faceblurd::tools;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "faceblur", about = "Thumbnail, detect faces in and blur images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a thumbnail of at most 100x100 pixels
    Thumbnail {
        image: PathBuf,
        /// Output path (default: <name>_thumbnail.<ext> next to the image)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Detect faces and print their normalized boxes
    Detect {
        image: PathBuf,
        /// SCRFD model file (default: $FACEBLUR_MODEL_DIR/det_10g.onnx)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Blur a region given as fractions of the image size
    #[command(allow_negative_numbers = true)]
    Blur {
        image: PathBuf,
        xmin: f64,
        ymin: f64,
        xmax: f64,
        ymax: f64,
        /// Output path (default: <name>_blur.png next to the image)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Detect every face and blur it
    BlurFaces {
        image: PathBuf,
        /// Output path (default: <name>_blur.png next to the image)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// SCRFD model file (default: $FACEBLUR_MODEL_DIR/det_10g.onnx)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Print the tool definitions served by faceblurd
    Tools,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Thumbnail { image, output } => {
            let result = ops::create_thumbnail(&image, output.as_deref()).map_err(EngineError::from);
            tools::render_thumbnail(result)
        }
        Commands::Detect { image, model } => {
            let detector = load_detector(model)?;
            let result = ops::detect_faces(&detector, &image).map_err(EngineError::from);
            tools::render_faces(result)
        }
        Commands::Blur { image, xmin, ymin, xmax, ymax, output } => {
            let bbox = NormalizedBox::new(xmin, ymin, xmax, ymax);
            let result = ops::blur(&image, &bbox, output.as_deref()).map_err(EngineError::from);
            tools::render_blur(&image.display().to_string(), result)
        }
        Commands::BlurFaces { image, output, model } => {
            let detector = load_detector(model)?;
            match ops::blur_faces(&detector, &image, output.as_deref()) {
                Ok(outcome) => CallToolResult::text(
                    format!(
                        "Blurred {} of {} detected faces, image saved to {}",
                        outcome.blurred,
                        outcome.faces,
                        outcome.path.display()
                    ),
                    false,
                ),
                Err(err) => CallToolResult::text(format!("Error blurring faces: {err}"), true),
            }
        }
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&tools::definitions())?);
            return Ok(ExitCode::SUCCESS);
        }
    };

    for Content::Text { text } in &result.content {
        println!("{text}");
    }
    Ok(if result.is_error { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn load_detector(model: Option<PathBuf>) -> Result<ScrfdDetector> {
    let config = Config::from_env();
    let path = model.unwrap_or_else(|| config.detector_model_path());
    tracing::debug!(model = %path.display(), "loading face detector");
    ScrfdDetector::load(&path, config.detector_options())
        .with_context(|| format!("loading face detector from {}", path.display()))
}
