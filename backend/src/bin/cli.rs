//! Command-line access to the classifier without starting the server.
//!
//! ```bash
//! realeyez-cli predict photo.jpg render.png
//! realeyez-cli --model models/classifier.onnx evaluate data/test --json
//! realeyez-cli describe
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use realeyez::config::AppConfig;
use realeyez::evaluate::evaluate_directory;
use realeyez::inference::{self, Classification, InferencePipeline};
use realeyez::storage::UploadStore;
use shared::InferenceResponse;

/// Classify images as real photographs or AI-generated.
#[derive(Parser, Debug)]
#[command(name = "realeyez-cli")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file; defaults to $REALEYEZ_CONFIG or config/realeyez.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model artifact path, overriding the configuration
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one or more image files
    Predict {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Print one JSON object per image
        #[arg(long)]
        json: bool,
    },

    /// Score the model against a directory with Real/ and Fake/ subdirectories
    Evaluate {
        data_dir: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Show the loaded artifact's format and input geometry
    Describe,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::load()?,
    };
    if let Some(model) = cli.model {
        config.model.path = model;
    }

    let artifact = inference::load_with(&config.model)?;
    let pipeline = InferencePipeline::new(artifact).with_preprocessing(config.preprocessing);

    match cli.command {
        Command::Predict { images, json } => Ok(predict(&pipeline, &images, json)),
        Command::Evaluate { data_dir, json } => {
            let report = evaluate_directory(&pipeline, &data_dir)
                .with_context(|| format!("evaluating {}", data_dir.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Describe => {
            let summary = pipeline.artifact().summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn classify_file(pipeline: &InferencePipeline, path: &Path) -> Result<(String, Classification)> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let classification = pipeline.classify(&bytes)?;
    Ok((UploadStore::calculate_image_hash(&bytes), classification))
}

fn predict(pipeline: &InferencePipeline, images: &[PathBuf], json: bool) -> ExitCode {
    let mut failed = 0;
    for path in images {
        let file_name = Some(path.display().to_string());
        let response = match classify_file(pipeline, path) {
            Ok((image_hash, classification)) => InferenceResponse::success(
                file_name,
                image_hash,
                classification.score,
                classification.result,
                false,
            ),
            Err(e) => InferenceResponse::failure(file_name, format!("{e:#}")),
        };

        if !response.is_success() {
            failed += 1;
        }
        if json {
            match serde_json::to_string(&response) {
                Ok(line) => println!("{line}"),
                Err(e) => log::error!("Failed to serialize result: {}", e),
            }
        } else {
            match (&response.display, &response.error) {
                (Some(display), _) => println!("{}: {}", path.display(), display),
                (None, Some(error)) => eprintln!("{}: error: {}", path.display(), error),
                (None, None) => {}
            }
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
