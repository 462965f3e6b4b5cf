use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use web_time::Instant;

use tumor_volume::{
    EngineHandle, ErrorResponse, ModalitySet, Pipeline, PipelineConfig, PredictionResponse,
    SegmentationEngine, ServiceStatus,
    config::ENV_MODEL,
    engine::EngineUnavailableError,
};

#[derive(Parser)]
#[command(name = "tumor-volume")]
#[command(about = "Brain tumor segmentation from T1, T1ce, T2 and FLAIR NIfTI volumes", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment one scan and print the prediction as JSON
    Predict {
        /// T1-weighted volume
        #[arg(long, value_name = "T1.NII[.GZ]")]
        t1: PathBuf,

        /// Contrast-enhanced T1 volume
        #[arg(long, value_name = "T1CE.NII[.GZ]")]
        t1ce: PathBuf,

        /// T2-weighted volume
        #[arg(long, value_name = "T2.NII[.GZ]")]
        t2: PathBuf,

        /// FLAIR volume
        #[arg(long, value_name = "FLAIR.NII[.GZ]")]
        flair: PathBuf,

        /// Segmentation model
        #[arg(short = 'm', long, value_name = "MODEL", env = ENV_MODEL)]
        model: Option<PathBuf>,

        /// Write the JSON document here instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Try to load the model and report service status
    Status {
        /// Segmentation model
        #[arg(short = 'm', long, value_name = "MODEL", env = ENV_MODEL)]
        model: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_target(false)
        .init();

    match cli.command {
        Commands::Predict {
            t1,
            t1ce,
            t2,
            flair,
            model,
            output,
        } => {
            let paths = ModalitySet::new(t1, t1ce, t2, flair);
            predict(paths, model, output.as_deref()).await
        }
        Commands::Status { model } => status(model).await,
    }
}

async fn predict(
    paths: ModalitySet<PathBuf>,
    model: Option<PathBuf>,
    output: Option<&Path>,
) -> ExitCode {
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = Arc::new(engine_handle(model));
    warm_up(&engine).await;

    let inputs = match read_inputs(&paths).await {
        Ok(inputs) => inputs,
        Err(e) => {
            log::error!("{}", e);
            return fail(ErrorResponse::new(e), output).await;
        }
    };

    let started = Instant::now();
    let pipeline = Pipeline::new(config);
    let handle = Arc::clone(&engine);
    let result = tokio::task::spawn_blocking(move || pipeline.predict(&inputs, &handle)).await;

    match result {
        Ok(Ok(prediction)) => {
            log::info!(
                "Prediction completed in {:.2?}: {} tumor voxels ({:.3}%)",
                started.elapsed(),
                prediction.statistics.tumor_voxels,
                prediction.statistics.tumor_percentage
            );
            let response = PredictionResponse::new(prediction, chrono::Utc::now());
            match emit(&response, output).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    log::error!("Failed to write response: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Ok(Err(e)) => {
            log::error!("Prediction failed after {:.2?}: {}", started.elapsed(), e);
            fail(ErrorResponse::from_error(&e), output).await
        }
        Err(e) => {
            log::error!("Prediction task failed: {}", e);
            fail(ErrorResponse::new(e), output).await
        }
    }
}

async fn status(model: Option<PathBuf>) -> ExitCode {
    let engine = Arc::new(engine_handle(model));
    warm_up(&engine).await;

    match emit(&ServiceStatus::new(engine.is_loaded()), None).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Failed to write status: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load the engine ahead of the first request. A failure is only logged;
/// the request loads again.
async fn warm_up(engine: &Arc<EngineHandle>) {
    let handle = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || handle.get().map(|_| ())).await {
        Ok(Ok(())) => log::info!("Segmentation engine loaded"),
        Ok(Err(e)) => log::warn!("Segmentation engine not loaded at startup: {}", e),
        Err(e) => log::warn!("Engine warm-up task failed: {}", e),
    }
}

async fn read_inputs(paths: &ModalitySet<PathBuf>) -> Result<ModalitySet<Vec<u8>>, String> {
    let read = |path: &Path| {
        let path = path.to_path_buf();
        async move {
            log::debug!("Reading {}", path.display());
            tokio::fs::read(&path)
                .await
                .map_err(|e| format!("failed to read {}: {}", path.display(), e))
        }
    };

    let (t1, t1ce, t2, flair) = tokio::try_join!(
        read(paths.t1.as_path()),
        read(paths.t1ce.as_path()),
        read(paths.t2.as_path()),
        read(paths.flair.as_path()),
    )?;
    Ok(ModalitySet::new(t1, t1ce, t2, flair))
}

async fn fail(response: ErrorResponse, output: Option<&Path>) -> ExitCode {
    if let Err(e) = emit(&response, output).await {
        log::error!("Failed to write error response: {}", e);
    }
    ExitCode::FAILURE
}

async fn emit<T: Serialize>(document: &T, output: Option<&Path>) -> io::Result<()> {
    match output {
        Some(path) => {
            let json = serde_json::to_vec(document)?;
            tokio::fs::write(path, json).await?;
            log::info!("Wrote {}", path.display());
            Ok(())
        }
        None => {
            let mut stdout = BufWriter::new(io::stdout().lock());
            serde_json::to_writer(&mut stdout, document)?;
            writeln!(stdout)?;
            stdout.flush()
        }
    }
}

fn engine_handle(model: Option<PathBuf>) -> EngineHandle {
    EngineHandle::new(move || load_engine(model.as_deref()))
}

#[cfg(feature = "onnx")]
fn load_engine(model: Option<&Path>) -> Result<Arc<dyn SegmentationEngine>, EngineUnavailableError> {
    let path = model.ok_or_else(|| {
        EngineUnavailableError::new(format!("no model given (use --model or {ENV_MODEL})"))
    })?;
    let engine = tumor_volume::onnx::OnnxEngine::load(path)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "onnx"))]
fn load_engine(model: Option<&Path>) -> Result<Arc<dyn SegmentationEngine>, EngineUnavailableError> {
    if let Some(path) = model {
        log::debug!("Ignoring model {}", path.display());
    }
    Err(EngineUnavailableError::new(
        "built without an inference backend (enable the `onnx` feature)",
    ))
}
