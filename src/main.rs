//! JunkWax Scanner - trading card identification from camera frames
//!
//! Detects a baseball card in a frame, reads the player name off it and
//! resolves the name against the card list of the detected set.

mod capture;
mod catalog;
mod config;
mod error;
mod matching;
mod overlay;
mod pipeline;
mod shared;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::capture::frame::CapturedFrame;
use crate::capture::DirectoryFrameSource;
use crate::catalog::{fetch::fetcher_for_base_url, CatalogCache, SetKey};
use crate::config::AppConfig;
use crate::matching::{cleanup_string, CardMatcher};
use crate::overlay::{format_card_panel, OverlayFrame};
use crate::pipeline::{CycleOutcome, DetectionPipeline, ScanScheduler};
use crate::shared::{ScanEvent, ScanState};
use crate::vision::{create_text_extractor, ModelManager, OcrBackend, OnnxDetector};

/// JunkWax Scanner - identify trading cards from camera frames
#[derive(Parser, Debug)]
#[command(name = "junkwax-scanner")]
#[command(about = "Detects baseball cards in frames and looks them up in the JunkWaxData card lists")]
struct Args {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scan cycle on an image file
    Identify {
        image: PathBuf,

        /// Print the overlay data as JSON instead of the card panel
        #[arg(long)]
        json: bool,
    },
    /// Replay the frames of a directory through the periodic scanner
    Replay {
        dir: PathBuf,

        /// Start over after the last frame (stop with Ctrl-C)
        #[arg(long = "loop")]
        looping: bool,
    },
    /// Look up OCR text in a set's card list
    Search {
        /// Set label, e.g. "1989|Upper Deck"
        #[arg(long)]
        set: String,
        text: String,
    },
    /// Show how an OCR line is cleaned up before matching
    Clean { text: String },
    /// Download the detector model, labels and OCR models
    FetchModels,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = load_or_create_config(args.config.as_deref())?;

    match args.command {
        Command::Identify { image, json } => identify(&config, &image, json).await,
        Command::Replay { dir, looping } => replay(&config, &dir, looping).await,
        Command::Search { set, text } => search(&config, &set, &text).await,
        Command::Clean { text } => {
            println!("{}", cleanup_string(&text));
            Ok(())
        }
        Command::FetchModels => fetch_models(&config).await,
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring broken configuration: {:#}", e),
            }
        } else if let Err(e) = config::save_config(&AppConfig::default(), &config_path) {
            warn!("Could not write default configuration: {:#}", e);
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn build_matcher(config: &AppConfig) -> Result<CardMatcher> {
    let fetcher = fetcher_for_base_url(
        &config.catalog.base_url,
        Duration::from_secs(config.catalog.request_timeout_secs),
    )?;
    let cache = CatalogCache::new(config.catalog.base_url.clone(), fetcher);
    Ok(CardMatcher::new(Arc::new(cache)))
}

async fn build_pipeline(config: &AppConfig) -> Result<DetectionPipeline> {
    let models = ModelManager::new()?;
    let assets = models.resolve_detector(&config.detection).await?;
    let labels = assets.load_labels()?;

    let model_path = assets.model_path.clone();
    let use_gpu = config.detection.use_gpu;
    let detector = tokio::task::spawn_blocking(move || OnnxDetector::new(&model_path, use_gpu))
        .await
        .context("Detector loading task failed")??;

    let ocr = create_text_extractor(&config.ocr, &models).await?;

    Ok(DetectionPipeline::new(
        Arc::new(detector),
        labels,
        ocr,
        build_matcher(config)?,
        config,
    ))
}

async fn identify(config: &AppConfig, image: &Path, json: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let image = image.to_path_buf();
    let frame = tokio::task::spawn_blocking(move || CapturedFrame::from_path(&image))
        .await
        .context("Frame loading task failed")??;

    let outcome = pipeline.run_cycle(Arc::new(frame), None).await;
    if let CycleOutcome::Aborted { reason } = &outcome {
        anyhow::bail!("Scan failed: {}", reason);
    }

    let overlay = OverlayFrame::from_report(outcome.report());
    if json {
        println!("{}", serde_json::to_string_pretty(&overlay)?);
    } else {
        match overlay.panel {
            Some(panel) => print!("{}", panel),
            None => println!("No card detected"),
        }
    }
    Ok(())
}

async fn replay(config: &AppConfig, dir: &Path, looping: bool) -> Result<()> {
    let source = DirectoryFrameSource::open(dir, looping)?;
    if source.is_empty() {
        anyhow::bail!("No image files in {:?}", dir);
    }

    let pipeline = Arc::new(build_pipeline(config).await?);
    let scheduler = Arc::new(ScanScheduler::new(Duration::from_millis(config.scan.interval_ms)));
    let state = ScanState::shared();
    let (tx, rx) = crossbeam_channel::unbounded();

    let cancel = scheduler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing current cycle");
            cancel.cancel();
        }
    });

    // Print the panel whenever the card on display changes
    let printer = std::thread::spawn(move || {
        let mut last_panel: Option<String> = None;
        for event in rx {
            let panel = match event {
                ScanEvent::CardDetected(report) => Some(format_card_panel(&report.best.label, &report.card_match)),
                ScanEvent::NothingDetected { cleared: true } => None,
                ScanEvent::NothingDetected { cleared: false } | ScanEvent::CycleFailed(_) => continue,
                ScanEvent::Stopped => break,
            };
            if panel != last_panel {
                match &panel {
                    Some(text) => println!("{}", text),
                    None => println!("(no card)\n"),
                }
                last_panel = panel;
            }
        }
    });

    pipeline::run_scan_loop(
        pipeline,
        Box::new(source),
        scheduler,
        Arc::clone(&state),
        tx,
        config.scan.empty_frame,
    )
    .await;

    if printer.join().is_err() {
        warn!("Output thread panicked");
    }

    let state = state.read();
    info!(
        "Replay finished: {} cycles, {} empty, {} skipped triggers",
        state.cycles_run, state.empty_cycles, state.cycles_skipped
    );
    Ok(())
}

async fn search(config: &AppConfig, set: &str, text: &str) -> Result<()> {
    let key: SetKey = set.parse()?;
    let matcher = build_matcher(config)?;

    // surface load failures here instead of a silent "none"
    matcher.cache().ensure_loaded(&key).await?;

    let result = matcher.search(&key, text).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn fetch_models(config: &AppConfig) -> Result<()> {
    let manager = ModelManager::new()?;
    let assets = manager.resolve_detector(&config.detection).await?;
    let labels = assets.load_labels()?;

    println!("Model:  {}", assets.model_path.display());
    println!("Labels: {} ({} sets)", assets.labels_path.display(), labels.len());

    if config.ocr.backend == OcrBackend::PaddleOcr {
        let ocr = manager.resolve_ocr(&config.ocr.paddle).await?;
        println!("OCR:    {}", ocr.detection_model.display());
        println!("        {}", ocr.recognition_model.display());
        println!("        {}", ocr.dictionary.display());
    }
    Ok(())
}
