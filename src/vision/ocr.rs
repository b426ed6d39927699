//! Text extraction from card crops
//!
//! Backends return candidate lines in reading order; the matcher decides
//! which of them (if any) is the player name.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::OcrSettings;
use crate::error::EngineError;
use crate::vision::models::ModelManager;
use crate::vision::paddle_ocr::PaddleOcr;

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// PaddleOCR English models via ONNX Runtime
    #[default]
    PaddleOcr,
    /// Tesseract command line tool
    Tesseract,
    /// Windows built-in OCR
    WindowsOcr,
}

/// Turns an image into candidate text lines
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, image: &RgbaImage) -> Result<Vec<String>, EngineError>;
}

/// Runs the `tesseract` executable, feeding a PNG over stdin
pub struct TesseractOcr {
    executable: PathBuf,
    language: String,
}

impl TesseractOcr {
    pub fn new(executable: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            language: language.into(),
        }
    }

    fn run(&self, image: &RgbaImage) -> Result<Vec<String>> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("Failed to encode crop as PNG")?;

        let mut child = Command::new(&self.executable)
            .args(["stdin", "stdout", "-l", &self.language, "--psm", "6"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to launch {:?}", self.executable))?;

        // tesseract reads all of stdin before writing anything
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png).context("Failed to send image to tesseract")?;
        }

        let output = child.wait_with_output().context("Failed to wait for tesseract")?;
        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(split_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl TextExtractor for TesseractOcr {
    fn extract_text(&self, image: &RgbaImage) -> Result<Vec<String>, EngineError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(vec![]);
        }

        let lines = self
            .run(image)
            .map_err(|e| EngineError::Ocr(format!("{:#}", e)))?;
        debug!("tesseract: {} lines from {}x{} crop", lines.len(), width, height);
        Ok(lines)
    }
}

/// Non-blank lines of OCR output, trimmed, in order
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the configured backend, fetching PaddleOCR models through `models`
pub async fn create_text_extractor(settings: &OcrSettings, models: &ModelManager) -> Result<Arc<dyn TextExtractor>> {
    info!("Using {:?} OCR backend", settings.backend);

    match settings.backend {
        OcrBackend::PaddleOcr => {
            let assets = models.resolve_ocr(&settings.paddle).await?;
            let engine = tokio::task::spawn_blocking(move || PaddleOcr::new(&assets))
                .await
                .context("OCR model loading task failed")??;
            Ok(Arc::new(engine))
        }
        OcrBackend::Tesseract => Ok(Arc::new(TesseractOcr::new(
            settings.tesseract_path.clone(),
            settings.language.clone(),
        ))),
        #[cfg(windows)]
        OcrBackend::WindowsOcr => Ok(Arc::new(crate::vision::windows_ocr::WindowsOcr::new(
            &settings.language,
        )?)),
        #[cfg(not(windows))]
        OcrBackend::WindowsOcr => anyhow::bail!("Windows OCR is only available on Windows"),
    }
}
