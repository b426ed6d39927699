//! Application Configuration
//!
//! Scanner settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::geometry::FrameGeometry;
use crate::vision::ocr::OcrBackend;

/// Environment switch that forbids network downloads
pub const OFFLINE_ENV: &str = "JUNKWAX_OFFLINE";

/// Whether network downloads are disabled for this process
pub fn offline_mode() -> bool {
    std::env::var_os(OFFLINE_ENV).is_some()
}

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detector model settings
    pub detection: DetectionSettings,
    /// Region of the frame handed to the detector
    pub crop: CropSettings,
    /// Card catalog source
    pub catalog: CatalogSettings,
    /// Periodic scan behaviour
    pub scan: ScanSettings,
    /// Text extraction backend
    pub ocr: OcrSettings,
}

impl AppConfig {
    /// Geometry used to map detector output back onto the frame
    pub fn frame_geometry(&self) -> FrameGeometry {
        FrameGeometry {
            model_width: self.detection.model_width,
            model_height: self.detection.model_height,
            crop_x: self.crop.x,
            crop_y: self.crop.y,
            crop_width: self.crop.width,
            crop_height: self.crop.height,
        }
    }
}

/// Detector model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum confidence for a detection to be kept (0.0 - 1.0)
    pub threshold: f32,
    /// Width of the image the model expects
    pub model_width: u32,
    /// Height of the image the model expects
    pub model_height: u32,
    /// Where to download the ONNX model from
    pub model_url: Option<String>,
    /// Where to download the labels file from
    pub labels_url: Option<String>,
    /// Use a local model instead of downloading one
    pub model_path: Option<PathBuf>,
    /// Use a local labels file instead of downloading one
    pub labels_path: Option<PathBuf>,
    /// Try GPU execution providers
    pub use_gpu: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            model_width: 320,
            model_height: 320,
            model_url: None,
            labels_url: None,
            model_path: None,
            labels_path: None,
            use_gpu: false,
        }
    }
}

/// Crop region inside the full frame (3:4 portrait by convention)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropSettings {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CropSettings {
    fn default() -> Self {
        // 3:4 window centred in a 640x480 preview
        Self {
            x: 140,
            y: 0,
            width: 360,
            height: 480,
        }
    }
}

/// Card catalog source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Base URL (or local directory) holding `{year}/{year}-{set}.json`
    pub base_url: String,
    /// HTTP timeout per catalog request
    pub request_timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: "https://raw.githubusercontent.com/JunkWaxData/JunkWaxData/main/data".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// What to do with the current result when a frame has no detections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFramePolicy {
    /// Forget the previous card
    #[default]
    Clear,
    /// Keep showing the previous card until a new one is identified
    Hold,
}

/// Periodic scan behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Milliseconds between scan triggers
    pub interval_ms: u64,
    /// Handling of frames without detections
    pub empty_frame: EmptyFramePolicy,
    /// Skip OCR while the current exact match is for the same set
    pub hold_exact_match: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            empty_frame: EmptyFramePolicy::Clear,
            hold_exact_match: true,
        }
    }
}

/// Text extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub backend: OcrBackend,
    /// PaddleOCR model files
    pub paddle: PaddleOcrSettings,
    /// Recognition language for the tesseract and Windows backends
    /// (ISO 639-2 for tesseract, e.g. "eng"; BCP-47 for Windows OCR, e.g. "en-US")
    pub language: String,
    /// Path to the tesseract executable
    pub tesseract_path: PathBuf,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            paddle: PaddleOcrSettings::default(),
            language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
        }
    }
}

/// Local overrides for the PaddleOCR files; unset entries are downloaded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddleOcrSettings {
    pub detection_model_path: Option<PathBuf>,
    pub recognition_model_path: Option<PathBuf>,
    pub dictionary_path: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
