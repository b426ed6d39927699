//! Model asset management
//!
//! Downloads and caches the card detector model, its labels file and the
//! PaddleOCR detection/recognition models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{DetectionSettings, PaddleOcrSettings};
use crate::vision::detection::parse_labels;

/// Files making up the card detector and the PaddleOCR engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// ONNX object detection model
    Model,
    /// Newline-separated class labels, `"{year}|{set name}"` per line
    Labels,
    /// PaddleOCR text detection model (DBNet)
    OcrDetection,
    /// PaddleOCR English recognition model
    OcrRecognition,
    /// Character dictionary for the recognition model
    OcrDictionary,
}

impl AssetKind {
    /// Cached file name
    pub fn filename(&self) -> &'static str {
        match self {
            AssetKind::Model => "card_detector.onnx",
            AssetKind::Labels => "labels.txt",
            AssetKind::OcrDetection => "ocr_det.onnx",
            AssetKind::OcrRecognition => "ocr_rec.onnx",
            AssetKind::OcrDictionary => "ocr_dict.txt",
        }
    }

    /// Public download location, if the asset has one.
    /// The card detector is project specific and must be configured.
    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            AssetKind::Model | AssetKind::Labels => None,
            AssetKind::OcrDetection => {
                Some("https://huggingface.co/monkt/paddleocr-onnx/resolve/main/detection/v3/det.onnx")
            }
            AssetKind::OcrRecognition => {
                Some("https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/rec.onnx")
            }
            AssetKind::OcrDictionary => {
                Some("https://huggingface.co/monkt/paddleocr-onnx/resolve/main/languages/english/dict.txt")
            }
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AssetKind::Model => "Card Detector",
            AssetKind::Labels => "Detector Labels",
            AssetKind::OcrDetection => "OCR Detection Model",
            AssetKind::OcrRecognition => "OCR Recognition Model",
            AssetKind::OcrDictionary => "OCR Dictionary",
        }
    }
}

/// Manifest of downloaded assets
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AssetManifest {
    pub assets: Vec<AssetInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AssetInfo {
    pub filename: String,
    pub source_url: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Unix seconds
    pub downloaded_at: u64,
}

/// Resolved on-disk detector files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorAssets {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
}

impl DetectorAssets {
    pub fn load_labels(&self) -> Result<Vec<String>> {
        load_labels(&self.labels_path)
    }
}

/// Resolved on-disk PaddleOCR files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrAssets {
    pub detection_model: PathBuf,
    pub recognition_model: PathBuf,
    pub dictionary: PathBuf,
}

/// Read and parse a labels file
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read labels {:?}", path))?;
    let labels = parse_labels(&content);
    if labels.is_empty() {
        anyhow::bail!("Labels file {:?} is empty", path);
    }
    Ok(labels)
}

/// Downloads model assets into the models directory and reuses cached copies
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Manager rooted at the default models directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            models_dir: crate::storage::get_models_dir()?,
        })
    }

    /// Create model manager with custom directory
    pub fn with_dir(models_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    pub fn asset_path(&self, kind: AssetKind) -> PathBuf {
        self.models_dir.join(kind.filename())
    }

    /// Whether a non-empty cached copy exists
    pub fn is_available(&self, kind: AssetKind) -> bool {
        std::fs::metadata(self.asset_path(kind))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Locate the model and labels, downloading whatever is missing.
    ///
    /// Explicit paths in the settings win over the cache and are never downloaded.
    pub async fn resolve_detector(&self, settings: &DetectionSettings) -> Result<DetectorAssets> {
        let model_path = self
            .resolve(AssetKind::Model, settings.model_path.as_deref(), settings.model_url.as_deref())
            .await?;
        let labels_path = self
            .resolve(AssetKind::Labels, settings.labels_path.as_deref(), settings.labels_url.as_deref())
            .await?;

        Ok(DetectorAssets { model_path, labels_path })
    }

    /// Locate the PaddleOCR models and dictionary, same rules as the detector
    pub async fn resolve_ocr(&self, settings: &PaddleOcrSettings) -> Result<OcrAssets> {
        let detection_model = self
            .resolve(AssetKind::OcrDetection, settings.detection_model_path.as_deref(), None)
            .await?;
        let recognition_model = self
            .resolve(AssetKind::OcrRecognition, settings.recognition_model_path.as_deref(), None)
            .await?;
        let dictionary = self
            .resolve(AssetKind::OcrDictionary, settings.dictionary_path.as_deref(), None)
            .await?;

        Ok(OcrAssets {
            detection_model,
            recognition_model,
            dictionary,
        })
    }

    async fn resolve(&self, kind: AssetKind, path: Option<&Path>, url: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(path) => existing_file(path),
            None => self.ensure_asset(kind, url.or(kind.default_url())).await,
        }
    }

    /// Return the cached asset, downloading it from `url` when absent
    pub async fn ensure_asset(&self, kind: AssetKind, url: Option<&str>) -> Result<PathBuf> {
        let path = self.asset_path(kind);

        if self.is_available(kind) {
            debug!("{} already available at {:?}", kind.display_name(), path);
            return Ok(path);
        }

        let Some(url) = url else {
            anyhow::bail!(
                "{} not found at {:?} and no download URL is configured",
                kind.display_name(),
                path
            );
        };

        self.download(kind, url).await?;
        Ok(path)
    }

    /// Download an asset, replacing any cached copy
    pub async fn download(&self, kind: AssetKind, url: &str) -> Result<()> {
        let path = self.asset_path(kind);

        if crate::config::offline_mode() {
            anyhow::bail!(
                "Offline mode: cannot download {}. Place it manually at {:?}",
                kind.display_name(),
                path
            );
        }

        info!("Downloading {} from {}", kind.display_name(), url);
        let (size_bytes, sha256) = download_file(url, &path).await?;
        info!("Downloaded {} ({} bytes, sha256 {})", kind.display_name(), size_bytes, sha256);

        self.record_download(AssetInfo {
            filename: kind.filename().to_string(),
            source_url: url.to_string(),
            size_bytes,
            sha256,
            downloaded_at: unix_now(),
        })
    }

    fn manifest_path(&self) -> PathBuf {
        self.models_dir.join("manifest.json")
    }

    pub fn load_manifest(&self) -> Result<AssetManifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(AssetManifest::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn save_manifest(&self, manifest: &AssetManifest) -> Result<()> {
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(self.manifest_path(), content)?;
        Ok(())
    }

    fn record_download(&self, info: AssetInfo) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();
        match manifest.assets.iter_mut().find(|a| a.filename == info.filename) {
            Some(existing) => *existing = info,
            None => manifest.assets.push(info),
        }
        self.save_manifest(&manifest)
    }
}

fn existing_file(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        anyhow::bail!("Configured file {:?} does not exist", path);
    }
    Ok(path.to_path_buf())
}

/// Stream `url` into `path` through a temp file; returns size and SHA-256
async fn download_file(url: &str, path: &Path) -> Result<(u64, String)> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    debug!("Download size: {:?} bytes", response.content_length());

    let temp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).await.context("Failed to write to temp file")?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
    }

    file.flush().await.context("Failed to flush temp file")?;
    drop(file);

    if downloaded == 0 {
        tokio::fs::remove_file(&temp_path).await.ok();
        anyhow::bail!("Downloaded file from {} is empty", url);
    }

    tokio::fs::rename(&temp_path, path)
        .await
        .context("Failed to move downloaded file to final location")?;

    Ok((downloaded, format!("{:x}", hasher.finalize())))
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
