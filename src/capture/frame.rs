//! Frame data structures for captured preview content

use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A full, un-cropped frame from the preview
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// RGBA pixels
    pub image: RgbaImage,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
    /// File the frame was read from, if any
    pub source: Option<PathBuf>,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            timestamp: Instant::now(),
            source: None,
        }
    }

    /// Decode a frame from an image file
    pub fn from_path(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to load frame {:?}", path))?
            .to_rgba8();

        Ok(Self {
            image,
            timestamp: Instant::now(),
            source: Some(path.to_path_buf()),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Copy out a rectangle, clipped to the frame.
    ///
    /// Returns `None` when the clipped rectangle is empty.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Option<RgbaImage> {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);

        if width == 0 || height == 0 {
            return None;
        }

        Some(image::imageops::crop_imm(&self.image, x, y, width, height).to_image())
    }
}
