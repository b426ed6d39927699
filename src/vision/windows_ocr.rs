//! Windows OCR API backend (Media.Ocr), one candidate per recognized line

use anyhow::{Context, Result};
use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, warn};
use windows::{
    core::HSTRING,
    Globalization::Language,
    Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap},
    Media::Ocr::OcrEngine,
    Storage::Streams::DataWriter,
};

use crate::error::EngineError;
use crate::vision::ocr::TextExtractor;

pub struct WindowsOcr {
    engine: Mutex<OcrEngine>,
}

impl WindowsOcr {
    /// Engine for a BCP-47 tag, or the user profile languages if the tag is unsupported
    pub fn new(language_tag: &str) -> Result<Self> {
        let language = Language::CreateLanguage(&HSTRING::from(language_tag))?;
        let engine = OcrEngine::TryCreateFromLanguage(&language).or_else(|_| {
            warn!("OCR language '{}' unavailable, using profile languages", language_tag);
            OcrEngine::TryCreateFromUserProfileLanguages()
        })?;

        Ok(Self {
            engine: Mutex::new(engine),
        })
    }

    fn recognize_lines(&self, image: &RgbaImage) -> Result<Vec<String>> {
        let writer = DataWriter::new()?;
        writer.WriteBytes(&rgba_to_bgra(image.as_raw()))?;
        let bitmap = SoftwareBitmap::CreateCopyFromBuffer(
            &writer.DetachBuffer()?,
            BitmapPixelFormat::Bgra8,
            image.width() as i32,
            image.height() as i32,
        )
        .context("Failed to wrap crop as a bitmap")?;

        let result = self.engine.lock().RecognizeAsync(&bitmap)?.get()?;

        let mut lines = Vec::new();
        for line in result.Lines()? {
            let text = line.Text()?.to_string();
            if !text.trim().is_empty() {
                lines.push(text);
            }
        }
        Ok(lines)
    }
}

impl TextExtractor for WindowsOcr {
    fn extract_text(&self, image: &RgbaImage) -> Result<Vec<String>, EngineError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(vec![]);
        }

        let lines = self
            .recognize_lines(image)
            .map_err(|e| EngineError::Ocr(format!("{:#}", e)))?;
        debug!("Windows OCR: {} lines", lines.len());
        Ok(lines)
    }
}

/// SoftwareBitmap wants BGRA
fn rgba_to_bgra(rgba: &[u8]) -> Vec<u8> {
    let mut bgra = rgba.to_vec();
    for pixel in bgra.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
    bgra
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_to_bgra() {
        assert_eq!(rgba_to_bgra(&[1, 2, 3, 4, 5, 6, 7, 8]), vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }
}
