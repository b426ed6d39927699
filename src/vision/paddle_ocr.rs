//! PaddleOCR backend on ONNX Runtime
//!
//! Text detection finds line regions on the card crop, recognition reads
//! each of them. Lines come back top to bottom, left to right.

use anyhow::{Context, Result};
use image::RgbaImage;
use oar_ocr::pipeline::{OAROCRBuilder, OAROCR};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

use super::models::OcrAssets;
use super::ocr::TextExtractor;
use crate::error::EngineError;

/// One recognized region, positioned by its centre
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub center_x: f32,
    pub center_y: f32,
}

/// PaddleOCR detection + recognition pipeline
pub struct PaddleOcr {
    pipeline: Mutex<OAROCR>,
}

impl PaddleOcr {
    /// Load the models. Slow; call from a blocking context.
    pub fn new(assets: &OcrAssets) -> Result<Self> {
        info!("Loading PaddleOCR models from {:?}", assets.detection_model.parent());

        let pipeline = OAROCRBuilder::new(
            path_string(&assets.detection_model),
            path_string(&assets.recognition_model),
            path_string(&assets.dictionary),
        )
        .text_detection_batch_size(1)
        .text_recognition_batch_size(1)
        .text_rec_input_shape((3, 48, 320))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build PaddleOCR pipeline: {}", e))?;

        Ok(Self {
            pipeline: Mutex::new(pipeline),
        })
    }

    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TextLine>> {
        // the pipeline reads its input from disk
        let input = tempfile::Builder::new()
            .prefix("junkwax-crop-")
            .suffix(".png")
            .tempfile()
            .context("Failed to create temp file for OCR input")?;
        image
            .save(input.path())
            .context("Failed to write OCR input")?;

        let result = self
            .pipeline
            .lock()
            .predict(input.path())
            .map_err(|e| anyhow::anyhow!("PaddleOCR failed: {}", e))?;

        Ok(result
            .text_boxes
            .iter()
            .zip(result.rec_texts.iter())
            .filter_map(|(bbox, text)| {
                let count = bbox.points.len() as f32;
                if count == 0.0 {
                    return None;
                }
                Some(TextLine {
                    text: text.to_string(),
                    center_x: bbox.points.iter().map(|p| p.x).sum::<f32>() / count,
                    center_y: bbox.points.iter().map(|p| p.y).sum::<f32>() / count,
                })
            })
            .collect())
    }
}

impl TextExtractor for PaddleOcr {
    fn extract_text(&self, image: &RgbaImage) -> Result<Vec<String>, EngineError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(vec![]);
        }

        let regions = self
            .recognize(image)
            .map_err(|e| EngineError::Ocr(format!("{:#}", e)))?;
        let lines = reading_order(regions);
        debug!("PaddleOCR: {} lines from {}x{} crop", lines.len(), width, height);
        Ok(lines)
    }
}

/// Sort regions by centre row then column and keep the non-blank text
pub fn reading_order(mut regions: Vec<TextLine>) -> Vec<String> {
    regions.sort_by(|a, b| {
        a.center_y
            .total_cmp(&b.center_y)
            .then(a.center_x.total_cmp(&b.center_x))
    });

    regions
        .into_iter()
        .map(|line| line.text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
