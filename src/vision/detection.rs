//! Card detection
//!
//! Runs the card detector and turns its raw output into predictions
//! positioned on the full frame.

use anyhow::Context;
use ndarray::Array4;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, EngineError};
use crate::vision::geometry::{BoundingBox, FrameGeometry};

const INPUT_NAME: &str = "image_tensor";
const BOXES_OUTPUT: &str = "detected_boxes";
const CLASSES_OUTPUT: &str = "detected_classes";
const SCORES_OUTPUT: &str = "detected_scores";

/// One box as emitted by the detector, corners normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: i64,
    pub score: f32,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// A detected card with its box in frame pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Detector label, `"{year}|{set name}"`
    pub label: String,
    /// Detector confidence (0.0 - 1.0)
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Detector backend
pub trait InferenceEngine: Send + Sync {
    /// Run the detector on a `[1, 3, H, W]` tensor
    fn infer(&self, tensor: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError>;
}

/// Map raw detector output to frame-pixel predictions.
///
/// Malformed boxes and boxes under `threshold` are dropped; order is kept.
pub fn decode_detections(
    raw: &[RawDetection],
    labels: &[String],
    geometry: &FrameGeometry,
    threshold: f32,
) -> Vec<Prediction> {
    raw.iter()
        .filter(|det| det.score >= threshold)
        .filter_map(|det| match decode_one(det, labels, geometry) {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                debug!("Dropping detection: {}", e);
                None
            }
        })
        .collect()
}

fn decode_one(det: &RawDetection, labels: &[String], geometry: &FrameGeometry) -> Result<Prediction, DecodeError> {
    let label = usize::try_from(det.class_id)
        .ok()
        .and_then(|idx| labels.get(idx))
        .ok_or(DecodeError::UnknownClass(det.class_id))?;

    let bounding_box = geometry.to_frame_pixel(det.x0, det.y0, det.x1, det.y1)?;

    Ok(Prediction {
        label: label.clone(),
        confidence: det.score,
        bounding_box,
    })
}

/// Highest-confidence prediction; the earliest one wins a tie
pub fn best_prediction(predictions: &[Prediction]) -> Option<&Prediction> {
    predictions.iter().fold(None, |best: Option<&Prediction>, p| match best {
        Some(b) if p.confidence <= b.confidence => Some(b),
        _ => Some(p),
    })
}

/// Parse a labels file: one label per line, blank lines ignored
pub fn parse_labels(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Card detector running an ONNX model through ONNX Runtime
pub struct OnnxDetector {
    session: Mutex<Session>,
}

impl OnnxDetector {
    /// Load the detector model
    pub fn new(model_path: &Path, use_gpu: bool) -> anyhow::Result<Self> {
        info!("Loading detector model from {:?}", model_path);

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        #[cfg(target_os = "windows")]
        let builder = if use_gpu {
            use ort::execution_providers::DirectMLExecutionProvider;
            match builder.with_execution_providers([DirectMLExecutionProvider::default().build()]) {
                Ok(builder) => {
                    info!("DirectML GPU acceleration enabled");
                    builder
                }
                Err(e) => {
                    warn!("DirectML not available, using CPU: {}", e);
                    Session::builder()?
                        .with_optimization_level(GraphOptimizationLevel::Level3)?
                        .with_intra_threads(4)?
                }
            }
        } else {
            builder
        };

        #[cfg(not(target_os = "windows"))]
        if use_gpu {
            warn!("GPU acceleration is only wired up for DirectML, using CPU");
        }

        let session = builder
            .commit_from_file(model_path)
            .context("Failed to load detector model")?;

        let input_names: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        info!("Detector loaded. Inputs: {:?}, Outputs: {:?}", input_names, output_names);

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl InferenceEngine for OnnxDetector {
    fn infer(&self, tensor: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
        let err = |e: ort::Error| EngineError::Inference(e.to_string());

        let input = TensorRef::from_array_view(tensor).map_err(err)?;
        let mut session = self.session.lock();
        let outputs = session.run(inputs![INPUT_NAME => input]).map_err(err)?;

        let boxes = outputs[BOXES_OUTPUT].try_extract_array::<f32>().map_err(err)?;
        let classes = outputs[CLASSES_OUTPUT].try_extract_array::<i64>().map_err(err)?;
        let scores = outputs[SCORES_OUTPUT].try_extract_array::<f32>().map_err(err)?;

        // boxes [1, N, 4], classes [1, N], scores [1, N]
        let count = classes.len();
        if scores.len() != count || boxes.len() != count * 4 {
            return Err(EngineError::Inference(format!(
                "mismatched detector outputs: {} boxes, {} classes, {} scores",
                boxes.len() / 4,
                count,
                scores.len()
            )));
        }

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let detections = classes
            .iter()
            .zip(scores.iter())
            .zip(boxes.chunks_exact(4))
            .map(|((&class_id, &score), b)| RawDetection {
                class_id,
                score,
                x0: b[0],
                y0: b[1],
                x1: b[2],
                y1: b[3],
            })
            .collect::<Vec<_>>();

        debug!("Detector returned {} boxes", detections.len());
        Ok(detections)
    }
}
