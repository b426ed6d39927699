//! Vision Layer
//!
//! Card detection on captured frames and text extraction from the detected
//! card. Supports three OCR backends:
//! - PaddleOCR via ONNX Runtime (default)
//! - Tesseract command line tool
//! - Windows OCR API

pub mod detection;
pub mod geometry;
pub mod models;
pub mod ocr;
pub mod paddle_ocr;
pub mod preprocess;
#[cfg(windows)]
pub mod windows_ocr;

pub use detection::{best_prediction, decode_detections, InferenceEngine, OnnxDetector, Prediction, RawDetection};
pub use geometry::{BoundingBox, CoordinateSpace, FrameGeometry};
pub use models::{DetectorAssets, ModelManager};
pub use ocr::{create_text_extractor, OcrBackend, TextExtractor};
pub use preprocess::{prepare_model_input, CropRegion, ModelInput};
