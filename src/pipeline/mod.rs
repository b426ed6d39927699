//! Detection-to-identification pipeline
//!
//! One cycle takes a frame through the detector, picks the most confident
//! card, reads its text and resolves it against the set catalog named by the
//! detector label.

pub mod scheduler;
pub mod session;

pub use scheduler::ScanScheduler;
pub use session::run_scan_loop;

use ndarray::Array4;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capture::frame::CapturedFrame;
use crate::catalog::SetKey;
use crate::config::AppConfig;
use crate::error::EngineError;
use crate::matching::{CardMatcher, MatchResult};
use crate::vision::{
    best_prediction, decode_detections, prepare_model_input, FrameGeometry, InferenceEngine, Prediction,
    TextExtractor,
};

/// Result of a cycle that found at least one card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Every prediction above the threshold, in detector order
    pub predictions: Vec<Prediction>,
    /// Highest-confidence prediction
    pub best: Prediction,
    /// Card resolved for `best`
    pub card_match: MatchResult,
    /// `card_match` was carried over from the previous cycle without OCR
    pub reused: bool,
}

/// What one cycle produced
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Detected(CycleReport),
    /// Nothing cleared the confidence threshold
    NoDetections,
    /// An engine failed; nothing was detected this cycle
    Aborted { reason: String },
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Detected(report) => Some(report),
            _ => None,
        }
    }
}

/// Runs detection cycles against shared engines and catalog
pub struct DetectionPipeline {
    engine: Arc<dyn InferenceEngine>,
    labels: Arc<Vec<String>>,
    ocr: Arc<dyn TextExtractor>,
    matcher: CardMatcher,
    geometry: FrameGeometry,
    threshold: f32,
    hold_exact_match: bool,
}

impl DetectionPipeline {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        labels: Vec<String>,
        ocr: Arc<dyn TextExtractor>,
        matcher: CardMatcher,
        config: &AppConfig,
    ) -> Self {
        info!(
            "Pipeline ready: {} labels, threshold {}, model {}x{}",
            labels.len(),
            config.detection.threshold,
            config.detection.model_width,
            config.detection.model_height
        );

        Self {
            engine,
            labels: Arc::new(labels),
            ocr,
            matcher,
            geometry: config.frame_geometry(),
            threshold: config.detection.threshold,
            hold_exact_match: config.scan.hold_exact_match,
        }
    }

    /// Run one full cycle. `prior` is the report currently on display.
    ///
    /// Engine failures are logged and reported as [`CycleOutcome::Aborted`].
    pub async fn run_cycle(&self, frame: Arc<CapturedFrame>, prior: Option<&CycleReport>) -> CycleOutcome {
        match self.try_cycle(frame, prior).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Scan cycle aborted: {}", e);
                CycleOutcome::Aborted { reason: e.to_string() }
            }
        }
    }

    async fn try_cycle(&self, frame: Arc<CapturedFrame>, prior: Option<&CycleReport>) -> Result<CycleOutcome, EngineError> {
        let predictions = self.detect(Arc::clone(&frame)).await?;

        let Some(best) = best_prediction(&predictions).cloned() else {
            debug!("No detections above {}", self.threshold);
            return Ok(CycleOutcome::NoDetections);
        };

        if let Some(prior) = prior.filter(|p| self.hold_exact_match && p.card_match.is_exact()) {
            if prior.best.label == best.label {
                debug!("Holding exact match for {}", best.label);
                return Ok(CycleOutcome::Detected(CycleReport {
                    card_match: prior.card_match.clone(),
                    predictions,
                    best,
                    reused: true,
                }));
            }
        }

        let card_match = self.identify(frame, &best).await?;
        Ok(CycleOutcome::Detected(CycleReport {
            predictions,
            best,
            card_match,
            reused: false,
        }))
    }

    /// Detect cards in a frame; boxes come back in frame pixels
    pub async fn detect(&self, frame: Arc<CapturedFrame>) -> Result<Vec<Prediction>, EngineError> {
        let geometry = self.geometry;
        let input = tokio::task::spawn_blocking(move || prepare_model_input(&frame, &geometry))
            .await
            .map_err(|e| EngineError::Preprocess(format!("preprocessing task failed: {}", e)))??;

        // rescale against the crop actually taken, which may be clipped
        let geometry = FrameGeometry {
            crop_x: input.region.x,
            crop_y: input.region.y,
            crop_width: input.region.width,
            crop_height: input.region.height,
            ..self.geometry
        };

        let raw = run_inference(Arc::clone(&self.engine), input.tensor).await?;
        let predictions = decode_detections(&raw, &self.labels, &geometry, self.threshold);
        debug!("{} raw boxes, {} predictions", raw.len(), predictions.len());

        Ok(predictions)
    }

    /// Read the text on `prediction`'s card and resolve it.
    ///
    /// Returns the first exact match over all OCR lines, else the first
    /// partial one.
    pub async fn identify(&self, frame: Arc<CapturedFrame>, prediction: &Prediction) -> Result<MatchResult, EngineError> {
        let key: SetKey = match prediction.label.parse() {
            Ok(key) => key,
            Err(e) => {
                warn!("{}", e);
                return Ok(MatchResult::None);
            }
        };

        let Some((x, y, width, height)) = prediction
            .bounding_box
            .clamped_pixel_rect(frame.width(), frame.height())
        else {
            debug!("Best box for {} lies outside the frame", prediction.label);
            return Ok(MatchResult::None);
        };

        let ocr = Arc::clone(&self.ocr);
        let lines = tokio::task::spawn_blocking(move || match frame.crop(x, y, width, height) {
            Some(crop) => ocr.extract_text(&crop),
            None => Ok(Vec::new()),
        })
        .await
        .map_err(|e| EngineError::Ocr(format!("OCR task failed: {}", e)))??;
        debug!("OCR lines for {}: {:?}", key, lines);

        let mut first_partial = None;
        for line in &lines {
            let result = self.matcher.search(&key, line).await;
            match result {
                MatchResult::Exact { .. } => return Ok(result),
                MatchResult::Partial { .. } if first_partial.is_none() => first_partial = Some(result),
                _ => {}
            }
        }

        Ok(first_partial.unwrap_or_default())
    }
}

async fn run_inference(
    engine: Arc<dyn InferenceEngine>,
    tensor: Array4<f32>,
) -> Result<Vec<crate::vision::RawDetection>, EngineError> {
    tokio::task::spawn_blocking(move || engine.infer(&tensor))
        .await
        .map_err(|e| EngineError::Inference(format!("inference task failed: {}", e)))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::cache::tests::{CountingFetcher, TOPPS_CHROME};
    use crate::catalog::CatalogCache;
    use crate::matching::MatchKind;
    use crate::vision::RawDetection;
    use image::RgbaImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same boxes for every frame
    pub(crate) struct FixedEngine(pub Vec<RawDetection>);

    impl InferenceEngine for FixedEngine {
        fn infer(&self, tensor: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
            assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
            Ok(self.0.clone())
        }
    }

    struct BrokenEngine;

    impl InferenceEngine for BrokenEngine {
        fn infer(&self, _tensor: &Array4<f32>) -> Result<Vec<RawDetection>, EngineError> {
            Err(EngineError::Inference("session lost".to_string()))
        }
    }

    /// Returns fixed lines and counts calls
    pub(crate) struct ScriptedOcr {
        pub lines: Vec<String>,
        pub calls: AtomicUsize,
    }

    impl ScriptedOcr {
        pub(crate) fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextExtractor for ScriptedOcr {
        fn extract_text(&self, image: &RgbaImage) -> Result<Vec<String>, EngineError> {
            assert!(image.width() > 0 && image.height() > 0);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lines.clone())
        }
    }

    pub(crate) fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.crop.x = 100;
        config.crop.y = 0;
        config.crop.width = 480;
        config.crop.height = 640;
        config
    }

    pub(crate) fn test_frame() -> Arc<CapturedFrame> {
        Arc::new(CapturedFrame::new(RgbaImage::new(640, 640)))
    }

    pub(crate) fn card_box(score: f32) -> RawDetection {
        RawDetection {
            class_id: 1,
            score,
            x0: 0.1,
            y0: 0.1,
            x1: 0.6,
            y1: 0.6,
        }
    }

    pub(crate) fn pipeline_with(
        engine: impl InferenceEngine + 'static,
        ocr: Arc<ScriptedOcr>,
    ) -> (DetectionPipeline, Arc<CountingFetcher>) {
        let fetcher = Arc::new(CountingFetcher::new(TOPPS_CHROME));
        let cache = CatalogCache::new("https://example.test/data", Box::new(Arc::clone(&fetcher)));
        let pipeline = DetectionPipeline::new(
            Arc::new(engine),
            vec!["1989|Topps".to_string(), "2022|Topps-Chrome".to_string()],
            ocr,
            CardMatcher::new(Arc::new(cache)),
            &test_config(),
        );
        (pipeline, fetcher)
    }

    #[tokio::test]
    async fn test_cycle_resolves_best_card() {
        let ocr = Arc::new(ScriptedOcr::new(&["Ronald Acuna Jr. RF", "garbage123"]));
        let (pipeline, fetcher) = pipeline_with(FixedEngine(vec![card_box(0.9)]), Arc::clone(&ocr));

        let outcome = pipeline.run_cycle(test_frame(), None).await;
        let report = outcome.report().unwrap();

        assert_eq!(report.best.label, "2022|Topps-Chrome");
        assert!(!report.reused);
        assert_eq!(report.card_match.kind(), MatchKind::Partial);
        assert_eq!(report.card_match.card().unwrap().name, "Ronald Acuna Jr.");
        assert_eq!(report.card_match.extracted_text(), Some("Ronald Acuna"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_predictions_are_in_frame_pixels() {
        let ocr = Arc::new(ScriptedOcr::new(&[]));
        let (pipeline, _) = pipeline_with(FixedEngine(vec![card_box(0.9)]), ocr);

        let predictions = pipeline.detect(test_frame()).await.unwrap();
        let bbox = &predictions[0].bounding_box;

        // 0.1 * 480 + 100 and 0.6 * 640
        assert!((bbox.left() - 148.0).abs() < 1e-3);
        assert!((bbox.bottom() - 384.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_exact_line_wins_over_earlier_partial() {
        let ocr = Arc::new(ScriptedOcr::new(&["Mike Trou", "MIKE TROUT"]));
        let (pipeline, _) = pipeline_with(FixedEngine(vec![card_box(0.9)]), ocr);

        let report = pipeline.run_cycle(test_frame(), None).await.report().cloned().unwrap();
        assert!(report.card_match.is_exact());
        assert_eq!(report.card_match.card().unwrap().number, "1");
    }

    #[tokio::test]
    async fn test_below_threshold_is_no_detections() {
        let ocr = Arc::new(ScriptedOcr::new(&["Mike Trout"]));
        let (pipeline, fetcher) = pipeline_with(FixedEngine(vec![card_box(0.3)]), Arc::clone(&ocr));

        assert_eq!(pipeline.run_cycle(test_frame(), None).await, CycleOutcome::NoDetections);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_aborts_cycle() {
        let ocr = Arc::new(ScriptedOcr::new(&["Mike Trout"]));
        let (pipeline, _) = pipeline_with(BrokenEngine, ocr);

        let outcome = pipeline.run_cycle(test_frame(), None).await;
        assert!(matches!(outcome, CycleOutcome::Aborted { ref reason } if reason.contains("session lost")));
    }

    #[tokio::test]
    async fn test_exact_match_is_held_for_same_set() {
        let ocr = Arc::new(ScriptedOcr::new(&["Mike Trout"]));
        let (pipeline, _) = pipeline_with(FixedEngine(vec![card_box(0.9)]), Arc::clone(&ocr));
        let frame = test_frame();

        let first = pipeline.run_cycle(Arc::clone(&frame), None).await.report().cloned().unwrap();
        assert!(first.card_match.is_exact());

        let second = pipeline.run_cycle(Arc::clone(&frame), Some(&first)).await.report().cloned().unwrap();
        assert!(second.reused);
        assert_eq!(second.card_match, first.card_match);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exact_match_for_other_set_is_not_held() {
        let ocr = Arc::new(ScriptedOcr::new(&["Mike Trout"]));
        let (pipeline, _) = pipeline_with(FixedEngine(vec![card_box(0.9)]), Arc::clone(&ocr));
        let frame = test_frame();

        let mut prior = pipeline.run_cycle(Arc::clone(&frame), None).await.report().cloned().unwrap();
        assert!(prior.card_match.is_exact());
        prior.best.label = "1989|Topps".to_string();

        let next = pipeline.run_cycle(Arc::clone(&frame), Some(&prior)).await.report().cloned().unwrap();
        assert!(!next.reused);
        assert_eq!(next.best.label, "2022|Topps-Chrome");
        assert!(next.card_match.is_exact());
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_partial_match_is_retried() {
        let ocr = Arc::new(ScriptedOcr::new(&["Mike Trou"]));
        let (pipeline, _) = pipeline_with(FixedEngine(vec![card_box(0.9)]), Arc::clone(&ocr));
        let frame = test_frame();

        let first = pipeline.run_cycle(Arc::clone(&frame), None).await.report().cloned().unwrap();
        assert_eq!(first.card_match.kind(), MatchKind::Partial);

        let second = pipeline.run_cycle(Arc::clone(&frame), Some(&first)).await.report().cloned().unwrap();
        assert!(!second.reused);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unparseable_label_gives_no_match() {
        let ocr = Arc::new(ScriptedOcr::new(&["Mike Trout"]));
        let (pipeline, fetcher) = pipeline_with(FixedEngine(vec![]), Arc::clone(&ocr));

        let frame = test_frame();
        let prediction = Prediction {
            label: "no-separator".to_string(),
            confidence: 0.9,
            bounding_box: test_config().frame_geometry().to_frame_pixel(0.1, 0.1, 0.6, 0.6).unwrap(),
        };

        assert_eq!(pipeline.identify(frame, &prediction).await.unwrap(), MatchResult::None);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
