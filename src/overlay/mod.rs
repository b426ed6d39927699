//! Overlay Presentation Layer
//!
//! Renderer-facing view of a scan cycle: the detection boxes to draw over the
//! preview and the text panel shown beside it. Drawing itself happens in
//! whatever front end consumes this.

use serde::Serialize;
use std::fmt::Write;

use crate::matching::MatchResult;
use crate::pipeline::CycleReport;

const PANEL_RULE: &str = "-------------------------";

/// One box to draw, in frame pixels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub label: String,
    pub confidence: f32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    /// This is the box the card match belongs to
    pub best: bool,
}

/// Everything the renderer needs for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayFrame {
    pub boxes: Vec<OverlayBox>,
    /// Side panel text, absent when nothing was detected
    pub panel: Option<String>,
    pub card_match: MatchResult,
}

impl OverlayFrame {
    /// Build the overlay for the report on display, if any
    pub fn from_report(report: Option<&CycleReport>) -> Self {
        let Some(report) = report else {
            return Self::default();
        };

        Self {
            boxes: overlay_boxes(report),
            panel: Some(format_card_panel(&report.best.label, &report.card_match)),
            card_match: report.card_match.clone(),
        }
    }
}

/// Every surviving prediction of a cycle as a drawable box
pub fn overlay_boxes(report: &CycleReport) -> Vec<OverlayBox> {
    let mut best_marked = false;

    report
        .predictions
        .iter()
        .map(|p| {
            let best = !best_marked && *p == report.best;
            best_marked |= best;
            OverlayBox {
                label: p.label.clone(),
                confidence: p.confidence,
                left: p.bounding_box.left(),
                top: p.bounding_box.top(),
                width: p.bounding_box.width(),
                height: p.bounding_box.height(),
                best,
            }
        })
        .collect()
}

/// Side panel text for a detected set and its resolved card.
///
/// ```text
/// Detected Card:
/// -------------------------
/// 2022 Topps-Chrome
/// #R1 - Julio Rodriguez
/// (Rookie Card)
/// ```
pub fn format_card_panel(label: &str, card_match: &MatchResult) -> String {
    let mut panel = String::new();
    let _ = writeln!(panel, "Detected Card:");
    let _ = writeln!(panel, "{}", PANEL_RULE);
    let _ = writeln!(panel, "{}", label.replace('|', " "));

    if let Some(card) = card_match.card() {
        let _ = writeln!(panel, "#{} - {}", card.number, card.name);
        if card.is_rookie() {
            let _ = writeln!(panel, "(Rookie Card)");
        }
    }

    panel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Card;
    use crate::vision::geometry::FrameGeometry;
    use crate::vision::Prediction;

    fn prediction(label: &str, confidence: f32, x0: f32) -> Prediction {
        let geometry = FrameGeometry {
            model_width: 320,
            model_height: 320,
            crop_x: 100,
            crop_y: 0,
            crop_width: 480,
            crop_height: 640,
        };
        Prediction {
            label: label.to_string(),
            confidence,
            bounding_box: geometry.to_frame_pixel(x0, 0.0, 1.0, 1.0).unwrap(),
        }
    }

    fn rookie() -> MatchResult {
        MatchResult::Exact {
            card: Card {
                number: "R1".to_string(),
                name: "Julio Rodriguez".to_string(),
                attributes: Some(vec!["RC".to_string()]),
            },
            extracted_text: "Julio Rodriguez".to_string(),
        }
    }

    #[test]
    fn test_panel_with_rookie_card() {
        let panel = format_card_panel("2022|Topps-Chrome", &rookie());
        assert_eq!(
            panel,
            "Detected Card:\n-------------------------\n2022 Topps-Chrome\n#R1 - Julio Rodriguez\n(Rookie Card)\n"
        );
    }

    #[test]
    fn test_panel_without_match() {
        let panel = format_card_panel("1989|Upper Deck", &MatchResult::None);
        assert_eq!(panel.lines().last(), Some("1989 Upper Deck"));
        assert!(!panel.contains('#'));
    }

    #[test]
    fn test_overlay_marks_best_box() {
        let best = prediction("2022|Topps-Chrome", 0.9, 0.0);
        let report = CycleReport {
            predictions: vec![prediction("1989|Topps", 0.6, 0.5), best.clone()],
            best,
            card_match: rookie(),
            reused: false,
        };

        let frame = OverlayFrame::from_report(Some(&report));
        assert_eq!(frame.boxes.len(), 2);
        assert!(!frame.boxes[0].best);
        assert!(frame.boxes[1].best);
        assert!((frame.boxes[1].left - 100.0).abs() < 1e-4);
        assert!(frame.panel.unwrap().contains("(Rookie Card)"));

        let json = serde_json::to_value(OverlayFrame::from_report(Some(&report))).unwrap();
        assert_eq!(json["boxes"][1]["label"], "2022|Topps-Chrome");
        assert_eq!(json["card_match"]["match"], "exact");
    }

    #[test]
    fn test_empty_overlay() {
        let frame = OverlayFrame::from_report(None);
        assert!(frame.boxes.is_empty());
        assert!(frame.panel.is_none());
    }
}
