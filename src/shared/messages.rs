//! Events published by the scan loop

use crate::pipeline::CycleReport;

/// Sent once per finished cycle and at shutdown
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A card was detected; the report may carry a held match
    CardDetected(CycleReport),
    /// No card above threshold; `cleared` tells whether the last result was dropped
    NothingDetected { cleared: bool },
    /// The cycle aborted on an engine error
    CycleFailed(String),
    /// The frame source ran dry or the loop was cancelled
    Stopped,
}
