//! Scan state shared between the scan loop and whatever renders it

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::EmptyFramePolicy;
use crate::matching::MatchResult;
use crate::pipeline::{CycleOutcome, CycleReport};

/// Scan state behind a lock, cloned into every consumer
pub type SharedScanState = Arc<RwLock<ScanState>>;

/// Current result plus counters for the running session
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    /// Report currently on display
    pub current: Option<CycleReport>,
    /// Cycles that ran to completion, aborted ones included
    pub cycles_run: u64,
    /// Cycles that found nothing
    pub empty_cycles: u64,
    /// Triggers dropped because a cycle was running
    pub cycles_skipped: u64,
    /// Reason the most recent aborted cycle gave
    pub last_error: Option<String>,
}

impl ScanState {
    pub fn shared() -> SharedScanState {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Fold one cycle outcome into the state
    pub fn apply(&mut self, outcome: &CycleOutcome, policy: EmptyFramePolicy) {
        self.cycles_run += 1;

        match outcome {
            CycleOutcome::Detected(report) => {
                self.current = Some(report.clone());
                self.last_error = None;
            }
            CycleOutcome::NoDetections => {
                self.empty_cycles += 1;
                if policy == EmptyFramePolicy::Clear {
                    self.current = None;
                }
            }
            // an aborted cycle says nothing about what is in front of the camera
            CycleOutcome::Aborted { reason } => {
                self.last_error = Some(reason.clone());
            }
        }
    }

    /// Match currently on display
    pub fn current_match(&self) -> &MatchResult {
        static NONE: MatchResult = MatchResult::None;
        self.current.as_ref().map_or(&NONE, |report| &report.card_match)
    }
}
