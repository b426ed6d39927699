//! Scan loop: frames in, shared state and events out

use anyhow::Context;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{CycleOutcome, DetectionPipeline, ScanScheduler};
use crate::capture::FrameSource;
use crate::config::EmptyFramePolicy;
use crate::shared::{ScanEvent, SharedScanState};

/// Drive `pipeline` over `source` until the source runs dry or the
/// scheduler is cancelled.
pub async fn run_scan_loop(
    pipeline: Arc<DetectionPipeline>,
    source: Box<dyn FrameSource>,
    scheduler: Arc<ScanScheduler>,
    state: SharedScanState,
    events: Sender<ScanEvent>,
    policy: EmptyFramePolicy,
) {
    let source = Arc::new(Mutex::new(source));
    let cancel = scheduler.cancellation_token();

    scheduler
        .run(|| {
            let pipeline = Arc::clone(&pipeline);
            let source = Arc::clone(&source);
            let scheduler = Arc::clone(&scheduler);
            let state = Arc::clone(&state);
            let events = events.clone();
            let cancel = cancel.clone();

            async move {
                // frame sources decode images, keep that off the runtime threads
                let next = tokio::task::spawn_blocking(move || source.lock().next_frame())
                    .await
                    .context("Frame reader task failed")
                    .and_then(|next| next);
                let frame = match next {
                    Ok(Some(frame)) => Arc::new(frame),
                    Ok(None) => {
                        info!("Frame source exhausted");
                        cancel.cancel();
                        return;
                    }
                    Err(e) => {
                        warn!("Failed to read frame: {:#}", e);
                        state.write().last_error = Some(format!("{:#}", e));
                        return;
                    }
                };

                let prior = state.read().current.clone();
                let outcome = pipeline.run_cycle(frame, prior.as_ref()).await;

                let event = {
                    let mut state = state.write();
                    let had_result = state.current.is_some();
                    state.apply(&outcome, policy);
                    state.cycles_skipped = scheduler.cycles_skipped();

                    match outcome {
                        CycleOutcome::Detected(report) => ScanEvent::CardDetected(report),
                        CycleOutcome::NoDetections => ScanEvent::NothingDetected {
                            cleared: had_result && state.current.is_none(),
                        },
                        CycleOutcome::Aborted { reason } => ScanEvent::CycleFailed(reason),
                    }
                };

                if events.send(event).is_err() {
                    debug!("No event listener");
                }
            }
        })
        .await;

    state.write().cycles_skipped = scheduler.cycles_skipped();
    let _ = events.send(ScanEvent::Stopped);
}
