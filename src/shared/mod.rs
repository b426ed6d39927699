//! Shared scan state and event messages
//!
//! The scan loop writes the state and publishes events; a renderer reads
//! the state or drains the event channel.

pub mod messages;
pub mod state;

pub use messages::ScanEvent;
pub use state::{ScanState, SharedScanState};
