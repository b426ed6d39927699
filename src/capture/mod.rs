//! Frame capture
//!
//! Live camera capture lives outside this crate; frames arrive through a
//! [`FrameSource`]. The bundled source replays image files from a directory.

pub mod frame;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use self::frame::CapturedFrame;

/// Anything that can hand out the next preview frame
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Replays the image files of a directory in name order
pub struct DirectoryFrameSource {
    frames: Vec<PathBuf>,
    position: usize,
    looping: bool,
}

impl DirectoryFrameSource {
    pub fn open(dir: &Path, looping: bool) -> Result<Self> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_frame_file(path))
            .collect();
        frames.sort();

        info!("Replaying {} frames from {:?}", frames.len(), dir);

        Ok(Self {
            frames,
            position: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        if self.position >= self.frames.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }

        let path = &self.frames[self.position];
        self.position += 1;

        debug!("Next frame {:?}", path);
        CapturedFrame::from_path(path).map(Some)
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
