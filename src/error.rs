//! Error types for the detection-to-identification core
//!
//! Every failure here is contained within a single scan cycle. Application
//! edges (CLI, config, model downloads) use `anyhow` instead.

use thiserror::Error;

/// A raw detector box that cannot be turned into a prediction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Right/bottom edge lies before the left/top edge
    #[error("inverted box: ({x0}, {y0}) -> ({x1}, {y1})")]
    InvertedBox { x0: f32, y0: f32, x1: f32, y1: f32 },

    /// NaN or infinite coordinate
    #[error("non-finite box coordinate")]
    NonFinite,

    /// Class id has no entry in the labels file
    #[error("unknown class id {0}")]
    UnknownClass(i64),
}

/// Failure reported by an asset fetcher
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("offline mode: refusing to fetch {0}")]
    Offline(String),
}

/// Catalog could not be made available for a set key.
///
/// Cloneable so that every waiter of a shared load can observe it.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("invalid set label '{0}', expected 'year|set name'")]
    InvalidSetKey(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to parse catalog {url}: {message}")]
    Parse { url: String, message: String },
}

/// Inference or OCR engine failure; aborts the current cycle only
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("text extraction failed: {0}")]
    Ocr(String),

    #[error("frame preprocessing failed: {0}")]
    Preprocess(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_wraps_fetch_error() {
        let err: LoadError = FetchError::Status {
            url: "https://example.test/1989/1989-Topps.json".to_string(),
            status: 404,
        }
        .into();

        assert!(matches!(err, LoadError::Fetch(FetchError::Status { status: 404, .. })));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::UnknownClass(7);
        assert_eq!(err.to_string(), "unknown class id 7");
    }
}
