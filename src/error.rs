//! Error types for the virtual try-on library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Camera could not be acquired (permission denied, device busy, ...)
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Landmark detector could not be initialized
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    /// Landmark detection failed for a single frame
    #[error("Detection error: {0}")]
    DetectionError(String),

    /// 3D overlay asset failed to load
    #[error("Asset load error: {0}")]
    AssetLoad(String),

    /// Operation is not valid in the current session state
    #[error("Session error: {0}")]
    SessionError(String),

    /// Replay trace could not be parsed
    #[error("Trace error: {0}")]
    TraceError(String),
}

impl Error {
    /// Whether this error prevents a try-on session from running at all.
    ///
    /// Asset and per-frame detection failures leave the frame loop running.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AssetLoad(_) | Self::DetectionError(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::CameraUnavailable("denied".to_string()).is_fatal());
        assert!(Error::DetectorUnavailable("no gpu".to_string()).is_fatal());
        assert!(!Error::AssetLoad("404".to_string()).is_fatal());
        assert!(!Error::DetectionError("timeout".to_string()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::CameraUnavailable("permission denied".to_string());
        assert_eq!(err.to_string(), "Camera unavailable: permission denied");
    }
}
