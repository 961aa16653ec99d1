//! Failure taxonomy for the capture and processing pipeline. Every variant
//! carries enough text that the UI layer can show the user an actionable
//! message instead of a generic error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    /// The requested input device is missing, busy, or permission-denied.
    /// The string preserves the host audio subsystem's own diagnostic.
    #[error("audio device unavailable: {0}; try another device or check microphone permissions")]
    DeviceUnavailable(String),

    /// I/O failure mid-capture. Fatal to the current session; partial audio
    /// already captured is still returned to the caller where possible.
    #[error("audio stream read failed: {0}")]
    StreamReadError(String),

    /// Only one level monitor may run per process.
    #[error("a level monitor is already running; stop it before starting another")]
    AlreadyMonitoring,

    /// Silence trimming removed the entire waveform.
    #[error("recording contained no audible signal after trimming silence")]
    EmptyAfterTrim,

    /// Segmentation or characterization had nothing to work with.
    #[error("no usable voice samples; record a longer or cleaner source")]
    NoSamples,
}

pub type Result<T, E = AudioError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_unavailable_preserves_host_message() {
        let err = AudioError::DeviceUnavailable("device busy (in use by another stream)".into());
        let text = err.to_string();
        assert!(text.contains("device busy"));
        assert!(text.contains("permissions"));
    }

    #[test]
    fn empty_after_trim_is_distinct_from_no_samples() {
        assert_ne!(
            AudioError::EmptyAfterTrim.to_string(),
            AudioError::NoSamples.to_string()
        );
    }
}
