//! Error types for pcm-stream.
//!
//! Errors are split into two categories:
//! - **Decode errors** ([`DecodeError`]): malformed or unsupported encoded
//!   input, failures to open a source, and seek failures. Never retried
//!   automatically; always surfaced to the caller that issued the call.
//! - **Operational errors** ([`AudioError`]): backend/device/converter
//!   failures, contract violations, and invalid state transitions.
//!
//! An involuntary device stop (hardware unplugged, backend failure) is *not*
//! an error: it is a state transition observed through
//! [`is_running()`](crate::device::PlaybackDevice::is_running) or the
//! registered stop callback.

use std::path::PathBuf;

/// Operational failures in devices, converters, and buffers.
///
/// These indicate either a configuration the backend cannot satisfy or a
/// broken caller contract. Contract violations (a producer returning more
/// frames than requested, a byte buffer that is not a whole number of
/// frames) are fatal for the stream they occur on: the device or converter
/// stops rather than corrupting a buffer.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// No usable audio backend could be initialized.
    #[error("no audio backend available: {reason}")]
    NoBackend {
        /// Why the backend could not be initialized.
        reason: String,
    },

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default device of the requested kind is configured.
    #[error("no default device configured")]
    NoDefaultDevice,

    /// The requested sample format is not supported here.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// An invalid lifecycle transition was requested.
    #[error("invalid device state: {reason}")]
    InvalidState {
        /// Which transition was rejected and why.
        reason: String,
    },

    /// A buffer's byte length is not a whole number of frames, or two
    /// buffers with different formats were combined.
    #[error("frame size mismatch: {reason}")]
    FrameSizeMismatch {
        /// Description of the mismatch.
        reason: String,
    },

    /// A producer returned more frames than were requested.
    #[error("producer contract violation: returned {returned} frames, requested {requested}")]
    ProducerOverrun {
        /// Frames the producer handed back.
        returned: usize,
        /// Frames that were asked for.
        requested: usize,
    },

    /// Conversion parameters the converter cannot satisfy.
    #[error("unsupported conversion: {reason}")]
    UnsupportedConversion {
        /// Why the conversion is unsupported.
        reason: String,
    },

    /// An error from the underlying audio library (cpal).
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Failures while probing, opening, decoding, or seeking encoded audio.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The file could not be opened for reading.
    #[error("cannot open file: {path}: {source}")]
    OpenFile {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The byte stream is not a recognized/supported audio container.
    #[error("unrecognized or unsupported audio format: {reason}")]
    UnsupportedContainer {
        /// Probe failure detail.
        reason: String,
    },

    /// The container was recognized but decoding failed.
    #[error("decode failed: {reason}")]
    Failed {
        /// Decode failure detail.
        reason: String,
    },

    /// The source does not support seeking, or the target is out of range.
    ///
    /// Recoverable: the decoder remains usable for forward reads.
    #[error("cannot seek: {reason}")]
    SeekFailed {
        /// Why the seek was rejected.
        reason: String,
    },

    /// The file's native sample format cannot be represented directly and
    /// must be converted (e.g. via [`decode_file`](crate::decode_file)).
    #[error("file has sample format that must be converted: {format}")]
    NeedsConversion {
        /// The native format that has no direct representation.
        format: String,
    },

    /// A user-supplied byte source failed while the codec was reading.
    #[error("error in byte source read: {source}")]
    SourceRead {
        /// The underlying I/O error from the byte source.
        #[source]
        source: std::io::Error,
    },
}

impl DecodeError {
    /// Creates a generic decode failure with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::DeviceNotFound {
            name: "USB DAC".to_string(),
        };
        assert_eq!(err.to_string(), "device not found: USB DAC");
    }

    #[test]
    fn test_producer_overrun_display() {
        let err = AudioError::ProducerOverrun {
            returned: 512,
            requested: 256,
        };
        assert!(err.to_string().contains("512"));
        assert!(err.to_string().contains("256"));
    }

    #[test]
    fn test_decode_error_open_file() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = DecodeError::OpenFile {
            path: "/tmp/missing.flac".into(),
            source: io_err,
        };
        assert!(err.to_string().contains("/tmp/missing.flac"));
    }

    #[test]
    fn test_decode_error_failed_helper() {
        let err = DecodeError::failed("truncated stream");
        assert_eq!(err.to_string(), "decode failed: truncated stream");
    }
}
