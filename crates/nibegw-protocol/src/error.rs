//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when decoding or building a frame.
///
/// Every variant is recoverable: the datagram that produced it is dropped and
/// the next one is processed normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the header or length field demand.
    #[error("frame truncated: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Structurally invalid frame.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Checksum did not validate.
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        expected: u8,
        /// Checksum carried by the frame.
        actual: u8,
    },

    /// Data section does not fit the one-byte length field.
    #[error("frame too long: maximum {max} data bytes, got {actual}")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },
}

impl FrameError {
    /// Create a [`FrameError::Truncated`] error.
    pub fn truncated(expected: usize, actual: usize) -> Self {
        FrameError::Truncated { expected, actual }
    }

    /// Create a [`FrameError::Malformed`] error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        FrameError::Malformed(msg.into())
    }

    /// Short label for the variant, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::Truncated { .. } => "truncated",
            FrameError::Malformed(_) => "malformed",
            FrameError::ChecksumMismatch { .. } => "checksum_mismatch",
            FrameError::TooLong { .. } => "too_long",
        }
    }
}
