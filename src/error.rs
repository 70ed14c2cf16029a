//! TIFF error types

use thiserror::Error;

/// Result type for TIFF operations
pub type Result<T> = std::result::Result<T, TiffError>;

/// TIFF error types
///
/// Structural errors (magic, byte order, cyclic IFD chains) are fatal for the
/// whole session. Everything tagged "for the current image" leaves the
/// session usable for the remaining IFDs.
#[derive(Error, Debug)]
pub enum TiffError {
    /// Invalid magic number (expected 42)
    #[error("Invalid TIFF magic number")]
    InvalidMagic,

    /// First two bytes are neither "II" nor "MM"
    #[error("Invalid TIFF byte order mark: {0:02x?}")]
    InvalidByteOrder([u8; 2]),

    /// Valid header for a version we do not decode (e.g. BigTIFF/43)
    #[error("Unsupported TIFF version: {version}")]
    UnsupportedVersion { version: u16 },

    /// IFD chain loops back on itself
    #[error("Cyclic IFD chain at offset {offset}")]
    CyclicIfd { offset: u64 },

    /// Missing required tag; fatal for the current image only
    #[error("Missing TIFF tag: {0}")]
    MissingTag(String),

    /// Unsupported or unknown compression scheme
    #[error("Unsupported TIFF compression: {0}")]
    UnsupportedCompression(u16),

    /// Unsupported or unknown photometric interpretation
    #[error("Unsupported TIFF photometric interpretation: {0}")]
    UnsupportedPhotometric(u16),

    /// Unsupported or unknown predictor
    #[error("Unsupported TIFF predictor: {0}")]
    UnsupportedPredictor(u16),

    /// No destination layout exists for this tag combination
    #[error("Unsupported image layout: {0}")]
    UnsupportedLayout(String),

    /// Decode parameter outside the supported surface
    #[error("Unsupported read parameter: {0}")]
    UnsupportedParam(String),

    /// Unsupported feature (lossless old-JPEG, floating point samples, ...)
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Tags that contradict each other or themselves
    #[error("Inconsistent metadata: {0}")]
    InconsistentMetadata(String),

    /// A compressed stream failed to decode
    #[error("{codec} error: {detail}")]
    Codec {
        codec: &'static str,
        detail: String,
    },

    /// I/O error, including truncated input
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TiffError {
    /// Create a codec error
    pub fn codec(codec: &'static str, detail: impl Into<String>) -> Self {
        TiffError::Codec {
            codec,
            detail: detail.into(),
        }
    }

    /// True when the error poisons the whole session, not just one image
    #[must_use]
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self,
            TiffError::InvalidMagic
                | TiffError::InvalidByteOrder(_)
                | TiffError::UnsupportedVersion { .. }
                | TiffError::CyclicIfd { .. }
        )
    }
}
