//! Error types for spliceforge-media.

use thiserror::Error;

/// Failure to build a splice_info_section or its transport packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The encoded section does not fit in a single transport packet.
    #[error("Section too large: {size} bytes (max {max})")]
    SectionTooLarge { size: usize, max: usize },

    /// A field is out of range or violates a command invariant.
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl EncodingError {
    /// Create an invalid field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure to parse a splice_info_section.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The CRC_32 trailer does not match the section contents.
    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    /// Truncated, inconsistent or unsupported section layout.
    #[error("Malformed section: {0}")]
    MalformedSection(String),
}

impl DecodeError {
    /// Create a malformed section error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedSection(msg.into())
    }
}

/// Failure to serialize a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("XML write error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type for encoding operations.
pub type EncodeResult<T> = std::result::Result<T, EncodingError>;

/// Result type for decoding operations.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Result type for manifest serialization.
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;
