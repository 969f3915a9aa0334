//! Error types for the catalog and value codec.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the catalog. Fatal at startup.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The catalog file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog source is not a valid list of records.
    #[error("catalog parse error: {0}")]
    Parse(String),

    /// Two records share a name.
    #[error("duplicate item name: {0}")]
    DuplicateName(String),

    /// Two records share an address.
    #[error("duplicate address {address}: {first} and {second}")]
    DuplicateAddress {
        /// Register address.
        address: u16,
        /// Item loaded first.
        first: String,
        /// Item that collided.
        second: String,
    },

    /// Size is not 1, 2 or 4 bytes.
    #[error("{name}: invalid size {size}, expected 1, 2 or 4")]
    InvalidSize {
        /// Item name.
        name: String,
        /// Declared size.
        size: u8,
    },

    /// Scale is not positive and finite, or not 1.0 for an int or enum item.
    #[error("{name}: invalid scale {scale}")]
    InvalidScale {
        /// Item name.
        name: String,
        /// Declared scale.
        scale: f64,
    },

    /// An enum item has no code table.
    #[error("{0}: enum item without mappings")]
    MissingEnumCodes(String),

    /// A non-enum item has a code table.
    #[error("{0}: mappings on a non-enum item")]
    UnexpectedEnumCodes(String),

    /// `min` is greater than `max`.
    #[error("{name}: min {min} is greater than max {max}")]
    InvalidBounds {
        /// Item name.
        name: String,
        /// Declared minimum.
        min: f64,
        /// Declared maximum.
        max: f64,
    },
}

/// Errors raised by the value codec.
///
/// On the write path any of these rejects the value before a frame exists.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// The value's variant cannot be stored in the item's type.
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        /// Type the item declares.
        expected: &'static str,
        /// Type that was supplied.
        found: &'static str,
    },

    /// The value lies outside the declared bounds or the register's range.
    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// The label or code is not in the item's enum table.
    #[error("unknown enum code: {0}")]
    UnknownEnumCode(String),

    /// Fewer payload bytes than the item's size.
    #[error("payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort {
        /// Item size in bytes.
        expected: usize,
        /// Payload length.
        actual: usize,
    },
}

impl ValueError {
    /// Short label for the variant, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            ValueError::TypeMismatch { .. } => "type_mismatch",
            ValueError::OutOfRange { .. } => "out_of_range",
            ValueError::UnknownEnumCode(_) => "unknown_enum_code",
            ValueError::PayloadTooShort { .. } => "payload_too_short",
        }
    }
}
