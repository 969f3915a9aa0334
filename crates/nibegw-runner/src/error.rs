//! Error types for the engine and the service.

use nibegw_model::{SchemaError, ValueError};
use nibegw_protocol::FrameError;
use thiserror::Error;

/// Synchronous rejection of a read or write request.
///
/// Nothing is queued or sent when a submit fails.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubmitError {
    /// No catalog item has this name.
    #[error("unknown data item: {0}")]
    UnknownItem(String),

    /// No catalog item has this address.
    #[error("unknown register address: {0}")]
    UnknownAddress(u16),

    /// A request for this address is already outstanding.
    #[error("register {address} busy with an outstanding request")]
    Busy {
        /// Register address.
        address: u16,
    },

    /// The value cannot be encoded for this item.
    #[error("invalid value for {name}: {source}")]
    Value {
        /// Catalog name.
        name: String,
        /// Codec error.
        #[source]
        source: ValueError,
    },

    /// The request frame could not be built.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Errors that stop the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The catalog could not be loaded.
    #[error("catalog error: {0}")]
    Schema(#[from] SchemaError),

    /// The service configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket or thread setup failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine thread panicked.
    #[error("engine thread panicked")]
    EnginePanicked,

    /// The shutdown handler could not be installed.
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// The metrics exporter could not be installed.
    #[error("metrics error: {0}")]
    Metrics(String),
}
