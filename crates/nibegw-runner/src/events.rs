//! Events leaving the engine.

use nibegw_model::codec::InvalidReason;
use nibegw_model::Value;
use serde::{Deserialize, Serialize};

/// Kind of an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Register read.
    Read,
    /// Register write.
    Write,
}

impl RequestKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Read => "read",
            RequestKind::Write => "write",
        }
    }
}

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Answer to one of our requests.
    PolledResponse,
    /// Continuous-logging data message.
    Broadcast,
}

impl Provenance {
    /// Returns the provenance as a metric label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Provenance::PolledResponse => "polled",
            Provenance::Broadcast => "broadcast",
        }
    }
}

/// A decoded data item.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEvent {
    /// Catalog name.
    pub name: String,
    /// Register address.
    pub address: u16,
    /// Decoded value.
    pub value: Value,
    /// Solicited or broadcast.
    pub provenance: Provenance,
    /// Set when the value failed validation but is published anyway.
    pub invalid: Option<InvalidReason>,
}

/// Structured failure event, published separately from values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A datagram failed to decode.
    Frame {
        /// Error variant.
        reason: &'static str,
        /// Error message.
        error: String,
    },
    /// A value failed to decode or encode, or was flagged invalid.
    Value {
        /// Catalog name.
        name: String,
        /// Register address.
        address: u16,
        /// Error message.
        error: String,
    },
    /// A request attempt hit its deadline.
    Timeout {
        /// Catalog name.
        name: String,
        /// Register address.
        address: u16,
        /// Request kind.
        request: RequestKind,
        /// Retries remaining before this timeout was handled.
        attempts_left: u32,
    },
    /// A request was abandoned after its last retry.
    Exhausted {
        /// Catalog name.
        name: String,
        /// Register address.
        address: u16,
        /// Request kind.
        request: RequestKind,
    },
    /// A request was rejected because the address is already in flight.
    Busy {
        /// Catalog name.
        name: String,
        /// Register address.
        address: u16,
        /// Request kind.
        request: RequestKind,
    },
    /// The heat pump refused a write.
    WriteRejected {
        /// Catalog name.
        name: String,
        /// Register address.
        address: u16,
    },
    /// A request was failed by shutdown.
    Aborted {
        /// Catalog name.
        name: String,
        /// Register address.
        address: u16,
        /// Request kind.
        request: RequestKind,
    },
    /// A request named an item missing from the catalog.
    UnknownItem {
        /// Name or address as given.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_json() {
        let diag = Diagnostic::Timeout {
            name: "alarm-45001".to_string(),
            address: 45001,
            request: RequestKind::Read,
            attempts_left: 1,
        };
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["request"], "read");
        assert_eq!(json["address"], 45001);

        let diag = Diagnostic::Frame {
            reason: "checksum_mismatch",
            error: "checksum mismatch".to_string(),
        };
        assert_eq!(serde_json::to_value(&diag).unwrap()["kind"], "frame");
    }
}
