use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CallKind, ClientState};

/// Broad error category used for user-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientErrorCategory {
    /// The matchmaking backend capability is absent.
    Unavailable,
    /// An issued call could not complete its round trip.
    Transport,
    /// The backend completed the call but refused the request.
    Rejected,
    /// A metadata fetch failed for an individual entry.
    Metadata,
    /// A caller violated a command precondition.
    Contract,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ClientError {
    /// High-level error category.
    pub category: ClientErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ClientError {
    /// Construct a new client error.
    pub fn new(
        category: ClientErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ClientState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ClientErrorCategory::Contract,
            "invalid_state_transition",
            format!("cannot run '{action}' while the client is in state {current:?}"),
        )
    }

    /// Build the overlap-guard error for a call kind already in flight.
    pub fn call_in_flight(kind: CallKind) -> Self {
        Self::new(
            ClientErrorCategory::Contract,
            "call_in_flight",
            format!("a {kind} call is already in flight"),
        )
    }

    /// Build the join-without-selection precondition error.
    pub fn no_selection() -> Self {
        Self::new(
            ClientErrorCategory::Contract,
            "no_selection",
            "join requires a selected lobby",
        )
    }

    /// Build the absent-backend error.
    pub fn backend_unavailable() -> Self {
        Self::new(
            ClientErrorCategory::Unavailable,
            "backend_unavailable",
            "the matchmaking backend is not available",
        )
    }
}

/// Transport-layer failure reported by the backend for an issued call.
///
/// Non-fatal to the process: the operation is abandoned and the reason is
/// logged; the runtime never retries automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("transport failure: {reason}")]
pub struct TransportError {
    /// Backend-supplied failure reason.
    pub reason: String,
}

impl TransportError {
    /// Construct a transport error with the backend-supplied reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::new(
            ClientErrorCategory::Transport,
            "transport_failure",
            err.reason,
        )
    }
}

/// Failure of an individual lobby key/value fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// The requested entry index does not exist.
    #[error("metadata index {index} out of range for lobby {id}")]
    OutOfRange {
        /// Target lobby.
        id: u64,
        /// Requested entry index.
        index: u32,
    },
    /// The backend could not produce the entry.
    #[error("metadata entry unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_invalid_state_error_code_stable() {
        let err = ClientError::invalid_state(ClientState::Init, "join");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(err.category, ClientErrorCategory::Contract);
    }

    #[test]
    fn converts_transport_error_with_reason_preserved() {
        let err: ClientError = TransportError::new("no connection").into();
        assert_eq!(err.category, ClientErrorCategory::Transport);
        assert_eq!(err.code, "transport_failure");
        assert_eq!(err.message, "no connection");
    }

    #[test]
    fn names_call_kind_in_overlap_error() {
        let err = ClientError::call_in_flight(CallKind::Refresh);
        assert_eq!(err.code, "call_in_flight");
        assert!(err.message.contains("refresh"));
    }
}
