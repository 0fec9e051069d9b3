//! Error types for the bridge layer.

use std::time::Duration;

use waypost_protocol::{Operation, ProtocolError};
use waypost_transport::TransportError;

/// Errors that can occur while calling the backend.
///
/// None of these is a business rejection: a backend that answers
/// `rejected` produces an `Ok(CallResult)`.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The declared surface is empty or malformed. Fatal at startup.
    #[error("invalid RPC surface: {0}")]
    InvalidSurface(String),

    /// The operation exists but this bridge was not declared with it.
    #[error("operation {0} is not declared on this bridge")]
    NotDeclared(Operation),

    /// The socket could not be opened.
    #[error("backend unreachable: {0}")]
    Connect(#[source] TransportError),

    /// Writing the request to the socket failed.
    #[error("backend send failed: {0}")]
    Send(#[source] TransportError),

    /// The socket closed before the reply arrived.
    #[error("backend connection closed while awaiting reply")]
    Disconnected,

    /// No reply within the call deadline.
    #[error("backend did not reply within {0:?}")]
    Timeout(Duration),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// `true` for failures caused by the backend being unreachable or
    /// unresponsive, as opposed to configuration or framing problems.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Send(_) | Self::Disconnected | Self::Timeout(_)
        )
    }
}
