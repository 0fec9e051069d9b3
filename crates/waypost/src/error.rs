//! Unified error type for the Waypost gateway.

use waypost_bridge::BridgeError;
use waypost_protocol::ProtocolError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Binding or serving the HTTP listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A request body or backend frame had the wrong shape.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A backend call failed before producing an answer.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
