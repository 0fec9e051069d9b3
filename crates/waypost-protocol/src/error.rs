//! Error types for the protocol layer.
//!
//! Each crate in Waypost defines its own error enum. A `ProtocolError`
//! always means the bytes or the shape of a message were wrong, never
//! that the network or the backend failed.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates protocol rules, e.g. a reply
    /// that carries neither a result nor an error.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
