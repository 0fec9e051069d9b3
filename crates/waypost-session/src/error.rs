//! Error types for the session layer.

use waypost_protocol::ProtocolError;

/// Errors returned by session operations.
///
/// Expiry is deliberately absent: a session found invalid is a state
/// transition plus a notification, never an error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backend answered, but said no (bad credentials, taken email).
    /// The message is the backend's, suitable for showing to the user.
    #[error("{0}")]
    Rejected(String),

    /// A login or registration is already in flight.
    #[error("another sign-in operation is in progress")]
    Busy,

    /// `login` was called while a session is active.
    #[error("already signed in")]
    AlreadyAuthenticated,

    /// A logout or reauthentication happened while the call was in
    /// flight, so its result was dropped.
    #[error("sign-in was superseded by a logout")]
    Superseded,

    /// The manager has been shut down.
    #[error("session manager has been shut down")]
    Disposed,

    /// Reading or writing the stored token failed.
    #[error("token storage failed: {0}")]
    Storage(#[from] std::io::Error),

    /// The HTTP request itself failed (connect, timeout, body).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The adapter answered with a routing or internal error.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// A response could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
