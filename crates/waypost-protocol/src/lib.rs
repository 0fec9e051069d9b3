//! Wire protocol for Waypost.
//!
//! This crate defines the "language" spoken on both sides of the bridge:
//!
//! - **Operations** ([`Operation`], [`RemoteCall`]) — the closed table of
//!   backend calls and their typed request/response pairs.
//! - **Types** ([`RpcRequest`], [`RpcReply`], [`CallResult`],
//!   [`ApiEnvelope`], [`Identity`], [`SessionToken`]) — what travels on
//!   the socket and over HTTP.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how frames become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Bridge (correlated calls)
//! ```

mod codec;
mod error;
mod operation;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use operation::{
    Operation, RegisterRequest, Register, RemoteCall, Restore, RestoreRequest,
    Signin, SigninRequest, SigninResponse, Signout, SignoutRequest,
};
pub use types::{
    AUTH_COOKIE, ApiEnvelope, CallResult, CallStatus, Identity, RpcReply, RpcRequest,
    SessionToken,
};
