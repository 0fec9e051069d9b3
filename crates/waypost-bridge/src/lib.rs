//! RPC bridge for Waypost.
//!
//! Turns discrete requests into calls on a single full-duplex socket to
//! the backend:
//!
//! 1. **Surface** ([`Surface`]) — which operations may be called; anything
//!    else is an unknown route and is rejected before the socket.
//! 2. **Bridge** ([`RpcBridge`]) — one lazily opened WebSocket, requests
//!    correlated by id, one reader task routing replies.
//!
//! ```text
//! HTTP adapter (above)  ← resolves routes, shapes envelopes, sets cookies
//!     ↕
//! Bridge (this crate)   ← correlated calls over one socket
//!     ↕
//! Transport (below)     ← WebSocket client connection
//! ```

mod bridge;
mod error;
mod surface;

pub use bridge::{BridgeOptions, RpcBridge};
pub use error::BridgeError;
pub use surface::Surface;
