//! # Waypost
//!
//! An HTTP gateway that exposes a fixed set of auth operations
//! (`signin`, `register`, `signout`, `restore`) and forwards each call
//! over one persistent WebSocket to an RPC backend.
//!
//! The gateway also owns the `auth-token` session cookie and a route
//! guard for view pages. The client side of the same session lives in
//! [`waypost_session`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waypost::prelude::*;
//!
//! # async fn start() -> Result<(), GatewayError> {
//! let gateway = Gateway::builder()
//!     .config(GatewayConfig::from_env()?)
//!     .build()
//!     .await?;
//! gateway.run().await
//! # }
//! ```

mod api;
mod config;
pub mod cookie;
mod error;
pub mod guard;
mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use guard::{GuardDecision, GuardPolicy};
pub use server::{Gateway, GatewayBuilder};

pub mod prelude {
    pub use crate::{Gateway, GatewayBuilder, GatewayConfig, GatewayError, GuardPolicy};
    pub use waypost_bridge::{BridgeError, BridgeOptions, RpcBridge, Surface};
    pub use waypost_protocol::{
        ApiEnvelope, CallResult, CallStatus, Identity, Operation, SessionToken,
    };
    pub use waypost_session::{
        HttpAuthApi, MemoryTokenStore, FileTokenStore, SessionConfig, SessionError,
        SessionEvent, SessionManager, SessionState, TokenStore,
    };
}
