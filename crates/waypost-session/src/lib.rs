//! Client-side session management for Waypost.
//!
//! This crate owns the lifecycle of a signed-in client:
//!
//! 1. **Token storage** — persisting the opaque credential ([`TokenStore`])
//! 2. **Auth calls** — signin/register/signout/restore ([`AuthApi`],
//!    [`HttpAuthApi`])
//! 3. **Lifecycle** — the state machine that ties them together, including
//!    periodic revalidation and expiry notification ([`SessionManager`])
//!
//! # How it fits in the stack
//!
//! ```text
//! UI (above)        ← reads state/identity, listens for SessionEvents
//!     ↕
//! Session (here)    ← owns token + identity, decides validity
//!     ↕
//! Gateway (below)   ← HTTP adapter over the RPC bridge
//! ```

mod api;
mod error;
mod http;
mod manager;
mod session;
mod token;

pub use api::AuthApi;
pub use error::SessionError;
pub use http::HttpAuthApi;
pub use manager::SessionManager;
pub use session::{
    Revalidation, Route, SessionConfig, SessionEvent, SessionState,
};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
