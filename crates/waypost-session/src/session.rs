//! Session types: the state machine's states, its configuration, and the
//! events it raises toward the UI.

use std::fmt;
use std::time::Duration;

use waypost_tick::TickConfig;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often an authenticated session is re-checked with `restore`.
    ///
    /// Must be well below the backend's credential lifetime so expiry is
    /// noticed before the user's next action fails. Zero disables
    /// periodic revalidation.
    pub revalidate_every: Duration,

    /// Random delay bound added to the first revalidation.
    pub revalidate_jitter: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            revalidate_every: Duration::from_secs(5 * 60),
            revalidate_jitter: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    pub(crate) fn tick_config(&self) -> TickConfig {
        TickConfig {
            period: self.revalidate_every,
            initial_jitter: self.revalidate_jitter,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the client's session stands.
///
/// ```text
///               mount
///                 │
///                 ▼
///   ┌────────  Checking  ────────┐
///   │ no token      │ logged     │ not logged
///   ▼               ▼            ▼
/// Unauthenticated ─login─→ Authenticated ─tick: not logged─→ Expired
///   ▲                          │                                │
///   └────────── logout ────────┘      login / reauthenticate ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// A stored token is being checked with the backend.
    Checking,
    Authenticated,
    /// A previously valid session was found invalid. The token has been
    /// cleared and the expiry notice raised.
    Expired,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Checking => "checking",
            Self::Authenticated => "authenticated",
            Self::Expired => "expired",
        })
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A view the manager asks the UI to navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
        }
    }
}

/// Signals raised by the manager for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was found invalid; show the expiry notice.
    /// Raised exactly once per transition into [`SessionState::Expired`].
    Expired,
    /// The user dismissed the expiry notice.
    NoticeDismissed,
    Navigate(Route),
}

/// What a single revalidation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    /// Not authenticated, shut down, or a restore was already in flight.
    Skipped,
    /// The backend confirmed the session.
    Confirmed,
    /// The session was found invalid and moved to `Expired`.
    Expired,
    /// The result arrived after a logout, login or shutdown and was dropped.
    Stale,
}
