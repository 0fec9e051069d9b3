//! Route guard for the view pages.
//!
//! The guard only checks whether a session cookie is *present*. Whether
//! the token is still valid is the session manager's business; a stale
//! cookie gets through here and is caught by `restore`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::cookie::token_from_headers;
use crate::server::AppState;

pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const DASHBOARD_PATH: &str = "/dashboard";

/// What to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Let the request through.
    Pass,
    /// Send a temporary redirect to this path.
    Redirect(&'static str),
}

/// Which paths bypass the guard, and the redirect rules for the rest.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    exempt: Vec<String>,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            exempt: ["/api", "/_next/static", "/_next/image", "/static", "/favicon.ico"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl GuardPolicy {
    /// A policy with the default exemptions plus `prefix`.
    pub fn exempt(mut self, prefix: impl Into<String>) -> Self {
        self.exempt.push(prefix.into());
        self
    }

    /// Whether `path` is the prefix itself or lies beneath it.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    pub fn decide(&self, path: &str, has_token: bool) -> GuardDecision {
        if self.is_exempt(path) {
            return GuardDecision::Pass;
        }
        match (path, has_token) {
            ("/", true) => GuardDecision::Redirect(DASHBOARD_PATH),
            ("/", false) => GuardDecision::Redirect(LOGIN_PATH),
            (LOGIN_PATH | REGISTER_PATH, true) => GuardDecision::Redirect(DASHBOARD_PATH),
            (LOGIN_PATH | REGISTER_PATH, false) => GuardDecision::Pass,
            (_, true) => GuardDecision::Pass,
            (_, false) => GuardDecision::Redirect(LOGIN_PATH),
        }
    }
}

/// Middleware applying the state's [`GuardPolicy`] to every request.
pub(crate) async fn route_guard(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let has_token = token_from_headers(req.headers()).is_some();
    match state.guard.decide(req.uri().path(), has_token) {
        GuardDecision::Pass => next.run(req).await,
        GuardDecision::Redirect(to) => {
            tracing::debug!(path = req.uri().path(), to, has_token, "guard redirect");
            Redirect::temporary(to).into_response()
        }
    }
}
