//! Core types shared by the bridge, the HTTP adapter, and the client.
//!
//! Two wire formats live here:
//!
//! - **Socket frames** ([`RpcRequest`], [`RpcReply`]) travel between the
//!   bridge and the backend over the single WebSocket.
//! - **The result envelope** ([`CallResult`], [`ApiEnvelope`]) is what the
//!   HTTP adapter hands to browsers and what the session client parses.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Name of the cookie that carries the session token between the browser
/// and the HTTP adapter.
pub const AUTH_COOKIE: &str = "auth-token";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The opaque credential proving an authenticated identity.
///
/// `#[serde(transparent)]` keeps it a bare JSON string on the wire. The
/// `Debug` impl never prints the value, so tokens don't leak into logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the token is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} bytes>)", self.0.len())
    }
}

/// The authenticated user, as reported by `signin` and `restore`.
///
/// Held only in memory; the token is the only thing a client persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub is_admin: bool,
    pub session_id: String,
}

// ---------------------------------------------------------------------------
// CallStatus
// ---------------------------------------------------------------------------

/// The business-level outcome of a backend call.
///
/// The backend's status vocabulary is open-ended, so unknown values are
/// kept verbatim in [`CallStatus::Other`] instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallStatus {
    Fulfilled,
    Rejected,
    /// A session is valid (`signin`, `restore`).
    Logged,
    /// The presented token is not (or no longer) valid.
    Invalid,
    Other(String),
}

impl CallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fulfilled => "fulfilled",
            Self::Rejected => "rejected",
            Self::Logged => "logged",
            Self::Invalid => "invalid",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for CallStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "fulfilled" => Self::Fulfilled,
            "rejected" => Self::Rejected,
            "logged" => Self::Logged,
            "invalid" => Self::Invalid,
            _ => Self::Other(s),
        }
    }
}

impl From<CallStatus> for String {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CallResult / ApiEnvelope
// ---------------------------------------------------------------------------

/// `{status, response}`: the uniform outcome of one call.
///
/// Also used, on its own, as the body of the adapter's 404 and 500
/// responses so every failure shape has the same keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub response: Value,
}

impl CallResult {
    pub fn new(status: CallStatus, response: Value) -> Self {
        Self { status, response }
    }

    /// A `rejected` result carrying a human-readable message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(CallStatus::Rejected, Value::String(message.into()))
    }

    /// Decodes `response` into a typed payload.
    pub fn response_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.response).map_err(ProtocolError::Decode)
    }

    /// The message to show a user for a non-successful result.
    ///
    /// Backend rejections carry their reason as a string `response`; any
    /// other payload falls back to the status itself.
    pub fn message(&self) -> String {
        match &self.response {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("message") {
                Some(Value::String(s)) => s.clone(),
                _ => self.status.to_string(),
            },
            _ => self.status.to_string(),
        }
    }
}

/// The body of every HTTP 200 the adapter returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    pub result: CallResult,
    /// The qualified operation that was called, e.g. `auth.signin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Socket frames
// ---------------------------------------------------------------------------

/// Bridge → backend: one call, correlated by `id`.
///
/// `params` are positional, in the order the operation declares its
/// argument names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

/// Backend → bridge: the answer to the request with the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CallResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcReply {
    /// Folds the reply into a [`CallResult`].
    ///
    /// A backend-side `error` is a business rejection, not a transport
    /// failure: it becomes `rejected` with the error text as the message.
    pub fn into_result(self) -> Result<CallResult, ProtocolError> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Ok(CallResult::rejected(error)),
            (None, None) => Err(ProtocolError::InvalidMessage(format!(
                "reply {} has neither result nor error",
                self.id
            ))),
        }
    }
}
