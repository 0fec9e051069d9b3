//! The remote-procedure surface: every backend operation the bridge can
//! call, with its argument names and typed request/response pair.
//!
//! The table is closed. Adding an operation means adding an [`Operation`]
//! variant, and every `match` over it (argument names, the adapter's
//! dispatch) stops compiling until the new variant is handled.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Identity, ProtocolError, SessionToken};

/// One callable backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// `auth.signin(email, password)`
    Signin,
    /// `auth.register(username, email, password)`
    Register,
    /// `auth.signout(token)`
    Signout,
    /// `auth.restore(token)`
    Restore,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 4] = [
        Operation::Signin,
        Operation::Register,
        Operation::Signout,
        Operation::Restore,
    ];

    /// The namespace the operation lives under.
    pub fn domain(self) -> &'static str {
        match self {
            Self::Signin | Self::Register | Self::Signout | Self::Restore => {
                "auth"
            }
        }
    }

    pub fn method(self) -> &'static str {
        match self {
            Self::Signin => "signin",
            Self::Register => "register",
            Self::Signout => "signout",
            Self::Restore => "restore",
        }
    }

    /// Positional argument names, in wire order.
    pub fn arg_names(self) -> &'static [&'static str] {
        match self {
            Self::Signin => &["email", "password"],
            Self::Register => &["username", "email", "password"],
            Self::Signout | Self::Restore => &["token"],
        }
    }

    /// Looks up an operation by its `(domain, method)` pair.
    pub fn from_parts(domain: &str, method: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.domain() == domain && op.method() == method)
    }

    /// Shapes a JSON object of named arguments into positional params.
    ///
    /// Missing names become `null`; extra keys are ignored.
    pub fn params(self, args: &Value) -> Vec<Value> {
        self.arg_names()
            .iter()
            .map(|name| args.get(*name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Displays as the qualified wire name, e.g. `auth.signin`.
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain(), self.method())
    }
}

// ---------------------------------------------------------------------------
// Typed calls
// ---------------------------------------------------------------------------

/// Binds an [`Operation`] to its request and success payload types.
///
/// The HTTP adapter decodes inbound bodies into `Request`; the session
/// client decodes `response` into `Response` once the status says the
/// call succeeded.
pub trait RemoteCall: Send + Sync + 'static {
    const OPERATION: Operation;
    type Request: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Response: DeserializeOwned + Send + 'static;

    /// Positional params for `request`, in declared argument order.
    fn params(request: &Self::Request) -> Result<Vec<Value>, ProtocolError> {
        let named =
            serde_json::to_value(request).map_err(ProtocolError::Encode)?;
        Ok(Self::OPERATION.params(&named))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// The `signin` payload: the identity plus the freshly issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninResponse {
    #[serde(default)]
    pub token: Option<SessionToken>,
    #[serde(flatten)]
    pub identity: Identity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// `token` is optional on the wire; the adapter fills it from the
/// `auth-token` cookie when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignoutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SessionToken>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SessionToken>,
}

pub struct Signin;
pub struct Register;
pub struct Signout;
pub struct Restore;

impl RemoteCall for Signin {
    const OPERATION: Operation = Operation::Signin;
    type Request = SigninRequest;
    type Response = SigninResponse;
}

impl RemoteCall for Register {
    const OPERATION: Operation = Operation::Register;
    type Request = RegisterRequest;
    type Response = Value;
}

impl RemoteCall for Signout {
    const OPERATION: Operation = Operation::Signout;
    type Request = SignoutRequest;
    type Response = Value;
}

impl RemoteCall for Restore {
    const OPERATION: Operation = Operation::Restore;
    type Request = RestoreRequest;
    type Response = Identity;
}
