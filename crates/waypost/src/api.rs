//! `POST /api/{domain}/{method}`: the HTTP face of the RPC bridge.
//!
//! Every well-formed call answers 200 with the backend's result in an
//! envelope, whatever the business outcome. Routing failures are 404;
//! anything that prevents an answer is an opaque 500.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{HeaderMap, SET_COOKIE};
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use waypost_protocol::{
    ApiEnvelope, CallResult, CallStatus, Operation, ProtocolError, Register,
    RemoteCall, Restore, RestoreRequest, SessionToken, Signin, Signout,
    SignoutRequest,
};

use crate::GatewayError;
use crate::cookie::{clear_cookie, set_cookie, token_from_headers};
use crate::server::AppState;

const INVALID_ROUTE: &str = "Invalid route";
const INTERNAL_ERROR: &str = "Internal server error";

pub(crate) async fn call_backend(
    State(state): State<Arc<AppState>>,
    Path((domain, method)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let Some(operation) = state.bridge.resolve(&domain, &method) else {
        tracing::debug!(%domain, %method, "unresolved api route");
        return Ok(invalid_route_response());
    };

    let started = Instant::now();
    let body = parse_body(&body)?;
    let cookie_token = token_from_headers(&headers);

    let result = match operation {
        Operation::Signin => forward::<Signin>(&state, body).await?,
        Operation::Register => forward::<Register>(&state, body).await?,
        Operation::Signout => {
            let mut request: SignoutRequest = decode(body)?;
            request.token = request.token.or(cookie_token);
            state.bridge.call_typed::<Signout>(&request).await?
        }
        Operation::Restore => {
            let mut request: RestoreRequest = decode(body)?;
            request.token = request.token.or(cookie_token);
            state.bridge.call_typed::<Restore>(&request).await?
        }
    };

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(call = %operation, status = %result.status, elapsed_ms, "api call");

    let cookie = cookie_update(operation, &result, state.secure_cookies);
    let envelope = ApiEnvelope {
        result,
        call: Some(operation.to_string()),
        elapsed_ms: Some(elapsed_ms),
    };
    let mut response = Json(envelope).into_response();
    if let Some(cookie) = cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "token is not a valid cookie value"),
        }
    }
    Ok(response)
}

/// Any `/api` request that does not name a declared operation.
pub(crate) async fn invalid_route(uri: Uri) -> Response {
    tracing::debug!(path = uri.path(), "unresolved api route");
    invalid_route_response()
}

fn invalid_route_response() -> Response {
    (StatusCode::NOT_FOUND, Json(CallResult::rejected(INVALID_ROUTE))).into_response()
}

async fn forward<R: RemoteCall>(
    state: &AppState,
    body: Value,
) -> Result<CallResult, GatewayError> {
    let request: R::Request = decode(body)?;
    Ok(state.bridge.call_typed::<R>(&request).await?)
}

/// An empty body is treated as `{}`; anything else must be a JSON object.
fn parse_body(bytes: &[u8]) -> Result<Value, ProtocolError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    let body: Value = serde_json::from_slice(bytes).map_err(ProtocolError::Decode)?;
    if !body.is_object() {
        return Err(ProtocolError::InvalidMessage(
            "request body must be a JSON object".into(),
        ));
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(body).map_err(ProtocolError::Decode)
}

/// The `Set-Cookie` value a call's outcome calls for, if any.
fn cookie_update(operation: Operation, result: &CallResult, secure: bool) -> Option<String> {
    match (operation, &result.status) {
        (Operation::Signin, CallStatus::Logged) => result
            .response
            .get("token")
            .and_then(Value::as_str)
            .and_then(|token| {
                let cookie = set_cookie(&SessionToken::new(token), secure);
                if cookie.is_none() {
                    tracing::warn!("sign-in token is not a valid cookie value, cookie not set");
                }
                cookie
            }),
        (Operation::Signout, CallStatus::Fulfilled) => Some(clear_cookie(secure)),
        _ => None,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            Self::Bridge(e) if e.is_connectivity() => {
                tracing::error!(error = %self, "backend unavailable");
            }
            _ => tracing::error!(error = %self, "api call failed"),
        }
        (StatusCode::INTERNAL_SERVER_ERROR, Json(CallResult::rejected(INTERNAL_ERROR)))
            .into_response()
    }
}
