//! [`AuthApi`] over the gateway's HTTP surface.

use std::time::Duration;

use reqwest::header::COOKIE;
use serde::Serialize;
use waypost_protocol::{
    AUTH_COOKIE, ApiEnvelope, CallResult, Operation, RegisterRequest,
    RestoreRequest, SessionToken, SigninRequest, SignoutRequest,
};

use crate::{AuthApi, SessionError};

/// Calls `POST {base_url}/api/{domain}/{method}` on the gateway.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Creates a client for the gateway at `base_url`
    /// (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn post<B: Serialize>(
        &self,
        operation: Operation,
        body: &B,
        cookie: Option<&SessionToken>,
    ) -> Result<CallResult, SessionError> {
        let url = format!(
            "{}/api/{}/{}",
            self.base_url,
            operation.domain(),
            operation.method()
        );
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = cookie {
            request =
                request.header(COOKIE, format!("{AUTH_COOKIE}={}", token.as_str()));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let envelope: ApiEnvelope = response.json().await?;
            tracing::debug!(%operation, status = %envelope.result.status, "auth call answered");
            return Ok(envelope.result);
        }

        // 404 and 500 carry a bare `{status, response}` body.
        let message = match response.json::<CallResult>().await {
            Ok(body) => body.message(),
            Err(_) => status.to_string(),
        };
        Err(SessionError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

impl AuthApi for HttpAuthApi {
    async fn signin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<CallResult, SessionError> {
        let body = SigninRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        self.post(Operation::Signin, &body, None).await
    }

    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<CallResult, SessionError> {
        let body = RegisterRequest {
            username: username.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
        };
        self.post(Operation::Register, &body, None).await
    }

    async fn signout(
        &self,
        token: &SessionToken,
    ) -> Result<CallResult, SessionError> {
        // The body stays empty; the adapter reads the token from the cookie.
        self.post(Operation::Signout, &SignoutRequest::default(), Some(token))
            .await
    }

    async fn restore(
        &self,
        token: &SessionToken,
    ) -> Result<CallResult, SessionError> {
        let body = RestoreRequest {
            token: Some(token.clone()),
        };
        self.post(Operation::Restore, &body, None).await
    }
}
