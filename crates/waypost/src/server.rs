//! `Gateway` builder and server loop.
//!
//! Ties the layers together: an axum router in front, the route guard as
//! middleware, and one shared [`RpcBridge`] to the backend behind it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::net::TcpListener;
use waypost_bridge::{RpcBridge, Surface};

use crate::api::{call_backend, invalid_route};
use crate::guard::{GuardPolicy, route_guard};
use crate::{GatewayConfig, GatewayError};

/// Shared state handed to every request.
pub(crate) struct AppState {
    pub(crate) bridge: RpcBridge,
    pub(crate) guard: GuardPolicy,
    pub(crate) secure_cookies: bool,
}

/// Builder for configuring and starting a gateway.
///
/// # Example
///
/// ```rust,no_run
/// # async fn start() -> Result<(), waypost::GatewayError> {
/// use waypost::Gateway;
///
/// let gateway = Gateway::builder()
///     .bind("0.0.0.0:3000")
///     .backend_url("ws://backend:4000")
///     .build()
///     .await?;
/// gateway.run().await
/// # }
/// ```
pub struct GatewayBuilder {
    config: GatewayConfig,
    surface: Surface,
    guard: GuardPolicy,
}

impl GatewayBuilder {
    /// Creates a builder with default settings and every auth operation
    /// declared.
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            surface: Surface::all(),
            guard: GuardPolicy::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn backend_url(mut self, url: &str) -> Self {
        self.config.backend_url = url.to_string();
        self
    }

    /// Production mode marks the session cookie `Secure`.
    pub fn production(mut self, production: bool) -> Self {
        self.config.production = production;
        self
    }

    /// Restricts which operations the gateway exposes.
    pub fn surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    pub fn guard(mut self, guard: GuardPolicy) -> Self {
        self.guard = guard;
        self
    }

    /// Binds the listener. The backend socket is opened on the first call.
    pub async fn build(self) -> Result<Gateway, GatewayError> {
        let listener = TcpListener::bind(&self.config.bind).await?;
        let bridge = RpcBridge::new(
            self.config.backend_url.clone(),
            self.surface,
            self.config.bridge_options(),
        );
        let state = Arc::new(AppState {
            bridge,
            guard: self.guard,
            secure_cookies: self.config.production,
        });
        Ok(Gateway { listener, state })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound gateway. Call [`run`](Self::run) to start serving.
pub struct Gateway {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The request router, sharing this gateway's bridge.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/api/{domain}/{method}",
                post(call_backend).fallback(invalid_route),
            )
            .fallback(fallback)
            .layer(middleware::from_fn_with_state(Arc::clone(&self.state), route_guard))
            .with_state(Arc::clone(&self.state))
    }

    /// Serves until the process is terminated.
    pub async fn run(self) -> Result<(), GatewayError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then closes the backend socket.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), GatewayError> {
        let app = self.router();
        tracing::info!(
            addr = %self.local_addr()?,
            backend = self.state.bridge.url(),
            "waypost gateway listening"
        );
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        self.state.bridge.close().await;
        tracing::info!("waypost gateway stopped");
        Ok(())
    }
}

/// Unmatched `/api` paths are routing errors; everything else is a view,
/// answered with an empty placeholder once the guard lets it through.
async fn fallback(req: Request) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return invalid_route(req.uri().clone()).await;
    }
    StatusCode::OK.into_response()
}
