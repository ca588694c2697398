//! HTTP server setup and proxy middleware.
//!
//! # Responsibilities
//! - Create the Axum Router with the proxy installed as middleware
//! - Wire up tower-http layers (request ID, tracing)
//! - Hand restored requests to the inner routes after a forward
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::http::context::{Context, Next};
use crate::lifecycle::ShutdownSignal;
use crate::proxy::{ConfigError, HandlerError, Proxy};

/// HTTP server fronting a single proxy.
pub struct ProxyServer {
    router: Router,
    config: RelayConfig,
}

impl ProxyServer {
    /// Build the proxy described by `config` and the router around it.
    pub fn new(config: RelayConfig) -> Result<Self, ConfigError> {
        let proxy = Arc::new(config.build_proxy()?);
        Ok(Self::with_proxy(config, proxy))
    }

    /// Serve an already built proxy.
    pub fn with_proxy(config: RelayConfig, proxy: Arc<Proxy>) -> Self {
        let inner = Router::new().route("/health", get(health));
        let router = Self::build_router(proxy, inner);
        Self { router, config }
    }

    /// Install `proxy` in front of `inner` with the standard layers.
    ///
    /// Routes in `inner` run after every successful forward (and for
    /// skipped requests), always seeing the restored request.
    pub fn build_router(proxy: Arc<Proxy>, inner: Router) -> Router {
        inner
            .fallback(not_proxied)
            .layer(middleware::from_fn_with_state(proxy, proxy_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.recv())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Axum middleware running `proxy` for each request.
///
/// The upstream response wins when one was written; otherwise the inner
/// service's response is returned.
pub async fn proxy_middleware(
    State(proxy): State<Arc<Proxy>>,
    request: Request<Body>,
    next: middleware::Next,
) -> Response {
    let mut ctx = Context::new(request);
    match proxy.handle(&mut ctx, Downstream(next)).await {
        Ok(()) => ctx
            .take_response()
            .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response()),
        Err(e) => {
            match e.as_proxy_error() {
                Some(pe) if pe.is_exception() => {
                    tracing::error!(path = %ctx.path(), category = %pe.category(), error = %pe.message(), "Proxy failed");
                }
                _ => tracing::warn!(path = %ctx.path(), error = %e, "Proxy failed"),
            }
            e.into_response()
        }
    }
}

/// Continuation into the rest of the axum stack.
struct Downstream(middleware::Next);

impl Next for Downstream {
    async fn call(self, ctx: &mut Context) -> Result<(), HandlerError> {
        let request = std::mem::take(&mut ctx.request);
        let response = self.0.run(request).await;
        if ctx.response.is_none() {
            ctx.response = Some(response);
        }
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn not_proxied() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "No upstream response")
}
