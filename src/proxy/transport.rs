//! HTTP transports used to reach upstreams.
//!
//! # Responsibilities
//! - Define the `Transport` seam the forwarder talks to
//! - Provide the default pooled `hyper-util` client
//!
//! # Design Decisions
//! - Connection pooling and limits belong to the transport, not the proxy
//! - Deadlines are a transport concern; the proxy core never times out
//! - Plain HTTP only by default; supply a custom transport for TLS upstreams

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::proxy::error::BoxError;

/// Failure reaching the upstream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upstream request failed")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(BoxError),
}

/// Sends one request upstream and returns the response head with a
/// streaming body.
pub trait Transport: Send + Sync {
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, TransportError>>;
}

/// Default transport backed by `hyper-util`'s pooled client.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    request_timeout: Option<Duration>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self::with_timeouts(None, None)
    }

    /// Build a client with optional connect and whole-request deadlines.
    pub fn with_timeouts(connect: Option<Duration>, request: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(connect);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            request_timeout: request,
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn round_trip(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, TransportError>> {
        let client = self.client.clone();
        let request_timeout = self.request_timeout;
        Box::pin(async move {
            let pending = client.request(request);
            let response = match request_timeout {
                Some(limit) => tokio::time::timeout(limit, pending)
                    .await
                    .map_err(|_| TransportError::Timeout(limit))??,
                None => pending.await?,
            };
            Ok::<_, TransportError>(response.map(Body::new))
        })
    }
}
