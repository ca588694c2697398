//! Single-target request forwarding.
//!
//! # Data Flow
//! ```text
//! Context.request (already rewritten)
//!     → outgoing_request() (join target URL, strip hop-by-hop, X-Forwarded-For)
//!     → Transport::round_trip()
//!     → Ok: response copied into Context.response
//!     → Err: converted to ProxyError, response sink untouched
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri, Version},
};
use url::Url;

use crate::http::context::Context;
use crate::observability::metrics;
use crate::proxy::error::{ProxyError, ERR_CATEGORY};
use crate::proxy::transport::Transport;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that apply to a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to one resolved target through a transport.
#[derive(Clone)]
pub struct Forwarder {
    transport: Arc<dyn Transport>,
}

impl Forwarder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send the context's request to `target` and store the response.
    ///
    /// The request body is consumed.
    pub async fn forward(&self, target: &Url, ctx: &mut Context) -> Result<(), ProxyError> {
        let start = Instant::now();
        let method = ctx.request.method().to_string();
        let outgoing = outgoing_request(target, &mut ctx.request)?;

        tracing::debug!(
            method = %method,
            upstream = %outgoing.uri(),
            "Forwarding request"
        );

        match self.transport.round_trip(outgoing).await {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                metrics::record_forward(&method, response.status().as_u16(), target.as_str(), start);
                ctx.response = Some(response);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(upstream = %target, error = %e, "Upstream error");
                metrics::record_upstream_error(target.as_str());
                Err(ProxyError::forward(&e))
            }
        }
    }
}

/// Build the upstream request, taking the body out of `request`.
fn outgoing_request(target: &Url, request: &mut Request<Body>) -> Result<Request<Body>, ProxyError> {
    let uri = target_uri(target, request.uri())?;

    let mut headers = request.headers().clone();
    strip_hop_by_hop(&mut headers);
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        append_forwarded_for(&mut headers, *addr);
    }

    let body = std::mem::take(request.body_mut());
    let mut outgoing = Request::new(body);
    *outgoing.method_mut() = request.method().clone();
    *outgoing.uri_mut() = uri;
    *outgoing.version_mut() = Version::HTTP_11;
    *outgoing.headers_mut() = headers;
    Ok(outgoing)
}

/// Combine the target's scheme, authority, path and query with the request's.
fn target_uri(target: &Url, uri: &Uri) -> Result<Uri, ProxyError> {
    let host = target
        .host_str()
        .ok_or_else(ProxyError::target_is_nil)?;
    let authority = match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = single_joining_slash(target.path(), uri.path());
    let query = match (target.query().filter(|q| !q.is_empty()), uri.query().filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => format!("?{a}&{b}"),
        (Some(q), None) | (None, Some(q)) => format!("?{q}"),
        (None, None) => String::new(),
    };

    format!("{}://{authority}{path}{query}", target.scheme())
        .parse()
        .map_err(|e| {
            ProxyError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("invalid upstream uri: {e}"))
                .with_category(ERR_CATEGORY)
                .exceptional()
        })
}

fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let client_ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {client_ip}"),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::transport::TransportError;
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;

    /// Records the outgoing request and answers with a canned response.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Option<(String, HeaderMap)>>,
        fail: bool,
    }

    impl Transport for Recorder {
        fn round_trip(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response<Body>, TransportError>> {
            *self.seen.lock().unwrap() = Some((request.uri().to_string(), request.headers().clone()));
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    return Err(TransportError::Other("dns error: no such host".into()));
                }
                Ok(Response::builder()
                    .status(StatusCode::CREATED)
                    .header("connection", "close")
                    .header("x-upstream", "yes")
                    .body(Body::from("ok"))
                    .unwrap())
            })
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_target_uri_joins_paths() {
        let uri: Uri = "/users?page=1".parse().unwrap();
        assert_eq!(
            target_uri(&url("http://upstream.local:8080"), &uri).unwrap().to_string(),
            "http://upstream.local:8080/users?page=1"
        );
        assert_eq!(
            target_uri(&url("http://upstream.local/base/?key=abc"), &uri).unwrap().to_string(),
            "http://upstream.local/base/users?key=abc&page=1"
        );
        assert_eq!(
            target_uri(&url("http://upstream.local/base"), &uri).unwrap().to_string(),
            "http://upstream.local/base/users?page=1"
        );
    }

    #[test]
    fn test_single_joining_slash() {
        assert_eq!(single_joining_slash("/", "/a"), "/a");
        assert_eq!(single_joining_slash("/base", "a"), "/base/a");
        assert_eq!(single_joining_slash("/base/", "a"), "/base/a");
        assert_eq!(single_joining_slash("/base", "/a"), "/base/a");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert("accept", HeaderValue::from_static("*/*"));
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("accept"));
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        append_forwarded_for(&mut headers, "192.168.1.5:4000".parse().unwrap());
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 192.168.1.5");
    }

    #[tokio::test]
    async fn test_forward_writes_response() {
        let recorder = Arc::new(Recorder::default());
        let forwarder = Forwarder::new(recorder.clone());
        let mut ctx = Context::new(
            Request::builder()
                .uri("/users")
                .header("host", "override.local")
                .body(Body::empty())
                .unwrap(),
        );

        forwarder.forward(&url("http://127.0.0.1:9"), &mut ctx).await.unwrap();

        let (uri, headers) = recorder.seen.lock().unwrap().take().unwrap();
        assert_eq!(uri, "http://127.0.0.1:9/users");
        assert_eq!(headers["host"], "override.local");

        let response = ctx.take_response().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("connection").is_none());
        assert_eq!(response.headers()["x-upstream"], "yes");
    }

    #[tokio::test]
    async fn test_forward_error_leaves_sink_empty() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let forwarder = Forwarder::new(recorder);
        let mut ctx = Context::default();

        let err = forwarder.forward(&url("http://a"), &mut ctx).await.unwrap_err();
        assert_eq!(err.category(), ERR_CATEGORY);
        assert!(err.is_exception());
        assert_eq!(err.message(), "dns error: no such host");
        assert!(ctx.response.is_none());
    }
}
