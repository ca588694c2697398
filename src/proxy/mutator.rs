//! Request path and host mutation.
//!
//! # Responsibilities
//! - Rewrite the request path with the compiled rules
//! - Override the Host header
//! - Remember exactly what was changed so it can be put back
//!
//! # Design Decisions
//! - The original URI is captured only when a rule matched
//! - The original Host is captured only when an override is configured
//! - Rewritten paths are percent-encoded where a URI would reject them

use axum::{
    body::Body,
    http::{header, uri::PathAndQuery, HeaderValue, Request, StatusCode, Uri},
};

use crate::proxy::error::{ProxyError, ERR_CATEGORY};
use crate::proxy::rewrite::{rewrite_path, RewriteRule};

/// Request fields captured before mutation.
#[derive(Debug, Default)]
pub struct OriginalIdentity {
    uri: Option<Uri>,
    host: Option<Option<HeaderValue>>,
}

impl OriginalIdentity {
    pub fn path_rewritten(&self) -> bool {
        self.uri.is_some()
    }

    pub fn host_overridden(&self) -> bool {
        self.host.is_some()
    }

    /// Put captured fields back on the request.
    pub fn restore(self, request: &mut Request<Body>) {
        if let Some(uri) = self.uri {
            *request.uri_mut() = uri;
        }
        match self.host {
            Some(Some(host)) => {
                request.headers_mut().insert(header::HOST, host);
            }
            Some(None) => {
                request.headers_mut().remove(header::HOST);
            }
            None => {}
        }
    }
}

/// Apply rewrites and the host override.
///
/// On error the request is left untouched.
pub fn mutate(
    request: &mut Request<Body>,
    rules: &[RewriteRule],
    host: Option<&HeaderValue>,
) -> Result<OriginalIdentity, ProxyError> {
    let mut original = OriginalIdentity::default();

    if let Some(path) = rewrite_path(rules, request.uri().path()) {
        let uri = with_path(request.uri(), &path)?;
        tracing::debug!(from = %request.uri().path(), to = %uri.path(), "Rewrote request path");
        original.uri = Some(std::mem::replace(request.uri_mut(), uri));
    }

    if let Some(host) = host {
        let previous = request.headers_mut().insert(header::HOST, host.clone());
        original.host = Some(previous);
    }

    Ok(original)
}

/// Replace the path of `uri`, keeping scheme, authority and query.
fn with_path(uri: &Uri, path: &str) -> Result<Uri, ProxyError> {
    let path = encode_path(path);
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).map_err(|e| {
        ProxyError::new(StatusCode::BAD_REQUEST, format!("invalid rewritten path: {e}"))
            .with_category(ERR_CATEGORY)
    })?);
    Uri::from_parts(parts).map_err(|e| {
        ProxyError::new(StatusCode::BAD_REQUEST, format!("invalid rewritten path: {e}"))
            .with_category(ERR_CATEGORY)
    })
}

fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        if byte.is_ascii_graphic() && byte != b'?' && byte != b'#' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    out
}
