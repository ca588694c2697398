//! Error types for the proxy.
//!
//! # Kinds
//! - `ConfigError`: construction-time failures (no target source, bad
//!   rewrite pattern, bad host override). A proxy that fails here is never
//!   installed.
//! - `ProxyError`: structured per-request failure with a category, a status
//!   code and an "exceptional" flag. Rendered by the pipeline.
//! - `HandlerError`: everything a call to `Proxy::handle` can return.
//!   Picker and continuation errors pass through untouched.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Category attached to every error produced by the proxy itself.
pub const ERR_CATEGORY: &str = "relay-proxy";

/// Boxed error used for caller-supplied failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Construction-time configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("require target or target picker")]
    MissingTarget,

    #[error("invalid rewrite {directive:?}: {source}")]
    InvalidRewrite {
        directive: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid host override {0:?}")]
    InvalidHost(String),
}

/// Structured request-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyError {
    message: String,
    category: String,
    status: StatusCode,
    exception: bool,
}

impl ProxyError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: String::new(),
            status,
            exception: false,
        }
    }

    /// The picker produced neither a target nor an error.
    pub fn target_is_nil() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "target can not be nil")
            .with_category(ERR_CATEGORY)
            .exceptional()
    }

    /// Wrap a transport failure observed while forwarding.
    pub fn forward(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_chain(err))
            .with_category(ERR_CATEGORY)
            .exceptional()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn exceptional(mut self) -> Self {
        self.exception = true;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_exception(&self) -> bool {
        self.exception
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            write!(f, "message={}", self.message)
        } else {
            write!(f, "category={}, message={}", self.category, self.message)
        }
    }
}

impl std::error::Error for ProxyError {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    #[serde(skip_serializing_if = "str::is_empty")]
    category: &'a str,
    message: &'a str,
    exception: bool,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status_code: self.status.as_u16(),
            category: &self.category,
            message: &self.message,
            exception: self.exception,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Error returned from a single proxy invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The target picker failed; carried as returned.
    #[error(transparent)]
    Picker(BoxError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// A later pipeline stage failed.
    #[error(transparent)]
    Downstream(BoxError),
}

impl HandlerError {
    pub fn as_proxy_error(&self) -> Option<&ProxyError> {
        match self {
            HandlerError::Proxy(e) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Proxy(e) => e.into_response(),
            HandlerError::Picker(e) | HandlerError::Downstream(e) => {
                ProxyError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

/// Render an error followed by its sources, separated by `": "`.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        let next = e.to_string();
        if !message.ends_with(&next) {
            message.push_str(": ");
            message.push_str(&next);
        }
        source = e.source();
    }
    message
}
