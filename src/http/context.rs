//! Request context shared between pipeline stages.
//!
//! # Responsibilities
//! - Own the in-flight request (path, host, headers, body)
//! - Hold the response sink the proxy writes upstream responses into
//! - Define the `Next` continuation used to resume the pipeline
//!
//! # Design Decisions
//! - The context is exclusively owned by one request; nothing here is shared
//! - Continuations are consumed on call, so a stage resumes the chain at most once

use std::future::Future;

use axum::{
    body::Body,
    http::{header, Request, Response},
};

use crate::proxy::error::HandlerError;

/// A request travelling through the pipeline together with its response sink.
#[derive(Debug, Default)]
pub struct Context {
    pub request: Request<Body>,
    pub response: Option<Response<Body>>,
}

impl Context {
    pub fn new(request: Request<Body>) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// Host header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.request
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.request.uri().authority().map(|a| a.as_str()))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Take the written response, if any.
    pub fn take_response(&mut self) -> Option<Response<Body>> {
        self.response.take()
    }
}

/// Continuation that resumes the surrounding pipeline.
pub trait Next: Send {
    fn call(self, ctx: &mut Context) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// Ends the chain without doing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminate;

impl Next for Terminate {
    async fn call(self, _ctx: &mut Context) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// A synchronous closure used as continuation.
#[derive(Debug, Clone)]
pub struct NextFn<F>(F);

/// Wrap a closure as a continuation.
pub fn next_fn<F>(f: F) -> NextFn<F>
where
    F: FnOnce(&mut Context) -> Result<(), HandlerError> + Send,
{
    NextFn(f)
}

impl<F> Next for NextFn<F>
where
    F: FnOnce(&mut Context) -> Result<(), HandlerError> + Send,
{
    fn call(self, ctx: &mut Context) -> impl Future<Output = Result<(), HandlerError>> + Send {
        std::future::ready((self.0)(ctx))
    }
}
