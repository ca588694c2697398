//! Proxy construction and per-request flow.
//!
//! # Request Flow
//! ```text
//! skip? ── yes ──────────────────────────────────────────▶ next
//!   │ no
//!   ▼
//! resolve target ── error ──▶ return error
//!   ▼
//! rewrite path / override host (remember originals)
//!   ▼
//! forward to upstream
//!   ▼
//! done callbacks (config, then picker)
//!   ▼
//! forward failed ── yes ──▶ return error (restore only if configured)
//!   │ no
//!   ▼
//! restore path / host ──▶ next
//! ```

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderValue;
use url::Url;

use crate::http::context::{Context, Next};
use crate::observability::metrics;
use crate::proxy::error::{BoxError, ConfigError, HandlerError};
use crate::proxy::forward::Forwarder;
use crate::proxy::mutator::{self, OriginalIdentity};
use crate::proxy::rewrite::{compile_rewrites, RewriteRule};
use crate::proxy::target::{Done, Pick, PickerTarget, StaticTarget, TargetSource};
use crate::proxy::transport::{HyperTransport, Transport};

/// Predicate deciding whether a request bypasses the proxy.
pub type Skipper = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Builder for [`Proxy`].
#[derive(Default)]
pub struct ProxyBuilder {
    target: Option<Arc<dyn TargetSource>>,
    rewrites: Vec<String>,
    host: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    skip: Option<Skipper>,
    done: Option<Done>,
    restore_on_error: bool,
}

impl ProxyBuilder {
    /// Forward every request to `url`.
    pub fn target(self, url: Url) -> Self {
        self.target_source(StaticTarget::new(url))
    }

    /// Choose the target per request.
    pub fn target_picker<F>(self, picker: F) -> Self
    where
        F: Fn(&Context) -> Result<Pick, BoxError> + Send + Sync + 'static,
    {
        self.target_source(PickerTarget::new(picker))
    }

    pub fn target_source<S>(mut self, source: S) -> Self
    where
        S: TargetSource + 'static,
    {
        self.target = Some(Arc::new(source));
        self
    }

    /// Add one `pattern:template` directive.
    pub fn rewrite(mut self, directive: impl Into<String>) -> Self {
        self.rewrites.push(directive.into());
        self
    }

    pub fn rewrites<I, S>(mut self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rewrites.extend(directives.into_iter().map(Into::into));
        self
    }

    /// Override the Host header sent upstream. Empty means no override.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }

    /// Callback run after every forward attempt.
    pub fn done<F>(mut self, done: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.done = Some(Arc::new(done));
        self
    }

    /// Put the original path and host back even when forwarding fails.
    pub fn restore_on_error(mut self, restore: bool) -> Self {
        self.restore_on_error = restore;
        self
    }

    pub fn build(self) -> Result<Proxy, ConfigError> {
        let target = self.target.ok_or(ConfigError::MissingTarget)?;
        let rewrites = compile_rewrites(&self.rewrites)?;

        let host = match self.host.filter(|h| !h.is_empty()) {
            Some(host) => Some(HeaderValue::from_str(&host).map_err(|_| ConfigError::InvalidHost(host))?),
            None => None,
        };

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new()));

        Ok(Proxy {
            target,
            rewrites,
            host,
            forwarder: Forwarder::new(transport),
            skip: self.skip,
            done: self.done,
            restore_on_error: self.restore_on_error,
        })
    }
}

/// A configured forwarding proxy. Immutable; share it behind an `Arc`.
pub struct Proxy {
    target: Arc<dyn TargetSource>,
    rewrites: Vec<RewriteRule>,
    host: Option<HeaderValue>,
    forwarder: Forwarder,
    skip: Option<Skipper>,
    done: Option<Done>,
    restore_on_error: bool,
}

impl Proxy {
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::default()
    }

    pub fn rewrites(&self) -> &[RewriteRule] {
        &self.rewrites
    }

    /// Proxy one request, then resume the pipeline through `next`.
    pub async fn handle<N: Next>(&self, ctx: &mut Context, next: N) -> Result<(), HandlerError> {
        if self.skip.as_ref().is_some_and(|skip| skip(ctx)) {
            tracing::debug!(path = %ctx.path(), "Proxy skipped");
            metrics::record_skipped();
            return next.call(ctx).await;
        }

        let target = self.target.resolve(ctx)?;

        let (original, result) = match mutator::mutate(&mut ctx.request, &self.rewrites, self.host.as_ref()) {
            Ok(original) => {
                let result = self.forwarder.forward(&target.url, ctx).await;
                (original, result)
            }
            Err(e) => (OriginalIdentity::default(), Err(e)),
        };

        if let Some(done) = &self.done {
            done(ctx);
        }
        if let Some(done) = &target.done {
            done(ctx);
        }

        if let Err(e) = result {
            if self.restore_on_error {
                original.restore(&mut ctx.request);
            }
            return Err(e.into());
        }

        original.restore(&mut ctx.request);
        next.call(ctx).await
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("rewrites", &self.rewrites)
            .field("host", &self.host)
            .field("skip", &self.skip.is_some())
            .field("done", &self.done.is_some())
            .field("restore_on_error", &self.restore_on_error)
            .finish_non_exhaustive()
    }
}
