//! Upstream target resolution.
//!
//! # Strategies
//! - `StaticTarget`: one fixed upstream for every request
//! - `PickerTarget`: a caller-supplied function chooses per request
//! - `RoundRobinPicker`: rotates through a fixed list of upstreams
//!
//! # Design Decisions
//! - Resolution never retries and never caches across requests
//! - Picker errors are surfaced untouched
//! - A picker that yields no target is a client error (400)

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use url::Url;

use crate::http::context::Context;
use crate::proxy::error::{BoxError, HandlerError, ProxyError};

/// Completion callback run after a forward attempt.
pub type Done = Arc<dyn Fn(&Context) + Send + Sync>;

/// What a picker returns for one request.
#[derive(Clone, Default)]
pub struct Pick {
    pub target: Option<Url>,
    pub done: Option<Done>,
}

impl Pick {
    pub fn to(target: Url) -> Self {
        Self {
            target: Some(target),
            done: None,
        }
    }

    /// No target available.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_done<F>(mut self, done: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.done = Some(Arc::new(done));
        self
    }
}

impl fmt::Debug for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pick")
            .field("target", &self.target.as_ref().map(Url::as_str))
            .field("done", &self.done.is_some())
            .finish()
    }
}

/// Target chosen for one request.
#[derive(Clone)]
pub struct ResolvedTarget {
    pub url: Url,
    pub done: Option<Done>,
}

impl fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("url", &self.url.as_str())
            .field("done", &self.done.is_some())
            .finish()
    }
}

/// Source of upstream targets.
pub trait TargetSource: Send + Sync {
    fn resolve(&self, ctx: &Context) -> Result<ResolvedTarget, HandlerError>;
}

/// A fixed upstream.
#[derive(Debug, Clone)]
pub struct StaticTarget(Url);

impl StaticTarget {
    pub fn new(url: Url) -> Self {
        Self(url)
    }
}

impl TargetSource for StaticTarget {
    fn resolve(&self, _ctx: &Context) -> Result<ResolvedTarget, HandlerError> {
        Ok(ResolvedTarget {
            url: self.0.clone(),
            done: None,
        })
    }
}

/// Per-request picker function.
pub struct PickerTarget<F>(F);

impl<F> PickerTarget<F>
where
    F: Fn(&Context) -> Result<Pick, BoxError> + Send + Sync,
{
    pub fn new(picker: F) -> Self {
        Self(picker)
    }
}

impl<F> TargetSource for PickerTarget<F>
where
    F: Fn(&Context) -> Result<Pick, BoxError> + Send + Sync,
{
    fn resolve(&self, ctx: &Context) -> Result<ResolvedTarget, HandlerError> {
        let pick = (self.0)(ctx).map_err(HandlerError::Picker)?;
        match pick.target {
            Some(url) => Ok(ResolvedTarget {
                url,
                done: pick.done,
            }),
            None => {
                tracing::warn!(path = %ctx.path(), "Target picker returned no target");
                Err(ProxyError::target_is_nil().into())
            }
        }
    }
}

/// Rotates through a list of upstreams.
#[derive(Debug)]
pub struct RoundRobinPicker {
    targets: Vec<Url>,
    counter: AtomicUsize,
}

impl RoundRobinPicker {
    pub fn new(targets: Vec<Url>) -> Self {
        Self {
            targets,
            counter: AtomicUsize::new(0),
        }
    }
}

impl TargetSource for RoundRobinPicker {
    fn resolve(&self, _ctx: &Context) -> Result<ResolvedTarget, HandlerError> {
        if self.targets.is_empty() {
            return Err(ProxyError::target_is_nil().into());
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.targets.len();
        Ok(ResolvedTarget {
            url: self.targets[index].clone(),
            done: None,
        })
    }
}
