//! Forwarding proxy subsystem.
//!
//! # Data Flow
//! ```text
//! Context (request + response sink)
//!     → handler.rs (skip gate, orchestration)
//!     → target.rs (static target or picker)
//!     → mutator.rs (rewrite path via rewrite.rs, override host)
//!     → forward.rs (build upstream request, call transport.rs)
//!     → handler.rs (done callbacks, restore, next / error.rs)
//! ```
//!
//! # Design Decisions
//! - Everything compiled at construction; `Proxy` is immutable and `Sync`
//! - Per-request state lives on the stack of `Proxy::handle`
//! - No retries, timeouts or pooling here; those belong to the transport

pub mod error;
pub mod forward;
pub mod handler;
pub mod mutator;
pub mod rewrite;
pub mod target;
pub mod transport;

pub use error::{BoxError, ConfigError, HandlerError, ProxyError, ERR_CATEGORY};
pub use handler::{Proxy, ProxyBuilder, Skipper};
pub use rewrite::RewriteRule;
pub use target::{Done, Pick, PickerTarget, ResolvedTarget, RoundRobinPicker, StaticTarget, TargetSource};
pub use transport::{HyperTransport, Transport, TransportError};
