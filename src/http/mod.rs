//! HTTP pipeline integration.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace layer)
//!     → proxy_middleware (wrap request in a Context)
//!     → Proxy::handle
//!     → Downstream continuation (inner routes see the restored request)
//!     → upstream response, or inner response when skipped
//! ```

pub mod context;
pub mod server;

pub use context::{next_fn, Context, Next, NextFn, Terminate};
pub use server::{proxy_middleware, ProxyServer};
