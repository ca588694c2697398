//! relay-proxy: a per-request HTTP forwarding proxy.
//!
//! A [`Proxy`] decides where a request goes (a fixed target or a picker),
//! rewrites its path and Host header, forwards it, restores the original
//! request and then resumes the surrounding pipeline.
//!
//! ```text
//!  Context ─▶ skip? ─▶ target ─▶ rewrite/host ─▶ forward ─▶ done ─▶ restore ─▶ Next
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;

pub use config::RelayConfig;
pub use http::{Context, Next, ProxyServer};
pub use lifecycle::Shutdown;
pub use proxy::{HandlerError, Pick, Proxy, ProxyError};
