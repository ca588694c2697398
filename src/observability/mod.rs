//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! proxy / server / lifecycle produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the tower-http layers into every span
//! - Metric updates are cheap; with no recorder installed they are no-ops

pub mod logging;
pub mod metrics;
