//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::context::Context;
use crate::proxy::{ConfigError, HyperTransport, Proxy, RoundRobinPicker};

/// Root configuration for the relay proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Where and how requests are forwarded.
    pub upstream: UpstreamConfig,

    /// Transport timeouts.
    pub timeouts: TimeoutConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream selection and request mutation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Single fixed upstream URL.
    pub target: Option<String>,

    /// Several upstreams, used in rotation.
    pub targets: Vec<String>,

    /// Host header override sent upstream.
    pub host: Option<String>,

    /// Rewrite directives (`"pattern:template"`), applied in order.
    pub rewrites: Vec<String>,

    /// Paths served locally instead of being proxied, matched per segment.
    pub skip_paths: Vec<String>,

    /// Restore the original path and host when forwarding fails.
    pub restore_on_error: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target: None,
            targets: Vec::new(),
            host: None,
            rewrites: Vec::new(),
            skip_paths: vec!["/health".to_string()],
            restore_on_error: false,
        }
    }
}

/// Timeouts applied by the default transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds (0 = none).
    pub connect_secs: u64,

    /// Time to receive the upstream response head in seconds (0 = none).
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Option<Duration> {
        (self.connect_secs > 0).then(|| Duration::from_secs(self.connect_secs))
    }

    pub fn request(&self) -> Option<Duration> {
        (self.request_secs > 0).then(|| Duration::from_secs(self.request_secs))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl RelayConfig {
    /// Build the proxy described by this config.
    ///
    /// Target URLs that fail to parse are reported as a missing target;
    /// run `validate_config` first for a precise message.
    pub fn build_proxy(&self) -> Result<Proxy, ConfigError> {
        let upstream = &self.upstream;
        let mut builder = Proxy::builder()
            .rewrites(upstream.rewrites.iter().cloned())
            .restore_on_error(upstream.restore_on_error)
            .transport(HyperTransport::with_timeouts(
                self.timeouts.connect(),
                self.timeouts.request(),
            ));

        if let Some(target) = upstream.target.as_deref().and_then(|t| Url::parse(t).ok()) {
            builder = builder.target(target);
        } else if !upstream.targets.is_empty() {
            let targets = upstream
                .targets
                .iter()
                .filter_map(|t| Url::parse(t).ok())
                .collect();
            builder = builder.target_source(RoundRobinPicker::new(targets));
        }

        if let Some(host) = &upstream.host {
            builder = builder.host(host.clone());
        }

        if !upstream.skip_paths.is_empty() {
            let prefixes = upstream.skip_paths.clone();
            builder = builder.skip(move |ctx: &Context| {
                prefixes.iter().any(|prefix| path_under(ctx.path(), prefix))
            });
        }

        builder.build()
    }
}

/// True when `path` is `prefix` itself or lies below it. `/health` covers
/// `/health/live` but not `/healthz`.
fn path_under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: RelayConfig = toml::from_str(
            r#"
            [upstream]
            target = "http://127.0.0.1:3000"
            rewrites = ["/api/*:/$1"]
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.upstream.skip_paths, vec!["/health"]);
        assert_eq!(config.timeouts.request(), Some(Duration::from_secs(30)));
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert_eq!(config.build_proxy().unwrap().rewrites().len(), 1);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let timeouts = TimeoutConfig {
            connect_secs: 0,
            request_secs: 0,
        };
        assert_eq!(timeouts.connect(), None);
        assert_eq!(timeouts.request(), None);
    }

    #[test]
    fn test_build_without_target_fails() {
        let err = RelayConfig::default().build_proxy().unwrap_err();
        assert!(matches!(err, ConfigError::MissingTarget));
    }

    #[test]
    fn test_path_under_matches_whole_segments() {
        assert!(path_under("/health", "/health"));
        assert!(path_under("/health/live", "/health"));
        assert!(path_under("/health/live", "/health/"));
        assert!(!path_under("/healthz", "/health"));
        assert!(!path_under("/healthcheck/db", "/health"));
        assert!(!path_under("/api/health", "/health"));
        assert!(path_under("/anything", "/"));
    }

    #[tokio::test]
    async fn test_skip_paths_do_not_swallow_sibling_paths() {
        use crate::http::context::Terminate;
        use axum::{body::Body, http::Request};

        let mut config = RelayConfig::default();
        config.upstream.target = Some("http://127.0.0.1:1".into());
        let proxy = config.build_proxy().unwrap();

        let ctx = |path: &str| Context::new(Request::builder().uri(path).body(Body::empty()).unwrap());

        // Skipped: the continuation runs without any forward attempt.
        assert!(proxy.handle(&mut ctx("/health"), Terminate).await.is_ok());

        // Forwarded: the closed port surfaces as an upstream failure.
        for path in ["/healthz", "/healthcheck/db"] {
            let err = proxy.handle(&mut ctx(path), Terminate).await.unwrap_err();
            let proxy_err = err.as_proxy_error().unwrap();
            assert_eq!(proxy_err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_json_log_format() {
        let config: RelayConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
