//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the listener and metrics addresses parse
//! - Check exactly one upstream source is configured and every URL is plain http
//! - Check rewrite directives compile
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: &RelayConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;
use crate::proxy::rewrite::compile_rewrites;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("upstream requires `target` or `targets`")]
    NoTarget,

    #[error("upstream `target` and `targets` are mutually exclusive")]
    ConflictingTargets,

    #[error("invalid upstream url {url:?}: {reason}")]
    TargetUrl { url: String, reason: String },

    #[error("{0}")]
    Rewrite(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }

    let upstream = &config.upstream;
    match (&upstream.target, upstream.targets.is_empty()) {
        (None, true) => errors.push(ValidationError::NoTarget),
        (Some(_), false) => errors.push(ValidationError::ConflictingTargets),
        _ => {}
    }
    for url in upstream.target.iter().chain(upstream.targets.iter()) {
        if let Err(reason) = check_target(url) {
            errors.push(ValidationError::TargetUrl {
                url: url.clone(),
                reason,
            });
        }
    }

    if let Err(e) = compile_rewrites(&upstream.rewrites) {
        errors.push(ValidationError::Rewrite(e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" => {}
        "https" => return Err("https upstreams need a custom transport".to_string()),
        other => return Err(format!("unsupported scheme {other}")),
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.upstream.target = Some("http://127.0.0.1:3000".into());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_missing_target() {
        let errors = validate_config(&RelayConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoTarget]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.listener.bind_address = "not-an-address".into();
        config.upstream.targets = vec!["ftp://files.local".into()];
        config.upstream.rewrites = vec!["/(d/:a".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::BindAddress("not-an-address".into())));
        assert!(errors.contains(&ValidationError::ConflictingTargets));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::TargetUrl { url, .. } if url == "ftp://files.local")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Rewrite(_))));
    }

    #[test]
    fn test_https_target_rejected() {
        let mut config = RelayConfig::default();
        config.upstream.target = Some("https://127.0.0.1:1".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::TargetUrl {
                url: "https://127.0.0.1:1".into(),
                reason: "https upstreams need a custom transport".into(),
            }]
        );
    }

    #[test]
    fn test_metrics_address_checked_when_enabled() {
        let mut config = valid();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MetricsAddress("nope".into())]);
    }
}
