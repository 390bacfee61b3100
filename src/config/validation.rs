//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0) and bind addresses
//! - Check that enabled features carry what they need (token, domain)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Static destination entries are not validated here; malformed ones are
//!   skipped with a warning when the static proposal is built

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::RelayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.forward.idle_timeout_ms == 0 {
        errors.push(ValidationError::new("forward.idle_timeout_ms", "must be greater than 0"));
    }

    let health = &config.health_check;
    if health.enabled() {
        if health.timeout_ms == 0 {
            errors.push(ValidationError::new("health_check.timeout_ms", "must be greater than 0"));
        }
        if health.domain.trim().is_empty() {
            errors.push(ValidationError::new(
                "health_check.domain",
                "required when health checks are enabled",
            ));
        }
    }

    let admin = &config.admin;
    if admin.enabled {
        if admin.token.is_empty() {
            errors.push(ValidationError::new("admin.token", "required when the admin API is enabled"));
        }
        if admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("{:?} is not a socket address", admin.bind_address),
            ));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&RelayConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = RelayConfig::default();
        config.forward.idle_timeout_ms = 0;
        config.health_check.period_ms = 1000;
        config.health_check.timeout_ms = 0;
        config.health_check.domain = " ".into();
        config.admin.enabled = true;
        config.admin.bind_address = "localhost".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nope".into();

        let fields: Vec<_> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            [
                "forward.idle_timeout_ms",
                "health_check.timeout_ms",
                "health_check.domain",
                "admin.token",
                "admin.bind_address",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn disabled_features_are_not_checked() {
        let mut config = RelayConfig::default();
        config.health_check.domain = String::new();
        config.admin.bind_address = "bogus".into();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
