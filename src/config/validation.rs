//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, queue depth > 0)
//! - Reject values that would break URL or path construction
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GateConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: must not be empty")]
    Empty { field: &'static str },

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let app = &config.application;
    if app.name.is_empty() {
        errors.push(ValidationError::Empty { field: "application.name" });
    } else if app.name.contains(&['/', '?', '#', ' '][..]) {
        errors.push(invalid("application.name", "must be a single path segment"));
    }
    if app.public_host.is_empty() {
        errors.push(ValidationError::Empty { field: "application.public_host" });
    } else if app.public_host.contains(&['/', '?', '#', ' '][..]) {
        errors.push(invalid("application.public_host", "must be a bare host[:port]"));
    }
    for (field, value) in [
        ("application.asset_folder", &app.asset_folder),
        ("application.home_page", &app.home_page),
    ] {
        if value.is_empty() {
            errors.push(ValidationError::Empty { field });
        } else if value.contains(&['/', '\\'][..]) || value.starts_with('.') {
            errors.push(invalid(field, "must be a plain file or folder name"));
        }
    }

    let cas = &config.cas;
    match Url::parse(&cas.server_url) {
        Ok(url) if url.scheme() == "https" => {}
        Ok(url) => errors.push(invalid(
            "cas.server_url",
            format!("scheme must be https, got {}", url.scheme()),
        )),
        Err(e) => errors.push(invalid("cas.server_url", e.to_string())),
    }
    if cas.login_path.is_empty() {
        errors.push(ValidationError::Empty { field: "cas.login_path" });
    }
    if cas.validate_path.is_empty() {
        errors.push(ValidationError::Empty { field: "cas.validate_path" });
    }
    if cas.timeout_secs == 0 {
        errors.push(invalid("cas.timeout_secs", "must be greater than zero"));
    }
    if let Some(name) = &cas.cookie_name {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            errors.push(invalid("cas.cookie_name", "must be a non-empty cookie token"));
        }
    }

    let listener = &config.listener;
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(invalid("listener.bind_address", "must be a socket address"));
    }
    if listener.tls.is_some() && listener.tls_bind_address.parse::<SocketAddr>().is_err() {
        errors.push(invalid("listener.tls_bind_address", "must be a socket address"));
    }
    if listener.queue_depth == 0 {
        errors.push(invalid("listener.queue_depth", "must be greater than zero"));
    }
    if listener.max_body_bytes == 0 {
        errors.push(invalid("listener.max_body_bytes", "must be greater than zero"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(invalid("timeouts.request_secs", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(invalid("observability.metrics_address", "must be a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
