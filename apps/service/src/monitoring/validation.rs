//! Monitor configuration checks run before a spec is accepted.

use std::net::IpAddr;

use url::Url;

use crate::database::models::{ConnectionType, MonitorSpec};

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_INTERVAL_SECONDS: u64 = 86_400;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

const HTTP_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Validation results with specific error messages
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    pub fn into_result(self) -> Result<(), String> {
        if self.is_valid {
            Ok(())
        } else {
            Err(self.error.unwrap_or_else(|| "Validation failed".to_string()))
        }
    }

    /// Keep the first failure
    fn and_then(self, next: impl FnOnce() -> ValidationResult) -> ValidationResult {
        if self.is_valid { next() } else { self }
    }
}

/// Validate a whole monitor spec
pub fn validate_spec(spec: &MonitorSpec) -> ValidationResult {
    validate_monitor_name(&spec.name)
        .and_then(|| validate_interval(spec.interval))
        .and_then(|| validate_timeout(spec.timeout))
        .and_then(|| validate_monitor_target(&spec.connection, spec.connection_type))
        .and_then(|| {
            if spec.connection_type == ConnectionType::Http {
                validate_http_method(&spec.http_method)
            } else {
                ValidationResult::ok()
            }
        })
        .and_then(|| {
            if spec.notification.enabled {
                validate_webhook(&spec.notification.webhook)
            } else {
                ValidationResult::ok()
            }
        })
}

/// Validate monitor target based on connection type
pub fn validate_monitor_target(target: &str, connection_type: ConnectionType) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("Connection cannot be empty");
    }

    match connection_type {
        ConnectionType::Http => validate_http_endpoint(target),
        ConnectionType::Tcp => validate_tcp_endpoint(target),
        ConnectionType::Ping => validate_ping_host(target),
        ConnectionType::Container => validate_container_name(target),
    }
}

pub fn validate_monitor_name(name: &str) -> ValidationResult {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return ValidationResult::err("Name cannot be empty");
    }

    if trimmed.chars().count() > MAX_NAME_LEN {
        return ValidationResult::err(format!("Name too long (max {MAX_NAME_LEN} characters)"));
    }

    ValidationResult::ok()
}

pub fn validate_interval(interval: u64) -> ValidationResult {
    if interval == 0 {
        return ValidationResult::err("Interval must be at least 1 second");
    }

    if interval > MAX_INTERVAL_SECONDS {
        return ValidationResult::err("Interval too long (max 24 hours)");
    }

    ValidationResult::ok()
}

/// 0 selects the handler default
pub fn validate_timeout(timeout: u64) -> ValidationResult {
    if timeout > MAX_TIMEOUT_SECONDS {
        return ValidationResult::err(format!("Timeout too long (max {MAX_TIMEOUT_SECONDS} seconds)"));
    }

    ValidationResult::ok()
}

pub fn validate_http_endpoint(target: &str) -> ValidationResult {
    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none() {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => {
            if !target.contains("://") {
                ValidationResult::err("URL must include scheme (http:// or https://)")
            } else {
                ValidationResult::err(format!("Invalid URL: {e}"))
            }
        }
    }
}

pub fn validate_http_method(method: &str) -> ValidationResult {
    if HTTP_METHODS.iter().any(|m| m.eq_ignore_ascii_case(method)) {
        ValidationResult::ok()
    } else {
        ValidationResult::err(format!("Unsupported HTTP method: {method}"))
    }
}

/// `host:port`, with IPv6 hosts in brackets
pub fn validate_tcp_endpoint(target: &str) -> ValidationResult {
    let Some((host, port)) = target.rsplit_once(':') else {
        return ValidationResult::err("TCP target must be in format 'host:port'");
    };

    let bracketed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']'));
    if let Some(inner) = bracketed {
        if inner.parse::<IpAddr>().is_err() {
            return ValidationResult::err(format!("Invalid IPv6 address: {inner}"));
        }
    } else if host.is_empty() {
        return ValidationResult::err("TCP target must be in format 'host:port'");
    } else if host.contains(':') {
        return ValidationResult::err("IPv6 TCP targets must be written as '[addr]:port'");
    }

    match port.parse::<u16>() {
        Ok(port) if port > 0 => ValidationResult::ok(),
        Ok(_) => ValidationResult::err("Port must be between 1 and 65535"),
        Err(_) => ValidationResult::err("Invalid port number"),
    }
}

/// IP address or hostname, nothing else
pub fn validate_ping_host(target: &str) -> ValidationResult {
    if target.parse::<IpAddr>().is_ok() {
        return ValidationResult::ok();
    }

    if target.contains("://") {
        return ValidationResult::err("Ping target must be a host, not a URL");
    }

    if target.chars().any(char::is_whitespace) {
        return ValidationResult::err("Target cannot contain spaces");
    }

    if target.starts_with('-') || target.ends_with('-') {
        return ValidationResult::err("Hostname cannot start or end with hyphen");
    }

    if target.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        ValidationResult::ok()
    } else {
        ValidationResult::err("Invalid hostname. Use IP address or valid hostname")
    }
}

/// Docker container name or ID
pub fn validate_container_name(target: &str) -> ValidationResult {
    let name = target.strip_prefix('/').unwrap_or(target);

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return ValidationResult::err("Container name cannot be empty");
    };

    if !first.is_ascii_alphanumeric() {
        return ValidationResult::err("Container name must start with a letter or digit");
    }

    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        ValidationResult::ok()
    } else {
        ValidationResult::err(format!("Invalid container name: {target}"))
    }
}

pub fn validate_webhook(webhook: &str) -> ValidationResult {
    if webhook.trim().is_empty() {
        return ValidationResult::err("Notifications are enabled but no webhook is set");
    }

    match Url::parse(webhook) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => ValidationResult::ok(),
        Ok(url) => ValidationResult::err(format!("Invalid webhook scheme '{}'", url.scheme())),
        Err(e) => ValidationResult::err(format!("Invalid webhook URL: {e}")),
    }
}
