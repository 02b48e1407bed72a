//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and address formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: `&EngineConfig → Result<(), Vec<ValidationError>>`

use std::net::SocketAddr;

use crate::config::schema::EngineConfig;

/// One failed check, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("{:?} is not a socket address", server.bind_address),
        ));
    }
    if server.max_connections == 0 {
        errors.push(ValidationError::new("server.max_connections", "must be greater than 0"));
    }
    if server.payload_max_length == 0 {
        errors.push(ValidationError::new("server.payload_max_length", "must be greater than 0"));
    }
    if let Some(tls) = &server.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("server.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("server.tls.key_path", "must not be empty"));
        }
    }
    for (i, mount) in server.mounts.iter().enumerate() {
        if !mount.mount_point.starts_with('/') {
            errors.push(ValidationError::new(
                format!("server.mounts[{}].mount_point", i),
                "must start with '/'",
            ));
        }
        if mount.dir.trim().is_empty() {
            errors.push(ValidationError::new(format!("server.mounts[{}].dir", i), "must not be empty"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
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
    use crate::config::schema::{MountConfig, TlsConfig};

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = EngineConfig::default();
        config.server.bind_address = "localhost".into();
        config.server.max_connections = 0;
        config.server.payload_max_length = 0;
        config.server.tls = Some(TlsConfig {
            cert_path: "".into(),
            key_path: "key.pem".into(),
        });
        config.server.mounts.push(MountConfig {
            mount_point: "static".into(),
            dir: "./public".into(),
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "server.max_connections",
                "server.payload_max_length",
                "server.tls.cert_path",
                "server.mounts[0].mount_point",
            ]
        );
    }
}
