//! Configuration for the Tollgate sidecar.
//!
//! Settings come from a TOML or JSON file, then `TOLLGATE_*` environment
//! variables, then [`SidecarConfig::validate`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tollgate_authz::config::duration_serde;
use tollgate_authz::AuthzConfig;

use crate::error::{SidecarError, SidecarResult};

/// Sidecar configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Sidecar server settings.
    pub sidecar: SidecarSettings,
    /// Coarse and fine-grained authorization.
    pub authorization: AuthzConfig,
    /// Caller identity settings.
    pub identity: IdentitySettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
}

impl SidecarConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SidecarConfigBuilder {
        SidecarConfigBuilder::default()
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML and JSON formats based on file extension.
    pub fn from_file(path: impl AsRef<Path>) -> SidecarResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SidecarError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| SidecarError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| SidecarError::config(format!("invalid JSON: {e}"))),
            _ => Err(SidecarError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply environment variable overrides from the process environment.
    ///
    /// Variables are prefixed with `TOLLGATE_` and use uppercase `snake_case`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Values that fail to parse are ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("TOLLGATE_LISTEN_PORT").and_then(|p| p.parse().ok()) {
            self.sidecar.listen_port = port;
        }

        if let Some(url) = lookup("TOLLGATE_UPSTREAM_URL") {
            self.sidecar.upstream_url = url;
        }

        if let Some(timeout) = lookup("TOLLGATE_UPSTREAM_TIMEOUT")
            .and_then(|t| duration_serde::parse(&t).ok())
        {
            self.sidecar.upstream_timeout = timeout;
        }

        if let Some(header) = lookup("TOLLGATE_PRINCIPAL_HEADER") {
            self.identity.principal_header = header;
        }

        if let Some(port) = lookup("TOLLGATE_METRICS_PORT").and_then(|p| p.parse().ok()) {
            self.telemetry.metrics_port = Some(port);
        }

        if let Some(level) = lookup("TOLLGATE_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SidecarResult<()> {
        if self.sidecar.upstream_url.is_empty() {
            return Err(SidecarError::config("upstream_url is required"));
        }

        if !self.sidecar.upstream_url.starts_with("http://")
            && !self.sidecar.upstream_url.starts_with("https://")
        {
            return Err(SidecarError::config(
                "upstream_url must start with http:// or https://",
            ));
        }

        if self.identity.principal_header.trim().is_empty() {
            return Err(SidecarError::config("identity.principal_header must not be empty"));
        }

        self.authorization
            .validate()
            .map_err(|e| SidecarError::config(e.to_string()))
    }
}

/// Sidecar server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarSettings {
    /// Port the sidecar listens on.
    pub listen_port: u16,
    /// Address to bind to.
    pub listen_addr: String,
    /// Upstream service URL.
    pub upstream_url: String,
    /// Upstream request timeout.
    #[serde(with = "duration_serde")]
    pub upstream_timeout: Duration,
    /// Maximum request body size in bytes.
    pub max_request_body_size: usize,
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            listen_addr: "0.0.0.0".to_string(),
            upstream_url: "http://localhost:3000".to_string(),
            upstream_timeout: Duration::from_secs(30),
            max_request_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Caller identity settings.
///
/// The authenticating layer in front of the sidecar places the caller as a
/// JSON object (`user_id`, `username`, `email`) in a trusted header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Header carrying the JSON principal.
    pub principal_header: String,
    /// Reject requests without the header instead of treating them as
    /// anonymous.
    pub require_principal: bool,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            principal_header: "x-caller-identity".to_string(),
            require_principal: false,
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Log filter directive.
    pub log_level: String,
    /// JSON log lines instead of pretty output.
    pub json_logs: bool,
    /// Record Prometheus metrics.
    pub metrics_enabled: bool,
    /// Extra port serving Prometheus metrics. Metrics are always available at
    /// `/_tollgate/metrics` when enabled.
    pub metrics_port: Option<u16>,
    /// Service name recorded on request spans and reported by
    /// `/_tollgate/version`.
    pub service_name: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
            metrics_port: None,
            service_name: "tollgate-sidecar".to_string(),
        }
    }
}

/// Builder for `SidecarConfig`.
#[derive(Debug, Default)]
pub struct SidecarConfigBuilder {
    config: SidecarConfig,
}

impl SidecarConfigBuilder {
    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.sidecar.listen_port = port;
        self
    }

    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.sidecar.listen_addr = addr.into();
        self
    }

    /// Set the upstream URL.
    #[must_use]
    pub fn upstream_url(mut self, url: impl Into<String>) -> Self {
        self.config.sidecar.upstream_url = url.into();
        self
    }

    /// Set the upstream timeout.
    #[must_use]
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.config.sidecar.upstream_timeout = timeout;
        self
    }

    /// Set the maximum request body size.
    #[must_use]
    pub fn max_request_body_size(mut self, bytes: usize) -> Self {
        self.config.sidecar.max_request_body_size = bytes;
        self
    }

    /// Set the authorization configuration.
    #[must_use]
    pub fn authorization(mut self, authorization: AuthzConfig) -> Self {
        self.config.authorization = authorization;
        self
    }

    /// Require a caller identity on every request.
    #[must_use]
    pub fn require_principal(mut self, require: bool) -> Self {
        self.config.identity.require_principal = require;
        self
    }

    /// Set the metrics port.
    #[must_use]
    pub fn metrics_port(mut self, port: u16) -> Self {
        self.config.telemetry.metrics_port = Some(port);
        self
    }

    /// Set the service name reported in logs and by the version endpoint.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.telemetry.service_name = name.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SidecarResult<SidecarConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
