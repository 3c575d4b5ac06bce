//! Authorization configuration.
//!
//! ```toml
//! [coarse]
//! enabled = true
//! validation_url = "http://pdp.internal/v1/coarse"
//! client_id = "gateway"
//! client_secret = "s3cret"
//! client_auth_method = "client_secret_basic"
//!
//! [coarse.resource_map]
//! "[/health]" = "/health-check"
//! "[/orders/**]" = "orders"
//!
//! [fine_grain]
//! enabled = true
//! validation_url = "http://pdp.internal/v1/decide"
//! timeout = "2s"
//!
//! [fine_grain.resource_map."[/orders:POST]"]
//! roles = ["buyer"]
//! ruleset_name = "orders"
//! ruleset_id = "rs-1"
//! body = { ids = "$.items[*].id" }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, AuthzResult};

/// Default timeout for a single PDP call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Root authorization configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Coarse path-to-resource check.
    pub coarse: CoarseConfig,
    /// Fine-grained method-and-path check.
    pub fine_grain: FineGrainConfig,
}

impl AuthzConfig {
    /// Create a configuration from its two sections.
    pub fn new(coarse: CoarseConfig, fine_grain: FineGrainConfig) -> Self {
        Self { coarse, fine_grain }
    }

    /// Load configuration from a TOML or JSON file.
    ///
    /// The format is chosen from the file extension. The result is validated
    /// before it is returned.
    pub fn from_file(path: impl AsRef<Path>) -> AuthzResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| AuthzError::config_load(path, e.to_string()))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let config: Self = match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| AuthzError::config_load(path, format!("invalid TOML: {e}")))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| AuthzError::config_load(path, format!("invalid JSON: {e}")))?,
            _ => {
                return Err(AuthzError::config_load(
                    path,
                    format!("unsupported config format: {extension}"),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that at least one section can actually run.
    pub fn validate(&self) -> AuthzResult<()> {
        if !self.coarse.is_active() && !self.fine_grain.is_active() {
            return Err(AuthzError::Config(
                "at least one enabled section with validation_url is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Credentials sent to the PDP.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCredentials {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Client authentication method. Empty or `client_secret_basic`.
    pub client_auth_method: String,
}

impl ClientCredentials {
    /// HTTP Basic credentials.
    pub fn basic(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_auth_method: "client_secret_basic".to_string(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.client_secret.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &secret)
            .field("client_auth_method", &self.client_auth_method)
            .finish()
    }
}

/// Coarse check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Allow requests whose path matches no resource.
    pub anonymous_access: bool,
    /// PDP endpoint.
    pub validation_url: String,
    /// PDP credentials.
    #[serde(flatten)]
    pub credentials: ClientCredentials,
    /// Timeout for one PDP call.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Path pattern to logical resource name.
    pub resource_map: IndexMap<String, String>,
}

impl Default for CoarseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            anonymous_access: false,
            validation_url: String::new(),
            credentials: ClientCredentials::default(),
            timeout: DEFAULT_TIMEOUT,
            resource_map: IndexMap::new(),
        }
    }
}

impl CoarseConfig {
    /// An enabled coarse check against the given PDP endpoint.
    pub fn new(validation_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            validation_url: validation_url.into(),
            ..Self::default()
        }
    }

    /// Map a path pattern to a resource.
    #[must_use]
    pub fn with_resource(mut self, pattern: impl Into<String>, resource: impl Into<String>) -> Self {
        self.resource_map.insert(pattern.into(), resource.into());
        self
    }

    /// Set anonymous access.
    #[must_use]
    pub fn with_anonymous_access(mut self, allow: bool) -> Self {
        self.anonymous_access = allow;
        self
    }

    /// Set PDP credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the PDP call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enabled and pointing at a PDP.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.validation_url.trim().is_empty()
    }
}

/// Request/response shape spoken with the fine-grained PDP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Structured decision request answered with permit/deny/allow.
    #[default]
    Decision,
    /// `{principal, request, rule}` answered with `{allow, reason}`.
    Generic,
}

/// One fine-grained rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineRule {
    /// Roles expected by the rule. Informational only.
    pub roles: Vec<String>,
    /// Ruleset name forwarded to the PDP.
    pub ruleset_name: String,
    /// Ruleset id forwarded to the PDP.
    pub ruleset_id: String,
    /// Decision body field name to JSON path.
    pub body: IndexMap<String, String>,
}

impl FineRule {
    /// Create a rule for a ruleset.
    pub fn new(ruleset_name: impl Into<String>, ruleset_id: impl Into<String>) -> Self {
        Self {
            ruleset_name: ruleset_name.into(),
            ruleset_id: ruleset_id.into(),
            ..Self::default()
        }
    }

    /// Add a body field extracted from the request body.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, json_path: impl Into<String>) -> Self {
        self.body.insert(name.into(), json_path.into());
        self
    }

    /// Add an expected role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

/// Fine-grained check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FineGrainConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// PDP endpoint.
    pub validation_url: String,
    /// PDP credentials.
    #[serde(flatten)]
    pub credentials: ClientCredentials,
    /// Timeout for one PDP call.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Which PDP dialect the gateway uses.
    pub dialect: Dialect,
    /// `path:METHOD` pattern to rule.
    pub resource_map: IndexMap<String, FineRule>,
}

impl Default for FineGrainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            validation_url: String::new(),
            credentials: ClientCredentials::default(),
            timeout: DEFAULT_TIMEOUT,
            dialect: Dialect::Decision,
            resource_map: IndexMap::new(),
        }
    }
}

impl FineGrainConfig {
    /// An enabled fine-grained check against the given PDP endpoint.
    pub fn new(validation_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            validation_url: validation_url.into(),
            ..Self::default()
        }
    }

    /// Add a rule.
    #[must_use]
    pub fn with_rule(mut self, pattern: impl Into<String>, rule: FineRule) -> Self {
        self.resource_map.insert(pattern.into(), rule);
        self
    }

    /// Set the dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set PDP credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the PDP call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enabled and pointing at a PDP.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.validation_url.trim().is_empty()
    }
}

/// Serde adapter for human-readable durations such as `"250ms"`, `"5s"`,
/// `"1m"` or `"2h"`. A string without a unit is read as seconds.
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as milliseconds when sub-second, otherwise seconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize from a duration string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse a duration string.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (digits, unit_secs, is_millis) = if let Some(n) = s.strip_suffix("ms") {
            (n, 0, true)
        } else if let Some(n) = s.strip_suffix('s') {
            (n, 1, false)
        } else if let Some(n) = s.strip_suffix('m') {
            (n, 60, false)
        } else if let Some(n) = s.strip_suffix('h') {
            (n, 3600, false)
        } else {
            (s, 1, false)
        };

        let n: u64 = digits
            .trim()
            .parse()
            .map_err(|_| format!("invalid duration: {s:?}"))?;
        if is_millis {
            Ok(Duration::from_millis(n))
        } else {
            Ok(Duration::from_secs(n.saturating_mul(unit_secs)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_invalid() {
        let err = AuthzConfig::default().validate().unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));
    }

    #[test]
    fn test_blank_url_does_not_count() {
        let config = AuthzConfig::new(CoarseConfig::new("   "), FineGrainConfig::default());
        assert!(config.validate().is_err());

        let mut fine = FineGrainConfig::new("http://pdp");
        fine.enabled = false;
        assert!(AuthzConfig::new(CoarseConfig::default(), fine).validate().is_err());
    }

    #[test]
    fn test_one_active_section_is_enough() {
        let config = AuthzConfig::new(CoarseConfig::default(), FineGrainConfig::new("http://pdp"));
        assert!(config.validate().is_ok());

        let config = AuthzConfig::new(CoarseConfig::new("http://pdp"), FineGrainConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: AuthzConfig = toml::from_str(
            r#"
            [coarse]
            enabled = true
            anonymous_access = true
            validation_url = "http://pdp/coarse"
            client_id = "gw"
            client_secret = "secret"
            client_auth_method = "client_secret_basic"
            timeout = "250ms"

            [coarse.resource_map]
            "[/health]" = "/health-check"
            "[/orders/**]" = "orders"

            [fine_grain]
            enabled = true
            validation_url = "http://pdp/decide"
            dialect = "generic"

            [fine_grain.resource_map."[/orders:POST]"]
            roles = ["buyer"]
            ruleset_name = "orders"
            ruleset_id = "rs-1"
            body = { ids = "$.items[*].id", giftUsed = "$.giftUsed" }
            "#,
        )
        .unwrap();

        assert!(config.coarse.anonymous_access);
        assert_eq!(config.coarse.credentials.client_id, "gw");
        assert_eq!(config.coarse.timeout, Duration::from_millis(250));
        assert_eq!(
            config.coarse.resource_map.keys().collect::<Vec<_>>(),
            vec!["[/health]", "[/orders/**]"]
        );

        assert_eq!(config.fine_grain.dialect, Dialect::Generic);
        assert_eq!(config.fine_grain.timeout, DEFAULT_TIMEOUT);
        let rule = &config.fine_grain.resource_map["[/orders:POST]"];
        assert_eq!(rule.roles, vec!["buyer"]);
        assert_eq!(rule.body["ids"], "$.items[*].id");
    }

    #[test]
    fn test_parse_json() {
        let config: AuthzConfig = serde_json::from_str(
            r#"{"fine_grain": {"enabled": true, "validation_url": "http://pdp", "timeout": "1m"}}"#,
        )
        .unwrap();
        assert!(!config.coarse.enabled);
        assert_eq!(config.fine_grain.dialect, Dialect::Decision);
        assert_eq!(config.fine_grain.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = ClientCredentials::basic("gw", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("gw"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_duration_parse() {
        assert_eq!(duration_serde::parse("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(duration_serde::parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(duration_serde::parse("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(duration_serde::parse("10"), Ok(Duration::from_secs(10)));
        assert!(duration_serde::parse("soon").is_err());
    }

    #[test]
    fn test_builders() {
        let coarse = CoarseConfig::new("http://pdp")
            .with_resource("[/a]", "a")
            .with_anonymous_access(true)
            .with_timeout(Duration::from_secs(1));
        assert!(coarse.is_active());
        assert_eq!(coarse.resource_map["[/a]"], "a");

        let fine = FineGrainConfig::new("http://pdp").with_rule(
            "[/a:POST]",
            FineRule::new("rs", "1").with_field("x", "$.x").with_role("admin"),
        );
        assert_eq!(fine.resource_map["[/a:POST]"].body["x"], "$.x");
    }
}
