//! Structured decision requests and PDP responses.
//!
//! A decision request is the PDP-facing view of one inbound request:
//!
//! ```text
//! POST https://api.example.com:8443/orders/42?tag=a&tag=b
//!
//! {
//!   "method": "POST",
//!   "headers": { "x-request-id": "...", "Authorization": "..." },
//!   "uri": {
//!     "schema": "https",
//!     "authority": { "host": "api.example.com", "port": "8443" },
//!     "path": ["/orders/42", "orders", "42"],
//!     "query": { "tag": ["a", "b"] }
//!   },
//!   "body": { ...fields extracted per rule... },
//!   "meta": { "runtime_fine_tune": { "combined_multi_value": false } }
//! }
//! ```

use http::Uri;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::FineRule;
use crate::error::{AuthzError, AuthzResult};
use crate::extract::extract;
use crate::request::RequestInfo;

/// Request id header forwarded to the PDP.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authorization header forwarded to the PDP when present.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// A PDP-ready decision request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// HTTP method of the inbound request.
    pub method: String,
    /// Forwarded header subset.
    pub headers: IndexMap<String, String>,
    /// Decomposed request URI.
    pub uri: DecisionUri,
    /// Fields extracted from the request body.
    pub body: IndexMap<String, Value>,
    /// Fixed tuning block.
    pub meta: DecisionMeta,
}

/// URI breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionUri {
    /// URL scheme, `http` when the URL has none.
    pub schema: String,
    /// `host` and, when written in the URL, `port`.
    pub authority: IndexMap<String, String>,
    /// Full path followed by each of its segments.
    pub path: Vec<String>,
    /// Query parameters; repeated keys become arrays.
    pub query: IndexMap<String, Value>,
}

/// Metadata block sent with every decision request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMeta {
    /// Runtime tuning flags.
    pub runtime_fine_tune: RuntimeFineTune,
}

/// Runtime tuning flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFineTune {
    /// Always `false`.
    pub combined_multi_value: bool,
}

impl DecisionRequest {
    /// Build the decision request for `req` under `rule`.
    ///
    /// Every body field declared by the rule is extracted from `body`; the
    /// first field that fails aborts the build.
    pub fn build(req: &RequestInfo, rule: &FineRule, body: &Value) -> AuthzResult<Self> {
        let uri: Uri = req
            .full_url
            .parse()
            .map_err(|e| AuthzError::InvalidRequest(format!("invalid URL {:?}: {e}", req.full_url)))?;

        let schema = uri.scheme_str().unwrap_or("http").to_string();

        let mut authority = IndexMap::new();
        if let Some(auth) = uri.authority() {
            authority.insert("host".to_string(), auth.host().to_string());
            if let Some(port) = auth.port() {
                authority.insert("port".to_string(), port.as_str().to_string());
            }
        }

        let mut headers = IndexMap::new();
        headers.insert(
            REQUEST_ID_HEADER.to_string(),
            req.header(REQUEST_ID_HEADER).unwrap_or_default().to_string(),
        );
        if let Some(token) = req.header(AUTHORIZATION_HEADER) {
            headers.insert(AUTHORIZATION_HEADER.to_string(), token.to_string());
        }

        let mut fields = IndexMap::with_capacity(rule.body.len());
        for (field, json_path) in &rule.body {
            let value = extract(body, json_path)
                .map_err(|e| AuthzError::extraction(field.as_str(), json_path.as_str(), e))?;
            fields.insert(field.clone(), value);
        }

        Ok(Self {
            method: req.method.clone(),
            headers,
            uri: DecisionUri {
                schema,
                authority,
                path: path_list(&req.path),
                query: query_map(uri.query().unwrap_or_default()),
            },
            body: fields,
            meta: DecisionMeta::default(),
        })
    }
}

fn path_list(path: &str) -> Vec<String> {
    std::iter::once(path.to_string())
        .chain(path.trim_start_matches('/').split('/').map(str::to_string))
        .collect()
}

fn query_map(query: &str) -> IndexMap<String, Value> {
    let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        grouped.entry(key.into_owned()).or_default().push(value.into_owned());
    }

    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::from(values)
            };
            (key, value)
        })
        .collect()
}

/// Response of the decision dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionResponse {
    /// Generic allow flag.
    #[serde(deserialize_with = "null_as_default")]
    pub allow: bool,
    /// Reason accompanying the allow flag.
    #[serde(deserialize_with = "null_as_default")]
    pub reason: String,
    /// Explicit permit token.
    #[serde(deserialize_with = "null_as_default")]
    pub permit: String,
    /// Explicit deny token.
    #[serde(deserialize_with = "null_as_default")]
    pub deny: String,
}

impl DecisionResponse {
    /// Interpret the response.
    ///
    /// A non-empty `permit` allows, otherwise a non-empty `deny` denies,
    /// otherwise `allow` decides. The token that decided becomes the reason.
    pub fn verdict(&self) -> Verdict {
        if !self.permit.is_empty() {
            Verdict::allow(self.permit.clone())
        } else if !self.deny.is_empty() {
            Verdict::deny(self.deny.clone())
        } else {
            Verdict {
                allowed: self.allow,
                reason: self.reason.clone(),
            }
        }
    }
}

/// Response of the coarse check and of the generic dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationResponse {
    /// Whether access is allowed.
    #[serde(deserialize_with = "null_as_default")]
    pub allow: bool,
    /// Optional explanation.
    #[serde(deserialize_with = "null_as_default")]
    pub reason: String,
}

/// Read an explicit `null` the same way as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<ValidationResponse> for Verdict {
    fn from(response: ValidationResponse) -> Self {
        Self {
            allowed: response.allow,
            reason: response.reason,
        }
    }
}

/// Outcome of one successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Explanation, possibly empty.
    pub reason: String,
}

impl Verdict {
    /// An allowing verdict.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    /// A denying verdict.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_rule() -> FineRule {
        FineRule::new("orders", "rs-1").with_field("ids", "$.items[*].id")
    }

    #[test]
    fn test_build_full_request() {
        let req = RequestInfo::new("POST", "/orders/42")
            .with_full_url("https://api.example.com:8443/orders/42?tag=a&single=x&tag=b")
            .with_header("X-Request-Id", "req-1")
            .with_header("authorization", "Bearer t")
            .with_header("Cookie", "session=1");
        let body = json!({"items": [{"id": "a"}, {"id": "b"}]});

        let decision = DecisionRequest::build(&req, &order_rule(), &body).unwrap();

        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "method": "POST",
                "headers": {"x-request-id": "req-1", "Authorization": "Bearer t"},
                "uri": {
                    "schema": "https",
                    "authority": {"host": "api.example.com", "port": "8443"},
                    "path": ["/orders/42", "orders", "42"],
                    "query": {"tag": ["a", "b"], "single": "x"}
                },
                "body": {"ids": ["a", "b"]},
                "meta": {"runtime_fine_tune": {"combined_multi_value": false}}
            })
        );
        assert_eq!(decision.uri.query.keys().collect::<Vec<_>>(), vec!["tag", "single"]);
    }

    #[test]
    fn test_relative_url_defaults() {
        let req = RequestInfo::new("GET", "/a/b");
        let decision = DecisionRequest::build(&req, &FineRule::default(), &Value::Null).unwrap();

        assert_eq!(decision.uri.schema, "http");
        assert!(decision.uri.authority.is_empty());
        assert!(decision.uri.query.is_empty());
        assert_eq!(decision.uri.path, vec!["/a/b", "a", "b"]);
        assert_eq!(decision.headers.len(), 1);
        assert_eq!(decision.headers[REQUEST_ID_HEADER], "");
        assert!(decision.body.is_empty());
    }

    #[test]
    fn test_explicit_default_port_is_kept() {
        let req = RequestInfo::new("GET", "/").with_full_url("https://h.example:443/");
        let decision = DecisionRequest::build(&req, &FineRule::default(), &Value::Null).unwrap();
        assert_eq!(decision.uri.authority["port"], "443");
        assert_eq!(decision.uri.path, vec!["/", ""]);
    }

    #[test]
    fn test_query_is_percent_decoded() {
        let req = RequestInfo::new("GET", "/s").with_full_url("/s?q=hello%20world&x=a+b");
        let decision = DecisionRequest::build(&req, &FineRule::default(), &Value::Null).unwrap();
        assert_eq!(decision.uri.query["q"], json!("hello world"));
        assert_eq!(decision.uri.query["x"], json!("a b"));
    }

    #[test]
    fn test_invalid_url() {
        let req = RequestInfo::new("GET", "/").with_full_url("http://bad host/");
        let err = DecisionRequest::build(&req, &FineRule::default(), &Value::Null).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidRequest(_)));
    }

    #[test]
    fn test_extraction_failure_names_the_field() {
        let rule = FineRule::default().with_field("account", "$.account.id");
        let err = DecisionRequest::build(&RequestInfo::new("POST", "/x"), &rule, &json!({}))
            .unwrap_err();
        match err {
            AuthzError::Extraction { field, path, .. } => {
                assert_eq!(field, "account");
                assert_eq!(path, "$.account.id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_permit_beats_deny() {
        let response = DecisionResponse {
            permit: "P".to_string(),
            deny: "D".to_string(),
            ..DecisionResponse::default()
        };
        assert_eq!(response.verdict(), Verdict::allow("P"));
    }

    #[test]
    fn test_deny_beats_allow() {
        let response = DecisionResponse {
            allow: true,
            deny: "blocked".to_string(),
            ..DecisionResponse::default()
        };
        assert_eq!(response.verdict(), Verdict::deny("blocked"));
    }

    #[test]
    fn test_permit_beats_allow_false() {
        let response = DecisionResponse {
            permit: "ok".to_string(),
            ..DecisionResponse::default()
        };
        assert_eq!(response.verdict(), Verdict::allow("ok"));
    }

    #[test]
    fn test_allow_flag_decides_alone() {
        let response: DecisionResponse =
            serde_json::from_value(json!({"allow": true, "reason": "fine"})).unwrap();
        assert_eq!(response.verdict(), Verdict::allow("fine"));

        let response: DecisionResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response.verdict(), Verdict::deny(""));
    }

    #[test]
    fn test_null_fields_read_as_absent() {
        let response: DecisionResponse = serde_json::from_str(
            r#"{"allow":true,"reason":null,"permit":null,"deny":null}"#,
        )
        .unwrap();
        assert_eq!(response.verdict(), Verdict::allow(""));

        let response: DecisionResponse =
            serde_json::from_str(r#"{"allow":null,"permit":"P","deny":null}"#).unwrap();
        assert_eq!(response.verdict(), Verdict::allow("P"));

        let response: DecisionResponse =
            serde_json::from_str(r#"{"allow":true,"permit":null,"deny":"D"}"#).unwrap();
        assert_eq!(response.verdict(), Verdict::deny("D"));
    }

    #[test]
    fn test_validation_response_null_reason() {
        let response: ValidationResponse =
            serde_json::from_str(r#"{"allow":true,"reason":null}"#).unwrap();
        assert_eq!(Verdict::from(response), Verdict::allow(""));
    }
}
