//! Fine-grained authorization: is this specific action permitted?
//!
//! Rules are keyed by `path:METHOD`. When a rule matches, the authorizer
//! talks to the PDP in one of two dialects:
//!
//! - [`FineGrainAuthorizer::check`] builds a [`DecisionRequest`] and reads a
//!   permit/deny/allow [`DecisionResponse`].
//! - [`FineGrainAuthorizer::check_generic`] posts the principal, request and
//!   matched rule and reads a plain allow/reason answer.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{Dialect, FineGrainConfig, FineRule};
use crate::decision::{DecisionRequest, DecisionResponse, ValidationResponse, Verdict};
use crate::error::AuthzResult;
use crate::matcher::RuleTable;
use crate::pdp::{PdpClient, NON_2XX_PDP, NON_2XX_VALIDATION};
use crate::request::{Principal, RequestInfo};

/// Reason when the fine-grained check is not configured.
pub const SKIPPED_NO_CONFIG: &str = "fine-grain check skipped (no config)";

/// Reason when no rule matched the request.
pub const SKIPPED_NO_RULE: &str = "fine-grain check skipped (no matching rule)";

/// Payload of the generic dialect.
#[derive(Debug, Serialize)]
pub struct GenericPayload<'a> {
    /// Caller.
    pub principal: &'a Principal,
    /// Inbound request.
    pub request: &'a RequestInfo,
    /// Matched rule.
    pub rule: &'a FineRule,
}

#[derive(Debug)]
struct Active {
    client: PdpClient,
    rules: RuleTable<FineRule>,
}

/// Matches method and path to a rule and asks the PDP about it.
#[derive(Debug)]
pub struct FineGrainAuthorizer {
    active: Option<Active>,
    dialect: Dialect,
}

impl FineGrainAuthorizer {
    /// Build the authorizer. A disabled section or a missing URL produces an
    /// authorizer that always skips.
    pub fn new(config: &FineGrainConfig) -> AuthzResult<Self> {
        if !config.is_active() {
            return Ok(Self {
                active: None,
                dialect: config.dialect,
            });
        }

        let client = PdpClient::new(
            config.validation_url.clone(),
            config.credentials.clone(),
            config.timeout,
        )?;
        let rules = RuleTable::new(
            config
                .resource_map
                .iter()
                .map(|(pattern, rule)| (pattern, rule.clone())),
        );

        Ok(Self {
            active: Some(Active { client, rules }),
            dialect: config.dialect,
        })
    }

    /// Whether this authorizer ever calls the PDP.
    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    /// Configured dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Run the check in the configured dialect.
    pub async fn check_configured(
        &self,
        req: &RequestInfo,
        principal: &Principal,
        body: &Value,
    ) -> AuthzResult<Verdict> {
        match self.dialect {
            Dialect::Decision => self.check(req, principal, body).await,
            Dialect::Generic => self.check_generic(req, principal).await,
        }
    }

    /// Run the decision-dialect check.
    #[instrument(skip_all, fields(method = %req.method, path = %req.path, principal = %principal.log_id()))]
    pub async fn check(&self, req: &RequestInfo, principal: &Principal, body: &Value) -> AuthzResult<Verdict> {
        let (active, rule) = match self.matched_rule(req)? {
            Ok(found) => found,
            Err(skip) => return Ok(skip),
        };

        let decision = DecisionRequest::build(req, rule, body)?;
        let response: DecisionResponse = active.client.post_json(&decision, NON_2XX_PDP).await?;
        let verdict = response.verdict();
        debug!(ruleset = %rule.ruleset_name, allowed = verdict.allowed, "fine-grain decision");
        Ok(verdict)
    }

    /// Run the generic-dialect check.
    #[instrument(skip_all, fields(method = %req.method, path = %req.path, principal = %principal.log_id()))]
    pub async fn check_generic(&self, req: &RequestInfo, principal: &Principal) -> AuthzResult<Verdict> {
        let (active, rule) = match self.matched_rule(req)? {
            Ok(found) => found,
            Err(skip) => return Ok(skip),
        };

        let payload = GenericPayload {
            principal,
            request: req,
            rule,
        };
        let response: ValidationResponse = active.client.post_json(&payload, NON_2XX_VALIDATION).await?;
        debug!(ruleset = %rule.ruleset_name, allowed = response.allow, "fine-grain decision");
        Ok(response.into())
    }

    /// Build the decision request `check` would send, without sending it.
    ///
    /// `None` when the authorizer is disabled or no rule matches.
    pub fn build_decision_request(&self, req: &RequestInfo, body: &Value) -> AuthzResult<Option<DecisionRequest>> {
        match self.matched_rule(req)? {
            Ok((_, rule)) => DecisionRequest::build(req, rule, body).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// The matching rule, or the skip verdict to return instead.
    fn matched_rule(&self, req: &RequestInfo) -> AuthzResult<Result<(&Active, &FineRule), Verdict>> {
        let Some(active) = &self.active else {
            debug!(reason = SKIPPED_NO_CONFIG, "fine-grain check skipped");
            return Ok(Err(Verdict::allow(SKIPPED_NO_CONFIG)));
        };

        match active.rules.best_match(Some(req.method.as_str()), &req.path)? {
            Some((_, rule)) => Ok(Ok((active, rule))),
            None => {
                debug!(reason = SKIPPED_NO_RULE, "fine-grain check skipped");
                Ok(Err(Verdict::allow(SKIPPED_NO_RULE)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use serde_json::json;

    fn config() -> FineGrainConfig {
        FineGrainConfig::new("http://127.0.0.1:9/never")
            .with_rule("[/orders:POST]", FineRule::new("orders", "rs-1").with_field("ids", "$.items[*].id"))
    }

    #[tokio::test]
    async fn test_disabled_skips() {
        let authorizer = FineGrainAuthorizer::new(&FineGrainConfig::default()).unwrap();
        let req = RequestInfo::new("POST", "/orders");

        let verdict = authorizer.check(&req, &Principal::default(), &json!({})).await.unwrap();
        assert_eq!(verdict, Verdict::allow(SKIPPED_NO_CONFIG));

        let verdict = authorizer.check_generic(&req, &Principal::default()).await.unwrap();
        assert_eq!(verdict, Verdict::allow(SKIPPED_NO_CONFIG));
    }

    #[tokio::test]
    async fn test_method_mismatch_skips() {
        let authorizer = FineGrainAuthorizer::new(&config()).unwrap();
        let verdict = authorizer
            .check(&RequestInfo::new("GET", "/orders"), &Principal::default(), &json!({}))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::allow(SKIPPED_NO_RULE));
    }

    #[test]
    fn test_build_decision_request() {
        let authorizer = FineGrainAuthorizer::new(&config()).unwrap();
        let body = json!({"items": [{"id": "a"}, {"id": "b"}]});

        let decision = authorizer
            .build_decision_request(&RequestInfo::new("post", "/orders"), &body)
            .unwrap()
            .unwrap();
        assert_eq!(decision.body["ids"], json!(["a", "b"]));
        assert_eq!(decision.method, "post");

        let none = authorizer
            .build_decision_request(&RequestInfo::new("POST", "/unmapped"), &body)
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_extraction_error_stops_before_the_network() {
        let authorizer = FineGrainAuthorizer::new(&config()).unwrap();
        let err = authorizer
            .check(&RequestInfo::new("POST", "/orders"), &Principal::default(), &json!({"items": {}}))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Extraction { .. }));
    }

    #[test]
    fn test_generic_payload_shape() {
        let rule = FineRule::new("orders", "rs-1").with_role("buyer");
        let principal = Principal::new("u1", "ada", "");
        let req = RequestInfo::new("POST", "/orders");
        let payload = GenericPayload {
            principal: &principal,
            request: &req,
            rule: &rule,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["rule"]["ruleset_id"], "rs-1");
        assert_eq!(value["rule"]["roles"], json!(["buyer"]));
        assert_eq!(value["request"]["path"], "/orders");
    }
}
