//! Coarse authorization: is this resource reachable at all?

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::CoarseConfig;
use crate::decision::{ValidationResponse, Verdict};
use crate::error::AuthzResult;
use crate::matcher::RuleTable;
use crate::pdp::{PdpClient, NON_2XX_VALIDATION};
use crate::request::{Principal, RequestInfo};

/// Reason when the coarse check is not configured.
pub const SKIPPED_NO_CONFIG: &str = "coarse check skipped (no config)";

/// Reason when no resource matched and anonymous access is on.
pub const ALLOWED_NO_MATCH: &str =
    "coarse check allowed (no matching resource; anonymous_access=true)";

/// Reason when no resource matched and anonymous access is off.
pub const DENIED_NO_MATCH: &str = "coarse check denied (no matching resource)";

/// Payload posted to the coarse PDP endpoint.
#[derive(Debug, Serialize)]
pub struct CoarsePayload<'a> {
    /// Caller.
    pub principal: &'a Principal,
    /// Inbound request.
    pub request: &'a RequestInfo,
    /// Resource the path mapped to.
    pub resource: &'a str,
    /// Configured anonymous access flag.
    pub anonymous_access: bool,
}

#[derive(Debug)]
struct Active {
    client: PdpClient,
    resources: RuleTable<String>,
    anonymous_access: bool,
}

/// Maps request paths to resources and asks the PDP about them.
#[derive(Debug)]
pub struct CoarseAuthorizer {
    active: Option<Active>,
}

impl CoarseAuthorizer {
    /// Build the authorizer. A disabled section or a missing URL produces an
    /// authorizer that always skips.
    pub fn new(config: &CoarseConfig) -> AuthzResult<Self> {
        if !config.is_active() {
            return Ok(Self { active: None });
        }

        let client = PdpClient::new(
            config.validation_url.clone(),
            config.credentials.clone(),
            config.timeout,
        )?;
        let resources = RuleTable::new(
            config
                .resource_map
                .iter()
                .map(|(pattern, resource)| (pattern, resource.clone())),
        );

        Ok(Self {
            active: Some(Active {
                client,
                resources,
                anonymous_access: config.anonymous_access,
            }),
        })
    }

    /// Whether this authorizer ever calls the PDP.
    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    /// Run the coarse check.
    #[instrument(skip_all, fields(method = %req.method, path = %req.path, principal = %principal.log_id()))]
    pub async fn check(&self, req: &RequestInfo, principal: &Principal) -> AuthzResult<Verdict> {
        let Some(active) = &self.active else {
            debug!(reason = SKIPPED_NO_CONFIG, "coarse check skipped");
            return Ok(Verdict::allow(SKIPPED_NO_CONFIG));
        };

        let Some((_, resource)) = active.resources.best_match(None, &req.path)? else {
            return Ok(if active.anonymous_access {
                debug!(reason = ALLOWED_NO_MATCH, "coarse check skipped");
                Verdict::allow(ALLOWED_NO_MATCH)
            } else {
                debug!(reason = DENIED_NO_MATCH, "coarse check skipped");
                Verdict::deny(DENIED_NO_MATCH)
            });
        };

        let payload = CoarsePayload {
            principal,
            request: req,
            resource,
            anonymous_access: active.anonymous_access,
        };
        let response: ValidationResponse = active.client.post_json(&payload, NON_2XX_VALIDATION).await?;
        debug!(resource = %resource, allowed = response.allow, "coarse decision");
        Ok(response.into())
    }
}
