//! Runs both checks for a request and combines their outcomes.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::coarse::CoarseAuthorizer;
use crate::config::AuthzConfig;
use crate::decision::Verdict;
use crate::error::AuthzResult;
use crate::fine_grain::FineGrainAuthorizer;
use crate::request::{Principal, RequestInfo};

/// Reason used when the coarse check denies without one.
pub const COARSE_DENIED: &str = "coarse authorization denied";

/// Reason used when the fine-grained check denies without one.
pub const FINE_GRAIN_DENIED: &str = "fine-grain authorization denied";

/// One consistent pair of authorizers built from the same configuration.
#[derive(Debug)]
struct Authorizers {
    coarse: CoarseAuthorizer,
    fine_grain: FineGrainAuthorizer,
}

impl Authorizers {
    fn build(config: &AuthzConfig) -> AuthzResult<Self> {
        Ok(Self {
            coarse: CoarseAuthorizer::new(&config.coarse)?,
            fine_grain: FineGrainAuthorizer::new(&config.fine_grain)?,
        })
    }
}

/// Entry point for the gateway.
///
/// Both checks run concurrently and both must allow. The authorizer pair can
/// be replaced at runtime with [`Gatekeeper::reload`]; requests already in
/// flight finish against the pair they started with.
#[derive(Debug)]
pub struct Gatekeeper {
    current: RwLock<Arc<Authorizers>>,
}

impl Gatekeeper {
    /// Validate the configuration and build both authorizers.
    pub fn new(config: AuthzConfig) -> AuthzResult<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(Authorizers::build(&config)?)),
        })
    }

    /// Replace the running configuration.
    ///
    /// On error the running configuration stays in place.
    pub fn reload(&self, config: AuthzConfig) -> AuthzResult<()> {
        config.validate()?;
        let next = Arc::new(Authorizers::build(&config)?);
        *self.current.write() = next;
        info!(
            coarse = config.coarse.is_active(),
            fine_grain = config.fine_grain.is_active(),
            "authorization configuration reloaded"
        );
        Ok(())
    }

    fn snapshot(&self) -> Arc<Authorizers> {
        Arc::clone(&self.current.read())
    }

    /// Authorize one request.
    ///
    /// Errors win over denials, and the coarse outcome is looked at first.
    pub async fn authorize(&self, req: &RequestInfo, principal: &Principal, body: &Value) -> AuthzResult<Verdict> {
        let authorizers = self.snapshot();

        let (coarse, fine_grain) = tokio::join!(
            authorizers.coarse.check(req, principal),
            authorizers.fine_grain.check_configured(req, principal, body),
        );
        let coarse = coarse?;
        let fine_grain = fine_grain?;

        if !coarse.allowed {
            return Ok(Verdict::deny(or_default(coarse.reason, COARSE_DENIED)));
        }
        if !fine_grain.allowed {
            return Ok(Verdict::deny(or_default(fine_grain.reason, FINE_GRAIN_DENIED)));
        }

        debug!(coarse = %coarse.reason, fine_grain = %fine_grain.reason, "request authorized");
        Ok(Verdict::allow(fine_grain.reason))
    }
}

fn or_default(reason: String, default: &str) -> String {
    if reason.is_empty() {
        default.to_string()
    } else {
        reason
    }
}
