//! Caller identity from the trusted principal header.

use http::HeaderMap;
use tollgate_authz::Principal;

use crate::config::IdentitySettings;
use crate::error::{SidecarError, SidecarResult};

/// Read the principal placed by the authenticating layer.
///
/// A missing header yields the anonymous principal unless the settings
/// require one. A header that is present but not a JSON principal is always
/// rejected.
pub fn extract_principal(headers: &HeaderMap, settings: &IdentitySettings) -> SidecarResult<Principal> {
    let Some(value) = headers.get(settings.principal_header.as_str()) else {
        if settings.require_principal {
            return Err(SidecarError::unauthenticated(format!(
                "missing {} header",
                settings.principal_header
            )));
        }
        return Ok(Principal::default());
    };

    let raw = value
        .to_str()
        .map_err(|_| SidecarError::unauthenticated("caller identity is not valid UTF-8"))?;
    serde_json::from_str(raw)
        .map_err(|e| SidecarError::unauthenticated(format!("invalid caller identity: {e}")))
}
