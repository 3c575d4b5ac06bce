//! HTTP plumbing shared by both authorizers.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientCredentials;
use crate::error::{AuthzError, AuthzResult};

/// Diagnostic reason for a non-2xx coarse or generic answer.
pub const NON_2XX_VALIDATION: &str = "non-2xx from validation service";

/// Diagnostic reason for a non-2xx decision answer.
pub const NON_2XX_PDP: &str = "non-2xx from PDP";

/// Largest PDP response body that is read.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// How the gateway authenticates to the PDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuthMethod {
    /// No client authentication.
    None,
    /// HTTP Basic with client id and secret.
    ClientSecretBasic,
}

impl ClientAuthMethod {
    /// Parse a configured method name.
    pub fn parse(method: &str) -> AuthzResult<Self> {
        match method {
            "" => Ok(Self::None),
            "client_secret_basic" => Ok(Self::ClientSecretBasic),
            other => Err(AuthzError::UnsupportedClientAuth(other.to_string())),
        }
    }
}

/// JSON-over-HTTP client for one PDP endpoint.
#[derive(Debug, Clone)]
pub struct PdpClient {
    client: Client,
    validation_url: String,
    credentials: ClientCredentials,
}

impl PdpClient {
    /// Create a client with a per-call timeout.
    pub fn new(
        validation_url: impl Into<String>,
        credentials: ClientCredentials,
        timeout: Duration,
    ) -> AuthzResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthzError::Config(format!("failed to create PDP client: {e}")))?;

        Ok(Self {
            client,
            validation_url: validation_url.into(),
            credentials,
        })
    }

    /// The endpoint this client posts to.
    pub fn validation_url(&self) -> &str {
        &self.validation_url
    }

    /// POST `payload` as JSON and decode the JSON answer.
    ///
    /// One attempt only. A non-2xx answer becomes
    /// [`AuthzError::UnexpectedStatus`] carrying `non_success_reason`, and a
    /// body over [`MAX_RESPONSE_BYTES`] is never fully buffered.
    pub async fn post_json<P, R>(&self, payload: &P, non_success_reason: &'static str) -> AuthzResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let auth_method = ClientAuthMethod::parse(&self.credentials.client_auth_method)?;

        let mut request = self.client.post(&self.validation_url).json(payload);
        if auth_method == ClientAuthMethod::ClientSecretBasic && !self.credentials.client_id.is_empty() {
            request = request.basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            );
        }

        let mut response = request.send().await.map_err(AuthzError::Transport)?;
        let status = response.status();
        debug!(url = %self.validation_url, status = status.as_u16(), "PDP answered");

        if !status.is_success() {
            return Err(AuthzError::UnexpectedStatus {
                status: status.as_u16(),
                reason: non_success_reason,
            });
        }

        let too_large = AuthzError::ResponseTooLarge {
            limit: MAX_RESPONSE_BYTES,
        };
        if response
            .content_length()
            .is_some_and(|len| usize::try_from(len).map_or(true, |len| len > MAX_RESPONSE_BYTES))
        {
            return Err(too_large);
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(AuthzError::Transport)? {
            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(too_large);
            }
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&body).map_err(|e| AuthzError::Decode(e.to_string()))
    }
}
