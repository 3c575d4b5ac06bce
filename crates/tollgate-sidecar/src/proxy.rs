//! HTTP client forwarding authorized requests to the upstream service.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;

use crate::config::SidecarConfig;
use crate::error::{SidecarError, SidecarResult};
use crate::headers::{filter_headers, set_request_id};

/// HTTP proxy client for forwarding requests to upstream.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    upstream_url: String,
    timeout: Duration,
}

impl ProxyClient {
    /// Create a new proxy client.
    pub fn new(config: &SidecarConfig) -> SidecarResult<Self> {
        let client = Client::builder()
            .timeout(config.sidecar.upstream_timeout)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| SidecarError::config(format!("failed to create upstream client: {e}")))?;

        Ok(Self {
            client,
            upstream_url: config.sidecar.upstream_url.trim_end_matches('/').to_string(),
            timeout: config.sidecar.upstream_timeout,
        })
    }

    /// Forward a request to the upstream service.
    pub async fn forward(&self, request: ProxyRequest) -> SidecarResult<ProxyResponse> {
        let url = format!("{}{}", self.upstream_url, request.path);

        let mut headers = filter_headers(&request.headers);
        set_request_id(&mut headers, &request.request_id);

        let response = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| SidecarError::upstream(format!("request failed: {e}")))?;

        let status = response.status();
        let headers = filter_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| SidecarError::upstream(format!("failed to read body: {e}")))?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }

    /// Get the upstream URL.
    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Get the timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Request to be forwarded to upstream.
#[derive(Debug)]
pub struct ProxyRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path (including query string).
    pub path: String,
    /// Inbound request headers.
    pub headers: HeaderMap,
    /// Buffered request body.
    pub body: Bytes,
    /// Request id propagated to upstream.
    pub request_id: String,
}

impl ProxyRequest {
    /// Create a new proxy request.
    pub fn new(method: Method, path: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request_id: request_id.into(),
        }
    }

    /// Set the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

/// Response from upstream, hop-by-hop headers already removed.
#[derive(Debug)]
pub struct ProxyResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}
