//! Tollgate sidecar: an authorizing reverse proxy.
//!
//! The sidecar sits in front of a single upstream service. Every inbound
//! request is checked by the coarse and fine-grained authorizers from
//! [`tollgate_authz`] before it is forwarded; anything that is not allowed is
//! answered with `403` and never reaches the upstream.
//!
//! ```text
//!                ┌──────────────────────────────────────┐
//!   client ────► │ Tollgate sidecar                     │ ────► upstream
//!                │  request id ─► identity ─► body      │
//!                │  ─► Gatekeeper (coarse ∥ fine-grain) │
//!                └──────────────┬───────────────────────┘
//!                               │ HTTP/JSON
//!                     validation service / PDP
//! ```
//!
//! Internal endpoints live under `/_tollgate/`: `health`, `ready`,
//! `metrics` and `version`.
//!
//! ```bash
//! $ tollgate-sidecar --config /etc/tollgate/sidecar.toml
//! $ TOLLGATE_UPSTREAM_URL=http://localhost:3000 tollgate-sidecar -c sidecar.toml
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod headers;
pub mod health;
pub mod identity;
pub mod proxy;
pub mod server;
pub mod telemetry;

pub use config::{IdentitySettings, SidecarConfig, SidecarConfigBuilder, SidecarSettings, TelemetrySettings};
pub use error::{ErrorResponse, SidecarError, SidecarResult};
pub use health::{HealthChecker, HealthStatus, ReadinessStatus};
pub use proxy::{ProxyClient, ProxyRequest, ProxyResponse};
pub use server::SidecarServer;

/// Sidecar version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
