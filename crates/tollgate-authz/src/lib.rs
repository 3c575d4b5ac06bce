//! Tollgate Authorization - two-tier PDP checks for a gateway
//!
//! This crate decides whether an inbound request may be forwarded by asking
//! an external policy decision point (PDP) over HTTP. It never evaluates
//! policy itself and never caches decisions.
//!
//! # Overview
//!
//! Two independent checks run for every request:
//! - **Coarse**: the request path is mapped to a logical resource and the PDP
//!   is asked whether the caller may reach it
//! - **Fine-grained**: the method and path select a rule, fields are pulled
//!   from the JSON body with small JSON paths, and a structured decision
//!   request goes to the PDP
//!
//! # Architecture
//!
//! ```text
//!                 RequestInfo + Principal + body
//!                              │
//!                   ┌──────────▼──────────┐
//!                   │     Gatekeeper      │
//!                   └─────┬─────────┬─────┘
//!               join!     │         │
//!         ┌───────────────▼──┐   ┌──▼──────────────────┐
//!         │ CoarseAuthorizer │   │ FineGrainAuthorizer │
//!         │  RuleTable<res>  │   │  RuleTable<rule>    │
//!         └───────┬──────────┘   │  DecisionRequest    │
//!                 │              │   └─ extract()      │
//!                 │              └──┬──────────────────┘
//!                 │   PdpClient     │
//!                 └──────► PDP ◄────┘
//!                              │
//!                           Verdict
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tollgate_authz::{AuthzConfig, Gatekeeper, Principal, RequestInfo};
//!
//! let gatekeeper = Gatekeeper::new(AuthzConfig::from_file("authz.toml")?)?;
//!
//! let req = RequestInfo::new("POST", "/orders")
//!     .with_full_url("https://api.example.com/orders?dry_run=1")
//!     .with_header("x-request-id", "req-42");
//! let principal = Principal::new("u-1", "ada", "ada@example.com");
//!
//! let verdict = gatekeeper.authorize(&req, &principal, &body).await?;
//! if !verdict.allowed {
//!     // reject with verdict.reason
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coarse;
pub mod config;
pub mod decision;
pub mod error;
pub mod extract;
pub mod fine_grain;
pub mod gatekeeper;
pub mod matcher;
pub mod pdp;
pub mod request;

// Re-exports for convenience
pub use coarse::CoarseAuthorizer;
pub use config::{AuthzConfig, ClientCredentials, CoarseConfig, Dialect, FineGrainConfig, FineRule};
pub use decision::{DecisionRequest, DecisionResponse, ValidationResponse, Verdict};
pub use error::{AuthzError, AuthzResult, ErrorKind, ExtractError};
pub use extract::extract;
pub use fine_grain::FineGrainAuthorizer;
pub use gatekeeper::Gatekeeper;
pub use matcher::{match_path, match_with_method, RulePattern, RuleTable};
pub use pdp::{ClientAuthMethod, PdpClient};
pub use request::{Principal, RequestInfo};
