//! Liveness and readiness for the sidecar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Health status of the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Sidecar is healthy.
    Healthy,
    /// Sidecar is unhealthy.
    Unhealthy,
}

/// Readiness status of the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// Sidecar is ready to handle traffic.
    Ready,
    /// Sidecar is not ready.
    NotReady,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status.
    pub status: HealthStatus,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Version information.
    pub version: String,
}

/// Readiness check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status.
    pub status: ReadinessStatus,
    /// Individual check results.
    pub checks: Vec<CheckResult>,
}

/// Result of a single readiness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a check result.
    pub fn new(name: impl Into<String>, passed: bool, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            message: Some(message.into()),
        }
    }
}

/// Health checker for the sidecar.
#[derive(Debug)]
pub struct HealthChecker {
    start_time: Instant,
    ready: AtomicBool,
    coarse_enabled: bool,
    fine_grain_enabled: bool,
}

impl HealthChecker {
    /// Create a health checker; it reports not-ready until
    /// [`HealthChecker::set_ready`] is called.
    pub fn new(coarse_enabled: bool, fine_grain_enabled: bool) -> Self {
        Self {
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
            coarse_enabled,
            fine_grain_enabled,
        }
    }

    /// Mark the sidecar as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if the sidecar is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Get the uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Perform a liveness check.
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse {
            status: HealthStatus::Healthy,
            uptime_seconds: self.uptime().as_secs(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Perform a readiness check.
    pub fn readiness(&self) -> ReadinessResponse {
        let checks = vec![
            CheckResult::new("listener", self.is_ready(), "accepting connections"),
            CheckResult::new(
                "authorization",
                self.coarse_enabled || self.fine_grain_enabled,
                format!(
                    "coarse={} fine_grain={}",
                    self.coarse_enabled, self.fine_grain_enabled
                ),
            ),
        ];

        let status = if checks.iter().all(|c| c.passed) {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };

        ReadinessResponse { status, checks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness() {
        let checker = HealthChecker::new(true, false);
        let response = checker.liveness();
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.version, crate::VERSION);
    }

    #[test]
    fn test_ready_state() {
        let checker = HealthChecker::new(true, false);
        assert_eq!(checker.readiness().status, ReadinessStatus::NotReady);

        checker.set_ready(true);
        assert_eq!(checker.readiness().status, ReadinessStatus::Ready);
    }

    #[test]
    fn test_not_ready_without_authorizers() {
        let checker = HealthChecker::new(false, false);
        checker.set_ready(true);
        assert_eq!(checker.readiness().status, ReadinessStatus::NotReady);
    }

    #[test]
    fn test_readiness_serialization() {
        let checker = HealthChecker::new(false, true);
        let json = serde_json::to_string(&checker.readiness()).unwrap();
        assert!(json.contains("not_ready"));
        assert!(json.contains("fine_grain=true"));
    }
}
