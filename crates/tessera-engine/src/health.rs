//! Liveness and readiness.
//!
//! Liveness is trivial (the process answering at all is the signal).
//! Readiness pings every backend in parallel under a shared deadline and is
//! green only when all of them answer; the report names each backend with its
//! latency and failure, so a 503 body can point at the broken one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

/// Deadline for each readiness ping.
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(3);

/// A pingable backend. Implemented for `PgPool`; test doubles implement it
/// directly.
#[async_trait]
pub trait BackendPinger: Send + Sync {
    async fn ping(&self) -> Result<(), String>;
}

#[async_trait]
impl BackendPinger for PgPool {
    async fn ping(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(self)
            .await
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendHealth {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub backends: BTreeMap<String, BackendHealth>,
}

/// Pings every backend concurrently. Ready iff all pass within the deadline.
pub async fn check_backends(pingers: &[(String, Arc<dyn BackendPinger>)]) -> ReadinessReport {
    let checks = pingers.iter().map(|(name, pinger)| {
        let name = name.clone();
        let pinger = Arc::clone(pinger);
        async move {
            let start = tokio::time::Instant::now();
            let outcome = tokio::time::timeout(READINESS_TIMEOUT, pinger.ping()).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            let health = match outcome {
                Ok(Ok(())) => BackendHealth {
                    healthy: true,
                    latency_ms,
                    error: None,
                },
                Ok(Err(err)) => BackendHealth {
                    healthy: false,
                    latency_ms,
                    error: Some(err),
                },
                Err(_) => BackendHealth {
                    healthy: false,
                    latency_ms,
                    error: Some("readiness ping timed out".to_string()),
                },
            };
            (name, health)
        }
    });

    let results = futures::future::join_all(checks).await;
    let ready = results.iter().all(|(_, health)| health.healthy);
    if !ready {
        let failing: Vec<&str> = results
            .iter()
            .filter(|(_, h)| !h.healthy)
            .map(|(name, _)| name.as_str())
            .collect();
        tracing::warn!(backends = ?failing, "readiness check failed");
    }

    ReadinessReport {
        ready,
        backends: results.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkPinger;
    struct FailingPinger;
    struct HangingPinger;

    #[async_trait]
    impl BackendPinger for OkPinger {
        async fn ping(&self) -> Result<(), String> {
            Ok(())
        }
    }

    #[async_trait]
    impl BackendPinger for FailingPinger {
        async fn ping(&self) -> Result<(), String> {
            Err("connection refused".to_string())
        }
    }

    #[async_trait]
    impl BackendPinger for HangingPinger {
        async fn ping(&self) -> Result<(), String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn pingers(
        entries: Vec<(&str, Arc<dyn BackendPinger>)>,
    ) -> Vec<(String, Arc<dyn BackendPinger>)> {
        entries
            .into_iter()
            .map(|(name, p)| (name.to_string(), p))
            .collect()
    }

    #[tokio::test]
    async fn all_healthy_backends_report_ready() {
        let report = check_backends(&pingers(vec![
            ("pg-a", Arc::new(OkPinger)),
            ("pg-b", Arc::new(OkPinger)),
        ]))
        .await;
        assert!(report.ready);
        assert!(report.backends.values().all(|h| h.healthy));
    }

    #[tokio::test]
    async fn one_failing_backend_is_named() {
        let report = check_backends(&pingers(vec![
            ("pg-a", Arc::new(OkPinger)),
            ("pg-down", Arc::new(FailingPinger)),
        ]))
        .await;
        assert!(!report.ready);
        assert!(report.backends["pg-a"].healthy);
        let down = &report.backends["pg-down"];
        assert!(!down.healthy);
        assert_eq!(down.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_backend_times_out_within_the_deadline() {
        let report = check_backends(&pingers(vec![("pg-hung", Arc::new(HangingPinger))])).await;
        assert!(!report.ready);
        assert_eq!(
            report.backends["pg-hung"].error.as_deref(),
            Some("readiness ping timed out")
        );
    }

    #[tokio::test]
    async fn empty_backend_set_is_ready() {
        let report = check_backends(&[]).await;
        assert!(report.ready);
        assert!(report.backends.is_empty());
    }
}
