//! HTTP health probes that turn a request into a `ServiceCheck`

use crate::check::{ServiceCheck, ServiceStatus};
use crate::clock::Clock;
use crate::config::ServiceTarget;
use crate::errors::{Result, TrackerError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Produces one health observation for a target. Never fails: an unreachable
/// target is reported as `down`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, target: &ServiceTarget) -> ServiceCheck;
}

/// Probes a target with a single GET request.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
    degraded_threshold: Duration,
    clock: Arc<dyn Clock>,
}

impl HttpProbe {
    pub fn new(http_timeout: Duration, degraded_threshold: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("uptime_tracker/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            timeout: http_timeout,
            degraded_threshold,
            clock,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Map a received response to a status.
    pub fn classify(&self, status: StatusCode, elapsed: Duration) -> ServiceStatus {
        if status.is_server_error() {
            ServiceStatus::Down
        } else if !status.is_success() {
            ServiceStatus::Degraded
        } else if elapsed > self.degraded_threshold {
            ServiceStatus::Degraded
        } else {
            ServiceStatus::Healthy
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, target: &ServiceTarget) -> ServiceCheck {
        let timestamp = self.clock.now();
        let started = Instant::now();

        match self.client.get(&target.url).send().await {
            Ok(response) => {
                let elapsed = started.elapsed();
                let status = self.classify(response.status(), elapsed);

                debug!(
                    "Probe {} -> HTTP {} in {}ms ({})",
                    target.name,
                    response.status().as_u16(),
                    elapsed.as_millis(),
                    status
                );

                if !response.status().is_success() {
                    warn!(
                        "Service {} returned non-success status {}",
                        target.name,
                        response.status()
                    );
                }

                ServiceCheck::new(&target.name, status, timestamp)
                    .with_response_time(elapsed.as_millis() as u64)
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("Probe of {} timed out after {:?}", target.name, self.timeout);
                } else {
                    warn!("Failed to connect to service {}: {}", target.name, e);
                }

                ServiceCheck::new(&target.name, ServiceStatus::Down, timestamp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn probe() -> HttpProbe {
        HttpProbe::new(
            Duration::from_secs(5),
            Duration::from_millis(500),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    #[test]
    fn test_classify_statuses() {
        let probe = probe();
        let fast = Duration::from_millis(40);

        assert_eq!(probe.classify(StatusCode::OK, fast), ServiceStatus::Healthy);
        assert_eq!(probe.classify(StatusCode::NO_CONTENT, fast), ServiceStatus::Healthy);
        assert_eq!(probe.classify(StatusCode::NOT_FOUND, fast), ServiceStatus::Degraded);
        assert_eq!(probe.classify(StatusCode::TOO_MANY_REQUESTS, fast), ServiceStatus::Degraded);
        assert_eq!(probe.classify(StatusCode::INTERNAL_SERVER_ERROR, fast), ServiceStatus::Down);
        assert_eq!(probe.classify(StatusCode::SERVICE_UNAVAILABLE, fast), ServiceStatus::Down);
    }

    #[test]
    fn test_slow_success_is_degraded() {
        let probe = probe();

        assert_eq!(
            probe.classify(StatusCode::OK, Duration::from_millis(501)),
            ServiceStatus::Degraded
        );
        assert_eq!(
            probe.classify(StatusCode::OK, Duration::from_millis(500)),
            ServiceStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_unreachable_target_is_down() {
        let probe = HttpProbe::new(
            Duration::from_millis(500),
            Duration::from_millis(200),
            Arc::new(SystemClock),
        )
        .unwrap();

        // Port 9 (discard) on localhost is closed in test environments.
        let check = probe
            .probe(&ServiceTarget::new("nowhere", "http://127.0.0.1:9/health"))
            .await;

        assert_eq!(check.service_name, "nowhere");
        assert_eq!(check.status, ServiceStatus::Down);
        assert!(check.response_time_ms.is_none());
    }
}
