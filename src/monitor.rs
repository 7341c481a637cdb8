//! Periodic health-check scheduler feeding the uptime tracker

use crate::check::{ServiceCheck, UptimeStats};
use crate::clock::Clock;
use crate::config::{Config, ServiceTarget};
use crate::errors::{Result, TrackerError};
use crate::probe::HealthProbe;
use crate::tracker::{IncidentTransition, UptimeTracker};

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Probes configured targets on a schedule and records the results.
#[derive(Clone)]
pub struct UptimeMonitor {
    config: Arc<Config>,
    probe: Arc<dyn HealthProbe>,
    tracker: Arc<RwLock<UptimeTracker>>,
    clock: Arc<dyn Clock>,
    monitor_id: String,
}

impl UptimeMonitor {
    pub fn new(
        config: Config,
        probe: Arc<dyn HealthProbe>,
        tracker: UptimeTracker,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate().map_err(TrackerError::Config)?;

        Ok(Self {
            config: Arc::new(config),
            probe,
            tracker: Arc::new(RwLock::new(tracker)),
            clock,
            monitor_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn tracker(&self) -> Arc<RwLock<UptimeTracker>> {
        Arc::clone(&self.tracker)
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }

    /// Run until Ctrl-C, then log a final summary.
    #[instrument(skip(self), fields(monitor_id = %self.monitor_id))]
    pub async fn start(&self) -> Result<()> {
        if self.config.targets.is_empty() {
            return Err(TrackerError::Config(
                "no targets configured (set SERVICE_TARGETS)".to_string(),
            ));
        }

        info!(
            "Starting uptime monitor for {} targets, interval {:?}",
            self.config.targets.len(),
            self.config.check_interval
        );

        let mut tasks = Vec::new();

        for target in self.config.targets.iter().cloned() {
            let monitor = self.clone();
            tasks.push(tokio::spawn(async move {
                monitor.watch_target(target).await;
            }));
        }

        let reporter = self.clone();
        tasks.push(tokio::spawn(async move {
            reporter.report_stats().await;
        }));

        tokio::signal::ctrl_c().await.map_err(|e| {
            TrackerError::Other(format!("Failed to wait for shutdown signal: {}", e))
        })?;

        info!("Shutting down uptime monitor");
        for task in tasks {
            task.abort();
        }

        self.shutdown().await;
        Ok(())
    }

    /// Check one target forever at the configured interval.
    async fn watch_target(&self, target: ServiceTarget) {
        // Spread targets across the interval so they don't fire together.
        let jitter_ms = rand::random_range(0..=self.config.check_interval.as_millis() as u64);
        sleep(Duration::from_millis(jitter_ms)).await;

        info!("Watching {} at {}", target.name, target.url);

        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.check_target(&target).await;
        }
    }

    /// Probe one target and record the result.
    #[instrument(skip(self), fields(service = %target.name))]
    pub async fn check_target(&self, target: &ServiceTarget) -> ServiceCheck {
        let check = self.probe.probe(target).await;

        // record_check writes the store synchronously; run it on the blocking pool.
        let tracker = Arc::clone(&self.tracker);
        let recorded = check.clone();
        let transition = match tokio::task::spawn_blocking(move || {
            tracker.blocking_write().record_check(recorded)
        })
        .await
        {
            Ok(transition) => transition,
            Err(e) => {
                error!("Recording check for {} failed: {}", check.service_name, e);
                IncidentTransition::Unchanged
            }
        };

        match &transition {
            IncidentTransition::Unchanged => {
                debug!("{} is {}", check.service_name, check.status);
            }
            IncidentTransition::Opened { incident_id, severity } => {
                warn!(
                    "Incident {} opened: {} is {}",
                    incident_id, check.service_name, severity
                );
            }
            IncidentTransition::SeverityChanged { incident_id, from, to } => {
                warn!(
                    "Incident {} changed severity: {} went from {} to {}",
                    incident_id, check.service_name, from, to
                );
            }
            IncidentTransition::Resolved { incident_id, duration_ms } => {
                info!(
                    "Incident {} resolved: {} recovered after {}ms",
                    incident_id, check.service_name, duration_ms
                );
            }
        }

        check
    }

    /// Check every target once, concurrently.
    pub async fn run_once(&self) -> Vec<ServiceCheck> {
        let checks = join_all(
            self.config
                .targets
                .iter()
                .map(|target| self.check_target(target)),
        )
        .await;

        info!("Completed one round of {} checks", checks.len());
        checks
    }

    /// Stats for every known service over the configured window.
    pub async fn summary(&self) -> Vec<UptimeStats> {
        let tracker = self.tracker.read().await;
        tracker
            .services()
            .iter()
            .map(|service| tracker.uptime_stats(service, self.config.stats_window_days))
            .collect()
    }

    /// Services with an unresolved incident, however long ago it started.
    pub async fn open_incident_services(&self) -> Vec<String> {
        let tracker = self.tracker.read().await;
        tracker
            .incidents()
            .iter()
            .filter(|incident| incident.is_open())
            .map(|incident| incident.service_name.clone())
            .collect()
    }

    async fn report_stats(&self) {
        let mut report_interval = interval(self.config.report_interval);
        // The first tick fires immediately; skip it so the first report has data.
        report_interval.tick().await;

        loop {
            report_interval.tick().await;
            self.log_summary().await;
        }
    }

    async fn log_summary(&self) {
        let summary = self.summary().await;
        if summary.is_empty() {
            debug!("No checks recorded yet");
            return;
        }

        for stats in summary {
            let open = stats.incidents.iter().filter(|i| i.is_open()).count();
            info!(
                "Uptime {} over {}d: {:.2}% ({}/{} healthy), avg {:.0}ms, {} incidents ({} open)",
                stats.service_name,
                stats.window_days,
                stats.uptime_percentage,
                stats.healthy_checks,
                stats.total_checks,
                stats.average_response_time_ms,
                stats.incidents.len(),
                open
            );
        }
    }

    async fn shutdown(&self) {
        self.log_summary().await;

        let open = self.open_incident_services().await;
        if !open.is_empty() {
            error!("Shutting down with open incidents for: {}", open.join(", "));
        }

        info!(
            "Uptime monitor shutdown complete at {}",
            self.clock.now().to_rfc3339()
        );
    }
}
