//! Check history, incident detection and uptime aggregation

use crate::check::{Incident, IncidentSeverity, ServiceCheck, ServiceStatus, UptimeStats};
use crate::clock::Clock;
use crate::retention::RetentionPolicy;
use crate::store::HistoryStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What a recorded check did to the service's incident state.
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentTransition {
    Unchanged,
    Opened {
        incident_id: String,
        severity: IncidentSeverity,
    },
    SeverityChanged {
        incident_id: String,
        from: IncidentSeverity,
        to: IncidentSeverity,
    },
    Resolved {
        incident_id: String,
        duration_ms: i64,
    },
}

/// Tracks health checks per service and maintains incident records.
///
/// Every mutation is written through to the [`HistoryStore`]. Reads never
/// fail; an unknown service simply has no checks.
pub struct UptimeTracker {
    history: Vec<ServiceCheck>,
    incidents: Vec<Incident>,
    store: HistoryStore,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
}

impl UptimeTracker {
    /// Load persisted state and apply retention.
    pub fn load(store: HistoryStore, clock: Arc<dyn Clock>, retention: RetentionPolicy) -> Self {
        let state = store.load();

        let mut tracker = Self {
            history: state.history,
            incidents: state.incidents,
            store,
            clock,
            retention,
        };

        if tracker.prune() > 0 {
            tracker.save();
        }

        info!(
            "Loaded uptime history: {} checks, {} incidents",
            tracker.history.len(),
            tracker.incidents.len()
        );

        tracker
    }

    /// Append a check, update incident state for its service and persist.
    pub fn record_check(&mut self, check: ServiceCheck) -> IncidentTransition {
        let now = self.clock.now();
        debug!(
            "Recording {} check for {} at {}",
            check.status, check.service_name, check.timestamp
        );

        self.history.push(check.clone());
        self.prune();

        let open = self
            .incidents
            .iter()
            .position(|incident| incident.service_name == check.service_name && incident.is_open());

        let transition = match (open, check.status.severity()) {
            (None, None) => IncidentTransition::Unchanged,
            (None, Some(severity)) => {
                let incident = Incident::open(&check, severity, now);
                let incident_id = incident.id.clone();
                self.incidents.push(incident);
                IncidentTransition::Opened {
                    incident_id,
                    severity,
                }
            }
            (Some(index), None) => {
                let incident = &mut self.incidents[index];
                incident.resolve(check.timestamp);
                IncidentTransition::Resolved {
                    incident_id: incident.id.clone(),
                    duration_ms: incident.duration_ms.unwrap_or_default(),
                }
            }
            (Some(index), Some(severity)) if self.incidents[index].status != severity => {
                let incident = &mut self.incidents[index];
                let from = incident.status;
                incident.status = severity;
                IncidentTransition::SeverityChanged {
                    incident_id: incident.id.clone(),
                    from,
                    to: severity,
                }
            }
            (Some(_), Some(_)) => IncidentTransition::Unchanged,
        };

        debug_assert!(
            self.open_incident_count(&check.service_name) <= 1,
            "more than one open incident for {}",
            check.service_name
        );

        self.save();
        transition
    }

    /// Uptime figures for `service_name` over the last `window_days`.
    pub fn uptime_stats(&self, service_name: &str, window_days: u32) -> UptimeStats {
        let since = self.window_start(window_days);

        let checks: Vec<&ServiceCheck> = self
            .history
            .iter()
            .filter(|check| check.service_name == service_name && check.timestamp >= since)
            .collect();

        let total_checks = checks.len();
        let healthy_checks = checks.iter().filter(|check| check.status.is_healthy()).count();

        let uptime_percentage = if total_checks == 0 {
            100.0
        } else {
            healthy_checks as f64 / total_checks as f64 * 100.0
        };

        let timings: Vec<u64> = checks.iter().filter_map(|check| check.response_time_ms).collect();
        let average_response_time_ms = if timings.is_empty() {
            0.0
        } else {
            timings.iter().sum::<u64>() as f64 / timings.len() as f64
        };

        let incidents = self
            .incidents
            .iter()
            .filter(|incident| incident.service_name == service_name && incident.start_time >= since)
            .cloned()
            .collect();

        UptimeStats {
            service_name: service_name.to_string(),
            window_days,
            total_checks,
            healthy_checks,
            uptime_percentage,
            average_response_time_ms,
            incidents,
        }
    }

    /// Incidents that started in the last `days`, most recent first.
    pub fn all_incidents(&self, days: u32) -> Vec<Incident> {
        let since = self.window_start(days);

        let mut incidents: Vec<Incident> = self
            .incidents
            .iter()
            .filter(|incident| incident.start_time >= since)
            .cloned()
            .collect();

        incidents.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        incidents
    }

    pub fn open_incident(&self, service_name: &str) -> Option<&Incident> {
        self.incidents
            .iter()
            .find(|incident| incident.service_name == service_name && incident.is_open())
    }

    /// Status of the most recent check for `service_name`.
    pub fn current_status(&self, service_name: &str) -> Option<ServiceStatus> {
        self.history
            .iter()
            .filter(|check| check.service_name == service_name)
            .max_by_key(|check| check.timestamp)
            .map(|check| check.status)
    }

    /// Distinct service names seen in history or incidents, sorted.
    pub fn services(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .history
            .iter()
            .map(|check| check.service_name.as_str())
            .chain(self.incidents.iter().map(|incident| incident.service_name.as_str()))
            .collect();

        names.into_iter().map(str::to_string).collect()
    }

    /// Checks for `service_name` in the last `days`, oldest first.
    pub fn service_history(&self, service_name: &str, days: u32) -> Vec<ServiceCheck> {
        let since = self.window_start(days);

        let mut checks: Vec<ServiceCheck> = self
            .history
            .iter()
            .filter(|check| check.service_name == service_name && check.timestamp >= since)
            .cloned()
            .collect();

        checks.sort_by_key(|check| check.timestamp);
        checks
    }

    pub fn history(&self) -> &[ServiceCheck] {
        &self.history
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    /// Forget everything and persist the empty state.
    pub fn clear(&mut self) {
        info!(
            "Clearing uptime history ({} checks, {} incidents)",
            self.history.len(),
            self.incidents.len()
        );
        self.history.clear();
        self.incidents.clear();
        self.save();
    }

    /// Start of a trailing window. Windows reaching past the earliest
    /// representable instant start there instead.
    fn window_start(&self, days: u32) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn prune(&mut self) -> usize {
        let now = self.clock.now();
        self.retention.prune_history(&mut self.history, now)
            + self.retention.prune_incidents(&mut self.incidents, now)
    }

    fn open_incident_count(&self, service_name: &str) -> usize {
        self.incidents
            .iter()
            .filter(|incident| incident.service_name == service_name && incident.is_open())
            .count()
    }

    fn save(&self) {
        self.store.save(&self.history, &self.incidents);
    }
}
