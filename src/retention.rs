//! Age and count bounds for stored history

use crate::check::{Incident, ServiceCheck};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    /// Records older than this are dropped
    pub max_age: Duration,

    /// Upper bound on stored checks for any single service
    pub max_checks_per_service: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::days(30),
            max_checks_per_service: 1000,
        }
    }
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, max_checks_per_service: usize) -> Self {
        Self {
            max_age,
            max_checks_per_service,
        }
    }

    /// Oldest instant still retained, clamped to the earliest representable one.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Drop aged checks, then trim each service to the per-service cap.
    /// Returns the number of checks removed.
    pub fn prune_history(&self, history: &mut Vec<ServiceCheck>, now: DateTime<Utc>) -> usize {
        let before = history.len();
        let cutoff = self.cutoff(now);
        history.retain(|check| check.timestamp >= cutoff);

        let mut per_service: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, check) in history.iter().enumerate() {
            per_service.entry(check.service_name.as_str()).or_default().push(index);
        }

        let mut doomed = vec![false; history.len()];
        let mut any_doomed = false;
        for indices in per_service.into_values() {
            if indices.len() <= self.max_checks_per_service {
                continue;
            }

            let excess = indices.len() - self.max_checks_per_service;
            let mut by_age = indices;
            // Stable sort keeps insertion order among equal timestamps.
            by_age.sort_by_key(|&index| history[index].timestamp);
            for index in by_age.into_iter().take(excess) {
                doomed[index] = true;
                any_doomed = true;
            }
        }

        if any_doomed {
            let mut flags = doomed.into_iter();
            history.retain(|_| !flags.next().unwrap_or(false));
        }

        let removed = before - history.len();
        if removed > 0 {
            debug!("Pruned {} checks from history", removed);
        }
        removed
    }

    /// Drop resolved incidents that started before the cutoff. Open incidents
    /// are kept regardless of age. Returns the number removed.
    pub fn prune_incidents(&self, incidents: &mut Vec<Incident>, now: DateTime<Utc>) -> usize {
        let before = incidents.len();
        let cutoff = self.cutoff(now);
        incidents.retain(|incident| incident.is_open() || incident.start_time >= cutoff);

        let removed = before - incidents.len();
        if removed > 0 {
            debug!("Pruned {} resolved incidents", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{IncidentSeverity, ServiceStatus};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn check(service: &str, minutes_ago: i64) -> ServiceCheck {
        ServiceCheck::new(service, ServiceStatus::Healthy, now() - Duration::minutes(minutes_ago))
    }

    #[test]
    fn test_prunes_by_age() {
        let policy = RetentionPolicy::default();
        let mut history = vec![
            ServiceCheck::new("a", ServiceStatus::Healthy, now() - Duration::days(31)),
            ServiceCheck::new("a", ServiceStatus::Healthy, now() - Duration::days(29)),
        ];

        assert_eq!(policy.prune_history(&mut history, now()), 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, now() - Duration::days(29));
    }

    #[test]
    fn test_cap_drops_oldest_of_that_service_only() {
        let policy = RetentionPolicy::new(Duration::days(30), 3);
        let mut history = vec![
            check("b", 100),
            check("a", 50),
            check("a", 40),
            check("b", 90),
            check("a", 30),
            check("a", 20),
            check("a", 10),
        ];

        assert_eq!(policy.prune_history(&mut history, now()), 2);

        let a: Vec<_> = history
            .iter()
            .filter(|c| c.service_name == "a")
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(
            a,
            vec![
                now() - Duration::minutes(30),
                now() - Duration::minutes(20),
                now() - Duration::minutes(10),
            ]
        );
        assert_eq!(history.iter().filter(|c| c.service_name == "b").count(), 2);
    }

    #[test]
    fn test_cap_uses_timestamps_not_insertion_order() {
        let policy = RetentionPolicy::new(Duration::days(30), 1);
        let mut history = vec![check("a", 5), check("a", 60)];

        policy.prune_history(&mut history, now());

        assert_eq!(history, vec![check("a", 5)]);
    }

    #[test]
    fn test_open_incidents_survive_age_pruning() {
        let policy = RetentionPolicy::default();
        let old = now() - Duration::days(45);

        let old_check = ServiceCheck::new("db", ServiceStatus::Down, old);
        let open = Incident::open(&old_check, IncidentSeverity::Down, old);

        let other_check = ServiceCheck::new("api", ServiceStatus::Down, old);
        let mut resolved = Incident::open(&other_check, IncidentSeverity::Down, old);
        resolved.resolve(old + Duration::minutes(5));

        let recent_check = ServiceCheck::new("api", ServiceStatus::Degraded, now() - Duration::days(1));
        let mut recent = Incident::open(&recent_check, IncidentSeverity::Degraded, recent_check.timestamp);
        recent.resolve(now());

        let mut incidents = vec![open.clone(), resolved, recent.clone()];
        assert_eq!(policy.prune_incidents(&mut incidents, now()), 1);
        assert_eq!(incidents, vec![open, recent]);
    }

    #[test]
    fn test_cutoff_saturates_for_huge_max_age() {
        let policy = RetentionPolicy::new(Duration::days(200_000_000), 1000);
        assert_eq!(policy.cutoff(now()), DateTime::<Utc>::MIN_UTC);

        let mut history = vec![check("a", 10)];
        assert_eq!(policy.prune_history(&mut history, now()), 0);
        assert_eq!(history.len(), 1);
    }
}
