//! Health check and incident data structures

use crate::errors::TrackerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Outcome of a single health check.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Down,
}

impl ServiceStatus {
    /// Incident severity implied by this status, `None` when healthy.
    pub fn severity(self) -> Option<IncidentSeverity> {
        match self {
            ServiceStatus::Healthy => None,
            ServiceStatus::Degraded => Some(IncidentSeverity::Degraded),
            ServiceStatus::Down => Some(IncidentSeverity::Down),
        }
    }

    pub fn is_healthy(self) -> bool {
        matches!(self, ServiceStatus::Healthy)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Healthy => write!(f, "healthy"),
            ServiceStatus::Degraded => write!(f, "degraded"),
            ServiceStatus::Down => write!(f, "down"),
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "healthy" | "up" | "ok" => Ok(ServiceStatus::Healthy),
            "degraded" | "slow" => Ok(ServiceStatus::Degraded),
            "down" | "outage" => Ok(ServiceStatus::Down),
            other => Err(TrackerError::Other(format!("unknown service status: {}", other))),
        }
    }
}

/// Status of an open or resolved incident. Never healthy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Degraded,
    Down,
}

impl std::fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentSeverity::Degraded => write!(f, "degraded"),
            IncidentSeverity::Down => write!(f, "down"),
        }
    }
}

impl From<IncidentSeverity> for ServiceStatus {
    fn from(severity: IncidentSeverity) -> Self {
        match severity {
            IncidentSeverity::Degraded => ServiceStatus::Degraded,
            IncidentSeverity::Down => ServiceStatus::Down,
        }
    }
}

/// One health observation for a named service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl ServiceCheck {
    pub fn new(service_name: impl Into<String>, status: ServiceStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            service_name: service_name.into(),
            timestamp,
            status,
            response_time_ms: None,
        }
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }
}

/// A contiguous span during which a service was not healthy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub service_name: String,
    pub start_time: DateTime<Utc>,
    pub status: IncidentSeverity,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl Incident {
    /// Open a new incident starting at `check`.
    pub fn open(check: &ServiceCheck, severity: IncidentSeverity, created_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}-{}", check.service_name, created_at.timestamp_millis()),
            service_name: check.service_name.clone(),
            start_time: check.timestamp,
            status: severity,
            resolved: false,
            end_time: None,
            duration_ms: None,
        }
    }

    /// Close the incident at `end_time`.
    pub fn resolve(&mut self, end_time: DateTime<Utc>) {
        self.resolved = true;
        self.end_time = Some(end_time);
        self.duration_ms = Some((end_time - self.start_time).num_milliseconds());
    }

    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}

/// Uptime figures for one service over a trailing window.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UptimeStats {
    pub service_name: String,
    pub window_days: u32,
    pub total_checks: usize,
    pub healthy_checks: usize,
    pub uptime_percentage: f64,
    pub average_response_time_ms: f64,
    pub incidents: Vec<Incident>,
}
