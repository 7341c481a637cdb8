//! Service Uptime Tracker Library
//!
//! This library records periodic health checks per named service, detects
//! incidents, computes uptime over trailing windows and persists its state to a
//! key-value store. It also provides a single-slot time-bounded cache and a
//! cached JSON post feed built on it.

pub mod cache;
pub mod check;
pub mod clock;
pub mod config;
pub mod errors;
pub mod feed;
pub mod monitor;
pub mod probe;
pub mod retention;
pub mod store;
pub mod tracker;

pub use cache::TimedCache;
pub use check::{Incident, IncidentSeverity, ServiceCheck, ServiceStatus, UptimeStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ServiceTarget};
pub use errors::{Result, TrackerError};
pub use feed::{Page, Post, PostFeed};
pub use monitor::UptimeMonitor;
pub use probe::{HealthProbe, HttpProbe};
pub use retention::RetentionPolicy;
pub use store::{FileStore, HistoryStore, KeyValueStore, MemoryStore};
pub use tracker::{IncidentTransition, UptimeTracker};
