use crate::report::StatusReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::{debug, info, warn};

mod stats;

pub use stats::{fleet_stats, FleetStats};

/// Sentinel status the health monitor assigns to silent agents.
pub const INACTIVE_STATUS: &str = "inactive";

/// In-memory state held for one agent.
///
/// Optional fields follow merge-on-update semantics: a report that omits a
/// field leaves the stored value untouched, so absence and "no new value"
/// stay distinguishable.
#[derive(Clone, Debug, Serialize)]
pub struct AgentRecord {
    /// Unique agent identifier (immutable)
    pub id: String,

    /// User-assigned display name, sticky (never cleared by a report)
    pub display_name: Option<String>,

    /// Hardware (MAC) address, sticky once set
    pub hardware_address: Option<String>,

    /// Set once when the agent is first seen
    pub first_seen: DateTime<Utc>,

    /// Updated on every accepted report
    pub last_seen: DateTime<Utc>,

    /// Last status explicitly sent by the agent, or the monitor's
    /// "inactive" sentinel
    pub reported_status: String,

    pub battery_level: Option<f64>,
    pub radio_signal: Option<i32>,
    pub location: Option<HashMap<String, f64>>,
    pub sensor_payload: Option<Value>,
    pub uptime_seconds: Option<u64>,

    /// Number of accepted reports, 1 on creation
    pub connection_count: u64,
}

/// Snapshot view of an agent: record fields plus derived freshness.
///
/// `is_fresh` is computed from reporting cadence and is deliberately a
/// separate signal from `reported_status` — consumers may depend on either.
#[derive(Clone, Debug, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub record: AgentRecord,
    pub is_fresh: bool,
    pub seconds_since_last_seen: i64,
}

/// Registry operation errors
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Caller supplied an unusable argument; no state was mutated
    InvalidArgument(String),
    /// Unknown agent id; no state was mutated
    NotFound(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            RegistryError::NotFound(id) => write!(f, "agent '{}' not found", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Owns the map from agent id to AgentRecord.
///
/// Every public operation appears atomic to concurrent callers: one RwLock
/// guards the whole map, critical sections are short and never perform I/O.
/// The map is never exposed for direct mutation.
pub struct Registry {
    agents: RwLock<HashMap<String, AgentRecord>>,
    timeout_seconds: i64,
}

impl Registry {
    /// Create an empty registry with the given freshness timeout.
    pub fn new(timeout_seconds: i64) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            timeout_seconds,
        }
    }

    /// Freshness timeout in seconds. An agent silent for at most this long
    /// is still considered fresh (inclusive boundary).
    pub fn timeout_seconds(&self) -> i64 {
        self.timeout_seconds
    }

    /// Merge a validated report into the registry.
    ///
    /// Unknown ids create a record with `first_seen = last_seen = now` and
    /// `connection_count = 1`. Known ids have `last_seen` advanced,
    /// `reported_status` overwritten, `connection_count` incremented, and
    /// every optional field merged only when the report supplies it.
    ///
    /// Returns the merged view so callers can broadcast the full record.
    pub fn upsert(&self, report: &StatusReport) -> Result<AgentView, RegistryError> {
        if report.id.trim().is_empty() {
            return Err(RegistryError::InvalidArgument(
                "agent id cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let mut agents = self.agents.write().unwrap();

        let record = match agents.get_mut(&report.id) {
            Some(record) => {
                record.last_seen = now;
                record.reported_status = report.reported_status.clone();
                record.connection_count += 1;

                // Merge, never overwrite-with-default
                if let Some(level) = report.battery_level {
                    record.battery_level = Some(level);
                }
                if let Some(signal) = report.radio_signal {
                    record.radio_signal = Some(signal);
                }
                if let Some(mac) = &report.hardware_address {
                    record.hardware_address = Some(mac.clone());
                }
                if let Some(location) = &report.location {
                    record.location = Some(location.clone());
                }
                if let Some(payload) = &report.sensor_payload {
                    record.sensor_payload = Some(payload.clone());
                }
                if let Some(uptime) = report.uptime_seconds {
                    record.uptime_seconds = Some(uptime);
                }

                debug!(bot_id = %report.id, status = %report.reported_status, "Updated agent");
                record.clone()
            }
            None => {
                let record = AgentRecord {
                    id: report.id.clone(),
                    display_name: None,
                    hardware_address: report.hardware_address.clone(),
                    first_seen: now,
                    last_seen: now,
                    reported_status: report.reported_status.clone(),
                    battery_level: report.battery_level,
                    radio_signal: report.radio_signal,
                    location: report.location.clone(),
                    sensor_payload: report.sensor_payload.clone(),
                    uptime_seconds: report.uptime_seconds,
                    connection_count: 1,
                };
                agents.insert(report.id.clone(), record.clone());
                info!(bot_id = %report.id, "Registered new agent");
                record
            }
        };
        drop(agents);

        Ok(self.view_of(record, now))
    }

    /// Get an agent record by id.
    pub fn get(&self, id: &str) -> Option<AgentRecord> {
        self.agents.read().unwrap().get(id).cloned()
    }

    /// Get the augmented view of one agent.
    pub fn view(&self, id: &str) -> Option<AgentView> {
        let record = self.get(id)?;
        Some(self.view_of(record, Utc::now()))
    }

    /// Set the display name for an agent.
    pub fn rename(&self, id: &str, new_name: &str) -> Result<(), RegistryError> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "name cannot be empty".to_string(),
            ));
        }

        let mut agents = self.agents.write().unwrap();
        let record = agents
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        record.display_name = Some(name.to_string());
        info!(bot_id = %id, name = %name, "Agent renamed");
        Ok(())
    }

    /// Globally consistent snapshot of all agents, most recently seen first.
    pub fn snapshot(&self) -> Vec<AgentView> {
        let now = Utc::now();
        let mut views: Vec<AgentView> = self
            .agents
            .read()
            .unwrap()
            .values()
            .map(|record| self.view_of(record.clone(), now))
            .collect();

        views.sort_by(|a, b| b.record.last_seen.cmp(&a.record.last_seen));
        views
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().unwrap().is_empty()
    }

    /// Atomically remove every record matching the predicate.
    /// Returns the removed count; removing zero records is not an error.
    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&AgentRecord) -> bool,
    {
        let mut agents = self.agents.write().unwrap();
        let before = agents.len();
        agents.retain(|_, record| !predicate(record));
        before - agents.len()
    }

    /// Remove agents whose silence exceeds `max_age_days` (strictly greater,
    /// measured in whole seconds like every other silence comparison).
    pub fn remove_older_than(&self, max_age_days: i64) -> usize {
        let now = Utc::now();
        let max_age_seconds = max_age_days * 86_400;
        let removed =
            self.remove_where(|record| (now - record.last_seen).num_seconds() > max_age_seconds);
        if removed > 0 {
            info!(removed = removed, max_age_days = max_age_days, "Removed old agents");
        }
        removed
    }

    /// Remove agents silent for strictly more than `max_inactive_minutes`.
    /// Silence exactly equal to the window is not enough.
    pub fn remove_inactive(&self, max_inactive_minutes: i64) -> usize {
        let now = Utc::now();
        let max_silence_seconds = max_inactive_minutes * 60;
        let removed = self
            .remove_where(|record| (now - record.last_seen).num_seconds() > max_silence_seconds);
        if removed > 0 {
            info!(
                removed = removed,
                max_inactive_minutes = max_inactive_minutes,
                "Removed inactive agents"
            );
        }
        removed
    }

    /// Sweep for agents silent past the freshness timeout and force their
    /// status to "inactive". The status guard makes the sweep idempotent:
    /// an agent already marked inactive is not returned again.
    pub fn mark_stale_as_inactive(&self) -> Vec<String> {
        let now = Utc::now();
        let mut transitioned = Vec::new();

        let mut agents = self.agents.write().unwrap();
        for (id, record) in agents.iter_mut() {
            let silence = (now - record.last_seen).num_seconds();
            if silence > self.timeout_seconds && record.reported_status != INACTIVE_STATUS {
                record.reported_status = INACTIVE_STATUS.to_string();
                warn!(bot_id = %id, silence_seconds = silence, "Agent marked inactive");
                transitioned.push(id.clone());
            }
        }

        transitioned
    }

    fn view_of(&self, record: AgentRecord, now: DateTime<Utc>) -> AgentView {
        let seconds_since_last_seen = (now - record.last_seen).num_seconds();
        AgentView {
            is_fresh: seconds_since_last_seen <= self.timeout_seconds,
            seconds_since_last_seen,
            record,
        }
    }

    /// Test helper: rewind an agent's last_seen to simulate silence.
    #[cfg(test)]
    pub(crate) fn backdate(&self, id: &str, seconds: i64) {
        let mut agents = self.agents.write().unwrap();
        if let Some(record) = agents.get_mut(id) {
            record.last_seen = record.last_seen - chrono::Duration::seconds(seconds);
        }
    }
}
