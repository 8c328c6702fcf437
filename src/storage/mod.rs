//! Report history persistence using SQLite.
//!
//! The store is an external collaborator of the core: it is fed
//! fire-and-forget through the writer queue, and its failures are logged,
//! never surfaced to the ingestion caller. No transaction spans the
//! in-memory registry and this store.

use crate::report::{EspNowReport, StatusReport};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

mod writer;

pub use writer::{enqueue, run_writer, StoreJob};

/// One persisted status report.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub reported_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radio_signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

/// One persisted mesh message.
#[derive(Debug, Clone, Serialize)]
pub struct EspNowEntry {
    pub timestamp: DateTime<Utc>,
    pub sender_mac: String,
    pub receiver_mac: String,
    pub message_type: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
}

/// Aggregates over a lookback window, computed from persisted history.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodStats {
    pub period_hours: i64,
    pub agents_seen: usize,
    pub status_reports: usize,
    pub esp_now_messages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_battery: Option<f64>,
}

/// One participant in the mesh graph, identified by MAC address.
#[derive(Debug, Clone, Serialize)]
pub struct MeshNode {
    pub id: String,
    pub sent_count: usize,
    pub received_count: usize,
    pub total_activity: usize,
}

/// One directed sender→receiver link, aggregated over the window.
#[derive(Debug, Clone, Serialize)]
pub struct MeshEdge {
    pub source: String,
    pub target: String,
    pub message_count: usize,
    pub last_message: DateTime<Utc>,
}

/// Mesh communication graph derived from persisted esp-now history.
#[derive(Debug, Clone, Serialize)]
pub struct MeshGraph {
    pub nodes: Vec<MeshNode>,
    pub edges: Vec<MeshEdge>,
    pub period_hours: i64,
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Serialize)]
pub struct PruneSummary {
    pub status_rows: usize,
    pub esp_now_rows: usize,
}

/// Persists report history in SQLite.
///
/// The connection is wrapped in a Mutex; callers on the async side go
/// through `spawn_blocking` (see the writer task and the query handlers).
pub struct StatusStore {
    conn: Mutex<Connection>,
}

impl StatusStore {
    /// Opens (or creates) the database and ensures the schema exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(&db_path).with_context(|| {
            format!("Failed to open status DB at {}", db_path.as_ref().display())
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory DB")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS status_history (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id          TEXT NOT NULL,
                timestamp       TEXT NOT NULL,
                reported_status TEXT NOT NULL,
                battery_level   REAL,
                radio_signal    INTEGER,
                location        TEXT,
                sensor_payload  TEXT,
                uptime_seconds  INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_status_bot_id ON status_history (bot_id);
            CREATE INDEX IF NOT EXISTS idx_status_timestamp ON status_history (timestamp);

            CREATE TABLE IF NOT EXISTS esp_now_messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp    TEXT NOT NULL,
                sender_mac   TEXT NOT NULL,
                receiver_mac TEXT NOT NULL,
                message_type TEXT NOT NULL,
                payload      TEXT NOT NULL,
                rssi         INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_esp_now_timestamp ON esp_now_messages (timestamp);",
        )
        .context("Failed to create status tables")?;
        Ok(())
    }

    /// Appends one status report to history.
    pub fn store_status(&self, report: &StatusReport, timestamp: DateTime<Utc>) -> Result<()> {
        let location = report
            .location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize location")?;
        let sensor_payload = report
            .sensor_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize sensor payload")?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO status_history
                (bot_id, timestamp, reported_status, battery_level, radio_signal,
                 location, sensor_payload, uptime_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.id,
                timestamp.to_rfc3339(),
                report.reported_status,
                report.battery_level,
                report.radio_signal,
                location,
                sensor_payload,
                report.uptime_seconds,
            ],
        )
        .context("Failed to insert status row")?;
        Ok(())
    }

    /// Appends one mesh message.
    pub fn store_esp_now(&self, report: &EspNowReport, timestamp: DateTime<Utc>) -> Result<()> {
        let payload =
            serde_json::to_string(&report.payload).context("Failed to serialize payload")?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO esp_now_messages
                (timestamp, sender_mac, receiver_mac, message_type, payload, rssi)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                timestamp.to_rfc3339(),
                report.sender_mac,
                report.receiver_mac,
                report.message_type,
                payload,
                report.rssi,
            ],
        )
        .context("Failed to insert esp-now row")?;
        Ok(())
    }

    /// Recent history for one agent, newest first.
    pub fn fetch_history(&self, bot_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, reported_status, battery_level, radio_signal,
                        location, sensor_payload, uptime_seconds
                 FROM status_history
                 WHERE bot_id = ?1
                 ORDER BY timestamp DESC
                 LIMIT ?2",
            )
            .context("Failed to prepare history query")?;

        let rows = stmt
            .query_map(params![bot_id, limit], |row| {
                let timestamp: String = row.get(0)?;
                let reported_status: String = row.get(1)?;
                let battery_level: Option<f64> = row.get(2)?;
                let radio_signal: Option<i32> = row.get(3)?;
                let location: Option<String> = row.get(4)?;
                let sensor_payload: Option<String> = row.get(5)?;
                let uptime_seconds: Option<u64> = row.get(6)?;
                Ok((
                    timestamp,
                    reported_status,
                    battery_level,
                    radio_signal,
                    location,
                    sensor_payload,
                    uptime_seconds,
                ))
            })
            .context("Failed to query history")?;

        let mut entries = Vec::new();
        for row in rows {
            let (ts, status, battery, signal, location, sensor, uptime) =
                row.context("Failed to read history row")?;
            entries.push(HistoryEntry {
                timestamp: parse_timestamp(&ts)?,
                reported_status: status,
                battery_level: battery,
                radio_signal: signal,
                location: parse_json_column(location)?,
                sensor_payload: parse_json_column(sensor)?,
                uptime_seconds: uptime,
            });
        }
        Ok(entries)
    }

    /// Recent mesh messages, newest first.
    pub fn fetch_esp_now(&self, limit: usize) -> Result<Vec<EspNowEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, sender_mac, receiver_mac, message_type, payload, rssi
                 FROM esp_now_messages
                 ORDER BY timestamp DESC
                 LIMIT ?1",
            )
            .context("Failed to prepare esp-now query")?;

        let rows = stmt
            .query_map(params![limit], |row| {
                let timestamp: String = row.get(0)?;
                let sender_mac: String = row.get(1)?;
                let receiver_mac: String = row.get(2)?;
                let message_type: String = row.get(3)?;
                let payload: String = row.get(4)?;
                let rssi: Option<i32> = row.get(5)?;
                Ok((timestamp, sender_mac, receiver_mac, message_type, payload, rssi))
            })
            .context("Failed to query esp-now messages")?;

        let mut entries = Vec::new();
        for row in rows {
            let (ts, sender, receiver, kind, payload, rssi) =
                row.context("Failed to read esp-now row")?;
            entries.push(EspNowEntry {
                timestamp: parse_timestamp(&ts)?,
                sender_mac: sender,
                receiver_mac: receiver,
                message_type: kind,
                payload: serde_json::from_str(&payload)
                    .context("Failed to parse stored payload")?,
                rssi,
            });
        }
        Ok(entries)
    }

    /// Aggregates over the last `hours` of persisted history.
    pub fn aggregate(&self, hours: i64) -> Result<PeriodStats> {
        let cutoff = (Utc::now() - Duration::hours(hours)).to_rfc3339();
        let conn = self.conn.lock().unwrap();

        let agents_seen: usize = conn
            .query_row(
                "SELECT COUNT(DISTINCT bot_id) FROM status_history WHERE timestamp > ?1",
                params![cutoff],
                |row| row.get(0),
            )
            .context("Failed to count agents")?;

        let status_reports: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM status_history WHERE timestamp > ?1",
                params![cutoff],
                |row| row.get(0),
            )
            .context("Failed to count status reports")?;

        let esp_now_messages: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM esp_now_messages WHERE timestamp > ?1",
                params![cutoff],
                |row| row.get(0),
            )
            .context("Failed to count esp-now messages")?;

        let average_battery: Option<f64> = conn
            .query_row(
                "SELECT AVG(battery_level) FROM status_history
                 WHERE timestamp > ?1 AND battery_level IS NOT NULL",
                params![cutoff],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to average battery")?
            .flatten();

        Ok(PeriodStats {
            period_hours: hours,
            agents_seen,
            status_reports,
            esp_now_messages,
            average_battery,
        })
    }

    /// Mesh graph over the last `hours` of esp-now traffic: one node per
    /// MAC address seen, one edge per sender→receiver pair, busiest first.
    pub fn esp_now_graph(&self, hours: i64) -> Result<MeshGraph> {
        let cutoff = (Utc::now() - Duration::hours(hours)).to_rfc3339();
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT sender_mac, receiver_mac, COUNT(*), MAX(timestamp)
                 FROM esp_now_messages
                 WHERE timestamp > ?1
                 GROUP BY sender_mac, receiver_mac
                 ORDER BY COUNT(*) DESC",
            )
            .context("Failed to prepare mesh graph query")?;

        let rows = stmt
            .query_map(params![cutoff], |row| {
                let source: String = row.get(0)?;
                let target: String = row.get(1)?;
                let message_count: usize = row.get(2)?;
                let last_message: String = row.get(3)?;
                Ok((source, target, message_count, last_message))
            })
            .context("Failed to query mesh graph")?;

        let mut edges = Vec::new();
        let mut sent: HashMap<String, usize> = HashMap::new();
        let mut received: HashMap<String, usize> = HashMap::new();
        for row in rows {
            let (source, target, message_count, last_message) =
                row.context("Failed to read mesh graph row")?;
            *sent.entry(source.clone()).or_default() += message_count;
            *received.entry(target.clone()).or_default() += message_count;
            edges.push(MeshEdge {
                source,
                target,
                message_count,
                last_message: parse_timestamp(&last_message)?,
            });
        }

        let macs: std::collections::BTreeSet<String> =
            sent.keys().chain(received.keys()).cloned().collect();
        let mut nodes: Vec<MeshNode> = macs
            .into_iter()
            .map(|mac| {
                let sent_count = sent.get(&mac).copied().unwrap_or(0);
                let received_count = received.get(&mac).copied().unwrap_or(0);
                MeshNode {
                    id: mac,
                    sent_count,
                    received_count,
                    total_activity: sent_count + received_count,
                }
            })
            .collect();
        nodes.sort_by(|a, b| b.total_activity.cmp(&a.total_activity).then(a.id.cmp(&b.id)));

        Ok(MeshGraph {
            nodes,
            edges,
            period_hours: hours,
        })
    }

    /// Deletes all rows older than the cutoff. Returns how many went.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<PruneSummary> {
        let cutoff = cutoff.to_rfc3339();
        let conn = self.conn.lock().unwrap();

        let status_rows = conn
            .execute(
                "DELETE FROM status_history WHERE timestamp < ?1",
                params![cutoff],
            )
            .context("Failed to prune status history")?;
        let esp_now_rows = conn
            .execute(
                "DELETE FROM esp_now_messages WHERE timestamp < ?1",
                params![cutoff],
            )
            .context("Failed to prune esp-now messages")?;

        Ok(PruneSummary {
            status_rows,
            esp_now_rows,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Bad stored timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_json_column(raw: Option<String>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(&s).context("Failed to parse stored JSON column"))
        .transpose()
}
