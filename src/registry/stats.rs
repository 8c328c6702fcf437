use super::AgentView;
use serde::Serialize;

/// Fleet-wide rollups computed from a registry snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    /// Percentage of agents that are fresh; 0 for an empty fleet
    pub activity_rate: f64,
    /// Mean over agents that report a battery level; absent when none do
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_battery: Option<f64>,
    /// Mean over agents that report a signal level; absent when none do
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_radio_signal: Option<f64>,
    /// Active agents with battery strictly below 20
    pub low_battery_count: usize,
}

/// Pure aggregation over a snapshot. Partitions by derived freshness,
/// never divides by zero, and yields absent (not zero) averages when no
/// agent supplies the underlying field.
pub fn fleet_stats(snapshot: &[AgentView]) -> FleetStats {
    let total = snapshot.len();
    let active = snapshot.iter().filter(|v| v.is_fresh).count();
    let inactive = total - active;

    let batteries: Vec<f64> = snapshot
        .iter()
        .filter(|v| v.is_fresh)
        .filter_map(|v| v.record.battery_level)
        .collect();
    let signals: Vec<i32> = snapshot
        .iter()
        .filter(|v| v.is_fresh)
        .filter_map(|v| v.record.radio_signal)
        .collect();

    let activity_rate = if total > 0 {
        active as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let average_battery = if batteries.is_empty() {
        None
    } else {
        Some(batteries.iter().sum::<f64>() / batteries.len() as f64)
    };

    let average_radio_signal = if signals.is_empty() {
        None
    } else {
        Some(signals.iter().map(|&s| s as f64).sum::<f64>() / signals.len() as f64)
    };

    let low_battery_count = batteries.iter().filter(|&&level| level < 20.0).count();

    FleetStats {
        total,
        active,
        inactive,
        activity_rate,
        average_battery,
        average_radio_signal,
        low_battery_count,
    }
}
