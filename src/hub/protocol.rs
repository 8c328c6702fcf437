use crate::registry::AgentView;
use crate::report::EspNowReport;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Server → observer messages, newline-delimited JSON frames tagged by "type".
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One-shot snapshot sent to a sink immediately on subscribe
    InitialData { bots: Vec<AgentView> },

    /// Full merged record after an accepted report or a monitor transition
    BotUpdate {
        bot_id: String,
        data: AgentView,
        timestamp: DateTime<Utc>,
    },

    /// Relayed mesh traffic
    EspNowActivity {
        data: EspNowReport,
        timestamp: DateTime<Utc>,
    },

    /// Periodic sink liveness probe, independent of agent activity
    Heartbeat { timestamp: DateTime<Utc> },

    /// Display name changed
    BotNameUpdate { bot_id: String, name: String },

    /// Pruning operation completed
    BotsCleanedUp { removed_count: usize },
}

impl ServerMessage {
    pub fn initial_data(bots: Vec<AgentView>) -> Self {
        Self::InitialData { bots }
    }

    pub fn bot_update(view: AgentView) -> Self {
        Self::BotUpdate {
            bot_id: view.record.id.clone(),
            data: view,
            timestamp: Utc::now(),
        }
    }

    pub fn esp_now_activity(report: EspNowReport) -> Self {
        Self::EspNowActivity {
            data: report,
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now(),
        }
    }
}
