// HTTP and WebSocket APIs

mod ingestion;
pub mod query;
pub mod websocket;

pub use ingestion::create_ingestion_router;
pub use query::create_query_router;
pub use websocket::create_ws_router;

use crate::hub::BroadcastHub;
use crate::registry::Registry;
use crate::storage::{StatusStore, StoreJob};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub hub: Arc<BroadcastHub>,
    pub store: Arc<StatusStore>,
    /// Fire-and-forget persistence queue
    pub store_tx: mpsc::Sender<StoreJob>,
}
