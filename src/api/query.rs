use super::AppState;
use crate::hub::ServerMessage;
use crate::registry::{fleet_stats, AgentView, RegistryError};
use crate::storage::{EspNowEntry, HistoryEntry, MeshGraph, PeriodStats};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Create query API router
pub fn create_query_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/bots", get(list_bots))
        .route("/api/bots/stats", get(get_fleet_stats))
        .route("/api/bots/locations", get(get_locations))
        .route("/api/bots/topology", get(get_topology))
        .route("/api/bots/cleanup", delete(cleanup_inactive))
        .route("/api/bots/older-than", delete(cleanup_old))
        .route("/api/bots/:id", get(get_bot))
        .route("/api/bots/:id/name", put(rename_bot))
        .route("/api/esp-now/activity", get(get_esp_now_activity))
        .route("/api/esp-now/graph", get(get_esp_now_graph))
        .route("/api/stats/history", get(get_period_stats))
        .with_state(state)
}

#[derive(Serialize)]
struct BotListResponse {
    bots: Vec<AgentView>,
    count: usize,
}

/// GET /api/bots - Augmented snapshot of all agents, most recent first
async fn list_bots(State(state): State<Arc<AppState>>) -> Json<BotListResponse> {
    let bots = state.registry.snapshot();
    let count = bots.len();
    Json(BotListResponse { bots, count })
}

#[derive(Serialize)]
struct BotDetailResponse {
    bot: AgentView,
    history: Vec<HistoryEntry>,
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// GET /api/bots/:id - One agent plus its persisted report history
async fn get_bot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<BotDetailResponse>, QueryError> {
    let bot = state
        .registry
        .view(&id)
        .ok_or_else(|| QueryError::NotFound(id.clone()))?;

    // History is best-effort: a storage failure degrades to an empty list
    // rather than failing the agent lookup.
    let store = Arc::clone(&state.store);
    let limit = params.limit;
    let history = tokio::task::spawn_blocking(move || store.fetch_history(&id, limit))
        .await
        .map_err(|e| QueryError::Internal(e.to_string()))?
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to fetch history");
            Vec::new()
        });

    Ok(Json(BotDetailResponse { bot, history }))
}

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

#[derive(Serialize)]
struct RenameResponse {
    success: bool,
    message: String,
}

/// PUT /api/bots/:id/name - Update an agent's display name
async fn rename_bot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, QueryError> {
    let name = request.name.trim().to_string();
    state.registry.rename(&id, &name)?;

    state.hub.publish(ServerMessage::BotNameUpdate {
        bot_id: id,
        name: name.clone(),
    });

    Ok(Json(RenameResponse {
        success: true,
        message: format!("Bot renamed to '{}'", name),
    }))
}

/// GET /api/bots/stats - In-memory fleet rollups
async fn get_fleet_stats(State(state): State<Arc<AppState>>) -> Json<crate::registry::FleetStats> {
    Json(fleet_stats(&state.registry.snapshot()))
}

#[derive(Serialize)]
struct LocationInfo {
    bot_id: String,
    location: std::collections::HashMap<String, f64>,
    reported_status: String,
    last_seen: DateTime<Utc>,
    is_fresh: bool,
}

/// GET /api/bots/locations - Agents that have reported a location
async fn get_locations(State(state): State<Arc<AppState>>) -> Json<Vec<LocationInfo>> {
    let locations = state
        .registry
        .snapshot()
        .into_iter()
        .filter_map(|view| {
            let location = view.record.location.clone()?;
            Some(LocationInfo {
                bot_id: view.record.id,
                location,
                reported_status: view.record.reported_status,
                last_seen: view.record.last_seen,
                is_fresh: view.is_fresh,
            })
        })
        .collect();
    Json(locations)
}

#[derive(Serialize)]
struct TopologyNode {
    id: String,
    #[serde(rename = "type")]
    node_type: &'static str,
    label: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    battery_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    radio_signal: Option<i32>,
}

#[derive(Serialize)]
struct TopologyEdge {
    source: String,
    target: String,
    #[serde(rename = "type")]
    edge_type: &'static str,
    active: bool,
}

#[derive(Serialize)]
struct TopologyResponse {
    nodes: Vec<TopologyNode>,
    edges: Vec<TopologyEdge>,
    timestamp: DateTime<Utc>,
}

/// GET /api/bots/topology - Star topology: fixed central node plus one
/// edge per agent tagged by freshness
async fn get_topology(State(state): State<Arc<AppState>>) -> Json<TopologyResponse> {
    let mut nodes = vec![TopologyNode {
        id: "coordinator".to_string(),
        node_type: "coordinator",
        label: "Fleet Coordinator".to_string(),
        status: "active",
        battery_level: None,
        radio_signal: None,
    }];
    let mut edges = Vec::new();

    for view in state.registry.snapshot() {
        let status = if view.is_fresh { "active" } else { "inactive" };
        let label = view
            .record
            .display_name
            .clone()
            .unwrap_or_else(|| view.record.id.clone());

        nodes.push(TopologyNode {
            id: view.record.id.clone(),
            node_type: "bot",
            label,
            status,
            battery_level: view.record.battery_level,
            radio_signal: view.record.radio_signal,
        });
        edges.push(TopologyEdge {
            source: view.record.id,
            target: "coordinator".to_string(),
            edge_type: "wifi",
            active: view.is_fresh,
        });
    }

    Json(TopologyResponse {
        nodes,
        edges,
        timestamp: Utc::now(),
    })
}

#[derive(Deserialize)]
struct CleanupParams {
    #[serde(default = "default_inactive_minutes")]
    max_inactive_minutes: i64,
}

fn default_inactive_minutes() -> i64 {
    5
}

#[derive(Serialize)]
struct CleanupResponse {
    success: bool,
    message: String,
    removed_count: usize,
}

/// DELETE /api/bots/cleanup - Remove agents silent for more than the window
async fn cleanup_inactive(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CleanupParams>,
) -> Json<CleanupResponse> {
    let removed_count = state.registry.remove_inactive(params.max_inactive_minutes);
    info!(removed = removed_count, "Cleaned up inactive agents");

    state
        .hub
        .publish(ServerMessage::BotsCleanedUp { removed_count });

    Json(CleanupResponse {
        success: true,
        message: format!("Removed {} inactive bots", removed_count),
        removed_count,
    })
}

#[derive(Deserialize)]
struct AgeParams {
    #[serde(default = "default_max_age_days")]
    max_age_days: i64,
}

fn default_max_age_days() -> i64 {
    7
}

/// DELETE /api/bots/older-than - Remove agents not seen for days
async fn cleanup_old(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AgeParams>,
) -> Json<CleanupResponse> {
    let removed_count = state.registry.remove_older_than(params.max_age_days);

    state
        .hub
        .publish(ServerMessage::BotsCleanedUp { removed_count });

    Json(CleanupResponse {
        success: true,
        message: format!("Removed {} old bots", removed_count),
        removed_count,
    })
}

#[derive(Deserialize)]
struct ActivityParams {
    #[serde(default = "default_activity_limit")]
    limit: usize,
}

fn default_activity_limit() -> usize {
    100
}

#[derive(Serialize)]
struct ActivityResponse {
    activity: Vec<EspNowEntry>,
    count: usize,
}

/// GET /api/esp-now/activity - Recent mesh traffic from storage
async fn get_esp_now_activity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<ActivityResponse>, QueryError> {
    let store = Arc::clone(&state.store);
    let limit = params.limit;
    let activity = tokio::task::spawn_blocking(move || store.fetch_esp_now(limit))
        .await
        .map_err(|e| QueryError::Internal(e.to_string()))?
        .map_err(|e| QueryError::Internal(e.to_string()))?;

    let count = activity.len();
    Ok(Json(ActivityResponse { activity, count }))
}

/// GET /api/esp-now/graph - Mesh communication graph from persisted traffic
async fn get_esp_now_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<MeshGraph>, QueryError> {
    let store = Arc::clone(&state.store);
    let hours = params.hours;
    let graph = tokio::task::spawn_blocking(move || store.esp_now_graph(hours))
        .await
        .map_err(|e| QueryError::Internal(e.to_string()))?
        .map_err(|e| QueryError::Internal(e.to_string()))?;

    Ok(Json(graph))
}

#[derive(Deserialize)]
struct PeriodParams {
    #[serde(default = "default_period_hours")]
    hours: i64,
}

fn default_period_hours() -> i64 {
    24
}

/// GET /api/stats/history - Aggregates over persisted history
async fn get_period_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<PeriodStats>, QueryError> {
    let store = Arc::clone(&state.store);
    let hours = params.hours;
    let stats = tokio::task::spawn_blocking(move || store.aggregate(hours))
        .await
        .map_err(|e| QueryError::Internal(e.to_string()))?
        .map_err(|e| QueryError::Internal(e.to_string()))?;

    Ok(Json(stats))
}

/// Query error types
#[derive(Debug)]
enum QueryError {
    NotFound(String),
    InvalidArgument(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            QueryError::NotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Bot '{}' not found", id))
            }
            QueryError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
            QueryError::Internal(msg) => {
                error!(error = %msg, "Query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}

impl From<RegistryError> for QueryError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => QueryError::NotFound(id),
            RegistryError::InvalidArgument(msg) => QueryError::InvalidArgument(msg),
        }
    }
}
