use super::AppState;
use crate::hub::ServerMessage;
use crate::registry::RegistryError;
use crate::report::{EspNowReport, StatusReport};
use crate::storage::{enqueue, StoreJob};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Success response for report ingestion
#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    message: &'static str,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create API router with ingestion endpoints
pub fn create_ingestion_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/bot/status", post(receive_status))
        .route("/api/esp-now/message", post(receive_esp_now))
        .with_state(state)
}

/// POST /api/bot/status - Receive a status report from an agent
///
/// The in-memory merge is the source of truth for the response; the
/// persistence write is queued fire-and-forget and its failure can
/// neither block nor roll back the update.
async fn receive_status(
    State(state): State<Arc<AppState>>,
    Json(report): Json<StatusReport>,
) -> Result<Json<IngestResponse>, AppError> {
    report
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    info!(bot_id = %report.id, status = %report.reported_status, "Received status report");

    let view = state.registry.upsert(&report)?;

    enqueue(
        &state.store_tx,
        StoreJob::Status {
            report,
            timestamp: Utc::now(),
        },
    );

    state.hub.publish(ServerMessage::bot_update(view));

    Ok(Json(IngestResponse {
        status: "success",
        message: "Status received",
    }))
}

/// POST /api/esp-now/message - Receive a relayed mesh message
async fn receive_esp_now(
    State(state): State<Arc<AppState>>,
    Json(report): Json<EspNowReport>,
) -> Result<Json<IngestResponse>, AppError> {
    report
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    debug!(
        sender = %report.sender_mac,
        receiver = %report.receiver_mac,
        "Received esp-now message"
    );

    enqueue(
        &state.store_tx,
        StoreJob::EspNow {
            report: report.clone(),
            timestamp: Utc::now(),
        },
    );

    state.hub.publish(ServerMessage::esp_now_activity(report));

    Ok(Json(IngestResponse {
        status: "success",
        message: "Message logged",
    }))
}

/// Application error types
enum AppError {
    Validation(String),
    InvalidArgument(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        // NotFound cannot surface from upsert; treat every registry
        // rejection on this path as a caller error.
        AppError::InvalidArgument(e.to_string())
    }
}
