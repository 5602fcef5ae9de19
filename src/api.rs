use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{Path, Query, State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    clients::{database::NotificationStore, health::HealthChecker},
    hub::{
        HubHandle,
        connection::{ConnectionSettings, serve_socket},
    },
    models::{health::HealthStatus, notification::Notification, response::ApiResponse},
};

pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub hub: HubHandle,
    pub health_checker: HealthChecker,
    pub connection_settings: ConnectionSettings,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(realtime_upgrade))
        .route(
            "/notifications/{id}",
            get(list_notifications).put(mark_as_read),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(state: Arc<AppState>, port: u16) -> Result<(), Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Notification server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn realtime_upgrade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RealtimeParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match params.user_id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => id,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(
                    "userId required".to_string(),
                    "Realtime connection rejected".to_string(),
                )),
            )
                .into_response();
        }
    };

    let hub = state.hub.clone();
    let settings = state.connection_settings.clone();

    ws.on_upgrade(move |socket| serve_socket(socket, user_id, hub, settings))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<ApiResponse<Vec<Notification>>>) {
    match state.store.find_by_recipient(&user_id).await {
        Ok(notifications) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                notifications,
                "Notifications retrieved".to_string(),
            )),
        ),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Failed to fetch notifications");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(
                    e.to_string(),
                    "Failed to fetch notifications".to_string(),
                )),
            )
        }
    }
}

async fn mark_as_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse<Uuid>>) {
    let Ok(notification_id) = Uuid::parse_str(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(
                format!("Invalid notification id: {}", id),
                "Invalid ID format".to_string(),
            )),
        );
    };

    match state.store.mark_as_read(notification_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                notification_id,
                "Notification marked as read".to_string(),
            )),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(
                format!("Notification {} not found", notification_id),
                "Notification not found".to_string(),
            )),
        ),
        Err(e) => {
            warn!(notification_id = %notification_id, error = %e, "Failed to mark notification as read");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(
                    e.to_string(),
                    "Failed to mark notification as read".to_string(),
                )),
            )
        }
    }
}
