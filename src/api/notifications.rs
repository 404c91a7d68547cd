use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::entities::NotificationView;
use crate::error::AppError;
use crate::infrastructure::middleware::Vc;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
}

/// GET /notifications - newest first; marks what it returns as read
async fn list_notifications(
    State(state): State<AppState>,
    vc: Vc,
) -> Result<Json<Vec<NotificationView>>, AppError> {
    Ok(Json(state.notifications.list_and_mark_read(&vc).await?))
}

async fn unread_count(State(state): State<AppState>, vc: Vc) -> Result<Json<Value>, AppError> {
    let count = state.notifications.unread_count(&vc).await?;
    Ok(Json(json!({ "unread_count": count })))
}
