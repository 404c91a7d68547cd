// HTTP API - JSON endpoints over the service layer

mod accounts;
mod comments;
mod notifications;
mod posts;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode, Uri},
    middleware,
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app_state::AppState;
use crate::error::AppError;
use crate::infrastructure::middleware::viewer_context_middleware;
use crate::infrastructure::monitoring::{check_health, HealthStatus};

/// Build the complete application router.
///
/// Everything under `/api` runs behind the ViewerContext middleware, so a bad
/// token is rejected before any handler runs. `/health` is always reachable.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(accounts::routes())
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(notifications::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            viewer_context_middleware::<AppState>,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// GET /health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let health = check_health(state.db.as_ref()).await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}

/// `Json` whose rejections use the API's error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Path` whose rejections use the API's error body.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections use the API's error body.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `{"detail": ...}` acknowledgement body.
fn detail(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "detail": message.into() }))
}
