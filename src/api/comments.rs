use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::{ApiJson, ApiPath, ApiQuery};
use crate::app_state::AppState;
use crate::entities::{CommentView, NewComment};
use crate::error::AppError;
use crate::infrastructure::middleware::Vc;

#[derive(Debug, Deserialize)]
struct CommentQuery {
    post: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CommentChanges {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentReplacement {
    content: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/comments", get(list_comments).post(create_comment))
        .route(
            "/comments/{id}",
            get(get_comment)
                .patch(update_comment)
                .put(replace_comment)
                .delete(delete_comment),
        )
}

/// GET /comments?post=
async fn list_comments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CommentQuery>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    Ok(Json(state.comments.list(query.post).await?))
}

async fn create_comment(
    State(state): State<AppState>,
    vc: Vc,
    ApiJson(comment): ApiJson<NewComment>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let view = state.comments.create(&vc, comment).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_comment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<CommentView>, AppError> {
    Ok(Json(state.comments.get(id).await?))
}

async fn update_comment(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<CommentChanges>,
) -> Result<Json<CommentView>, AppError> {
    Ok(Json(state.comments.update(&vc, id, changes.content).await?))
}

async fn replace_comment(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
    ApiJson(replacement): ApiJson<CommentReplacement>,
) -> Result<Json<CommentView>, AppError> {
    Ok(Json(
        state
            .comments
            .update(&vc, id, Some(replacement.content))
            .await?,
    ))
}

async fn delete_comment(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.comments.delete(&vc, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
