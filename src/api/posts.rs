use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use super::{detail, ApiJson, ApiPath, ApiQuery};
use crate::app_state::AppState;
use crate::entities::{CommentView, NewPost, PostChanges, PostFilter, PostView};
use crate::error::AppError;
use crate::infrastructure::middleware::Vc;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post)
                .patch(update_post)
                .put(replace_post)
                .delete(delete_post),
        )
        .route("/posts/{id}/like", post(like_post))
        .route("/posts/{id}/unlike", post(unlike_post))
        .route("/posts/{id}/comments", get(post_comments))
        .route("/feed", get(feed))
}

/// GET /posts?search=&author_id=
async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<PostFilter>,
) -> Result<Json<Vec<PostView>>, AppError> {
    Ok(Json(state.posts.list(filter).await?))
}

async fn create_post(
    State(state): State<AppState>,
    vc: Vc,
    ApiJson(post): ApiJson<NewPost>,
) -> Result<(StatusCode, Json<PostView>), AppError> {
    let view = state.posts.create(&vc, post).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_post(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.get(id).await?))
}

/// PATCH /posts/{id} - partial update
async fn update_post(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<PostChanges>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(state.posts.update(&vc, id, changes).await?))
}

/// PUT /posts/{id} - both fields required
async fn replace_post(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
    ApiJson(post): ApiJson<NewPost>,
) -> Result<Json<PostView>, AppError> {
    let changes = PostChanges {
        title: Some(post.title),
        content: Some(post.content),
    };
    Ok(Json(state.posts.update(&vc, id, changes).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.posts.delete(&vc, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/{id}/like
async fn like_post(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.likes.like(&vc, id).await?;
    Ok((StatusCode::CREATED, detail("Post liked.")))
}

/// POST /posts/{id}/unlike
async fn unlike_post(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, AppError> {
    state.likes.unlike(&vc, id).await?;
    Ok(detail("Post unliked."))
}

async fn post_comments(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    Ok(Json(state.comments.list_for_post(id).await?))
}

/// GET /feed - posts from followed users
async fn feed(State(state): State<AppState>, vc: Vc) -> Result<Json<Vec<PostView>>, AppError> {
    Ok(Json(state.posts.feed(&vc).await?))
}
