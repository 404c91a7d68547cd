use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use super::{detail, ApiJson, ApiPath};
use crate::app_state::AppState;
use crate::entities::{NewUser, ProfileChanges, User, UserProfile};
use crate::error::AppError;
use crate::infrastructure::middleware::Vc;
use crate::services::{AuthResponse, LoginRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts/register", post(register))
        .route("/accounts/login", post(login))
        .route("/accounts/logout", post(logout))
        .route("/accounts/profile", get(own_profile).patch(update_profile))
        .route("/accounts/users/{id}", get(user_profile))
        .route("/accounts/users/{id}/followers", get(followers))
        .route("/accounts/users/{id}/following", get(following))
        .route("/accounts/follow/{user_id}", post(follow))
        .route("/accounts/unfollow/{user_id}", post(unfollow))
}

/// POST /accounts/register
async fn register(
    State(state): State<AppState>,
    ApiJson(new_user): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let response = state.accounts.register(new_user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /accounts/login
async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(state.accounts.login(request).await?))
}

/// POST /accounts/logout
async fn logout(State(state): State<AppState>, vc: Vc) -> Result<Json<Value>, AppError> {
    state.accounts.logout(&vc).await?;
    Ok(detail("Successfully logged out."))
}

async fn own_profile(State(state): State<AppState>, vc: Vc) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.accounts.own_profile(&vc).await?))
}

/// PATCH /accounts/profile
async fn update_profile(
    State(state): State<AppState>,
    vc: Vc,
    ApiJson(changes): ApiJson<ProfileChanges>,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.accounts.update_profile(&vc, changes).await?))
}

async fn user_profile(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.accounts.profile(id).await?))
}

async fn followers(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.accounts.followers(id).await?))
}

async fn following(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.accounts.following(id).await?))
}

/// POST /accounts/follow/{user_id}
async fn follow(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let follow = state.follows.follow(&vc, user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "detail": format!("You are now following user {}.", user_id),
            "follow": follow,
        })),
    ))
}

/// POST /accounts/unfollow/{user_id}
async fn unfollow(
    State(state): State<AppState>,
    vc: Vc,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<Json<Value>, AppError> {
    state.follows.unfollow(&vc, user_id).await?;
    Ok(detail(format!("You have unfollowed user {}.", user_id)))
}
