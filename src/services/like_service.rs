// LikeService - at most one like per (user, post) pair

use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use super::post_service::post_not_found;
use crate::ent_framework::{HookContext, HookOperation, HookRegistry};
use crate::entities::{EntityType, Like};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::viewer::ViewerContext;

#[derive(Clone)]
pub struct LikeService {
    db: Arc<dyn DatabaseInterface>,
    hooks: Arc<HookRegistry>,
}

impl LikeService {
    pub fn new(db: Arc<dyn DatabaseInterface>, hooks: Arc<HookRegistry>) -> Self {
        Self { db, hooks }
    }

    /// Like a post. A second like by the same user is a conflict and changes nothing.
    #[instrument(skip(self, vc), fields(request_id = %vc.request_id))]
    pub async fn like(&self, vc: &ViewerContext, post_id: i64) -> AppResult<Like> {
        let user = vc.require_user()?;
        if self.db.get_post(post_id).await?.is_none() {
            return Err(post_not_found(post_id));
        }

        let like = self
            .db
            .create_like(user.id, post_id)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => {
                    AppError::Conflict("You have already liked this post.".to_string())
                }
                other => other,
            })?;

        let mut ctx = HookContext::new(EntityType::Like, HookOperation::Create, Some(user.id))
            .with_entity_id(like.id)
            .with_data(json!({ "post_id": post_id }));
        self.hooks.after(&mut ctx).await;

        info!(post_id, user_id = user.id, "Post liked");
        Ok(like)
    }

    #[instrument(skip(self, vc), fields(request_id = %vc.request_id))]
    pub async fn unlike(&self, vc: &ViewerContext, post_id: i64) -> AppResult<()> {
        let user = vc.require_user()?;
        if self.db.get_post(post_id).await?.is_none() {
            return Err(post_not_found(post_id));
        }
        if !self.db.delete_like(user.id, post_id).await? {
            return Err(AppError::NotFound(
                "You have not liked this post.".to_string(),
            ));
        }

        let mut ctx = HookContext::new(EntityType::Like, HookOperation::Delete, Some(user.id))
            .with_data(json!({ "post_id": post_id }));
        self.hooks.after(&mut ctx).await;

        info!(post_id, user_id = user.id, "Post unliked");
        Ok(())
    }
}
