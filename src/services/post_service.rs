// PostService - post CRUD, search and the following feed

use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::ent_framework::{HookContext, HookOperation, HookRegistry};
use crate::entities::{EntityType, NewPost, Post, PostChanges, PostFilter, PostView};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::viewer::ViewerContext;

#[derive(Clone)]
pub struct PostService {
    db: Arc<dyn DatabaseInterface>,
    hooks: Arc<HookRegistry>,
}

impl PostService {
    pub fn new(db: Arc<dyn DatabaseInterface>, hooks: Arc<HookRegistry>) -> Self {
        Self { db, hooks }
    }

    pub async fn list(&self, filter: PostFilter) -> AppResult<Vec<PostView>> {
        self.db.list_posts(filter).await
    }

    pub async fn get(&self, id: i64) -> AppResult<PostView> {
        self.db
            .get_post_view(id)
            .await?
            .ok_or_else(|| post_not_found(id))
    }

    async fn get_post(&self, id: i64) -> AppResult<Post> {
        self.db.get_post(id).await?.ok_or_else(|| post_not_found(id))
    }

    #[instrument(skip(self, vc, post), fields(request_id = %vc.request_id))]
    pub async fn create(&self, vc: &ViewerContext, post: NewPost) -> AppResult<PostView> {
        let author = vc.require_user()?;
        let mut ctx = HookContext::new(EntityType::Post, HookOperation::Create, Some(author.id))
            .with_data(json!({ "title": post.title, "content": post.content }));
        self.hooks.before(&mut ctx).await?;

        let created = self.db.create_post(author.id, post).await?;
        ctx.entity_id = Some(created.id);
        self.hooks.after(&mut ctx).await;

        info!(post_id = created.id, author_id = author.id, "Post created");
        self.get(created.id).await
    }

    #[instrument(skip(self, vc, changes), fields(request_id = %vc.request_id))]
    pub async fn update(
        &self,
        vc: &ViewerContext,
        id: i64,
        changes: PostChanges,
    ) -> AppResult<PostView> {
        let post = self.get_post(id).await?;
        let editor = vc.require_owner_or_admin(post.author_id)?;

        if !changes.is_empty() {
            let mut ctx = HookContext::new(EntityType::Post, HookOperation::Update, Some(editor.id))
                .with_entity_id(id)
                .with_data(json!({ "title": changes.title, "content": changes.content }));
            self.hooks.before(&mut ctx).await?;
            self.db.update_post(id, changes).await?;
            self.hooks.after(&mut ctx).await;
            info!(post_id = id, editor_id = editor.id, "Post updated");
        }
        self.get(id).await
    }

    /// Removes the post together with its comments, likes and the notifications pointing at them.
    #[instrument(skip(self, vc), fields(request_id = %vc.request_id))]
    pub async fn delete(&self, vc: &ViewerContext, id: i64) -> AppResult<()> {
        let post = self.get_post(id).await?;
        let editor = vc.require_owner_or_admin(post.author_id)?;

        if !self.db.delete_post(id).await? {
            return Err(post_not_found(id));
        }
        let mut ctx = HookContext::new(EntityType::Post, HookOperation::Delete, Some(editor.id))
            .with_entity_id(id);
        self.hooks.after(&mut ctx).await;

        info!(post_id = id, editor_id = editor.id, "Post deleted");
        Ok(())
    }

    /// Posts by the users the viewer follows, newest first.
    pub async fn feed(&self, vc: &ViewerContext) -> AppResult<Vec<PostView>> {
        let user = vc.require_user()?;
        self.db.feed_posts(user.id).await
    }
}

pub(crate) fn post_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Post {} not found", id))
}
