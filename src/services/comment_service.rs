// CommentService - comments on posts; creating one notifies the post's author

use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use super::post_service::post_not_found;
use crate::ent_framework::{HookContext, HookOperation, HookRegistry};
use crate::entities::{Comment, CommentView, EntityType, NewComment};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::viewer::ViewerContext;

#[derive(Clone)]
pub struct CommentService {
    db: Arc<dyn DatabaseInterface>,
    hooks: Arc<HookRegistry>,
}

impl CommentService {
    pub fn new(db: Arc<dyn DatabaseInterface>, hooks: Arc<HookRegistry>) -> Self {
        Self { db, hooks }
    }

    /// Newest first, optionally restricted to one post.
    pub async fn list(&self, post_id: Option<i64>) -> AppResult<Vec<CommentView>> {
        self.db.list_comments(post_id).await
    }

    pub async fn list_for_post(&self, post_id: i64) -> AppResult<Vec<CommentView>> {
        if self.db.get_post(post_id).await?.is_none() {
            return Err(post_not_found(post_id));
        }
        self.db.list_comments(Some(post_id)).await
    }

    pub async fn get(&self, id: i64) -> AppResult<CommentView> {
        self.db
            .get_comment_view(id)
            .await?
            .ok_or_else(|| comment_not_found(id))
    }

    async fn get_comment(&self, id: i64) -> AppResult<Comment> {
        self.db
            .get_comment(id)
            .await?
            .ok_or_else(|| comment_not_found(id))
    }

    #[instrument(skip(self, vc, comment), fields(request_id = %vc.request_id, post_id = comment.post))]
    pub async fn create(&self, vc: &ViewerContext, comment: NewComment) -> AppResult<CommentView> {
        let author = vc.require_user()?;
        let mut ctx = HookContext::new(EntityType::Comment, HookOperation::Create, Some(author.id))
            .with_data(json!({ "post_id": comment.post, "content": comment.content }));
        self.hooks.before(&mut ctx).await?;

        if self.db.get_post(comment.post).await?.is_none() {
            return Err(post_not_found(comment.post));
        }
        let created = self
            .db
            .create_comment(author.id, comment.post, comment.content)
            .await?;

        // notification emission runs here, after the comment is committed
        ctx.entity_id = Some(created.id);
        self.hooks.after(&mut ctx).await;

        info!(comment_id = created.id, author_id = author.id, "Comment created");
        self.get(created.id).await
    }

    #[instrument(skip(self, vc, content), fields(request_id = %vc.request_id))]
    pub async fn update(
        &self,
        vc: &ViewerContext,
        id: i64,
        content: Option<String>,
    ) -> AppResult<CommentView> {
        let comment = self.get_comment(id).await?;
        let editor = vc.require_owner_or_admin(comment.author_id)?;

        if let Some(content) = content {
            let mut ctx =
                HookContext::new(EntityType::Comment, HookOperation::Update, Some(editor.id))
                    .with_entity_id(id)
                    .with_data(json!({ "post_id": comment.post_id, "content": content }));
            self.hooks.before(&mut ctx).await?;
            self.db.update_comment(id, content).await?;
            self.hooks.after(&mut ctx).await;
            info!(comment_id = id, editor_id = editor.id, "Comment updated");
        }
        self.get(id).await
    }

    #[instrument(skip(self, vc), fields(request_id = %vc.request_id))]
    pub async fn delete(&self, vc: &ViewerContext, id: i64) -> AppResult<()> {
        let comment = self.get_comment(id).await?;
        let editor = vc.require_owner_or_admin(comment.author_id)?;

        if !self.db.delete_comment(id).await? {
            return Err(comment_not_found(id));
        }
        let mut ctx = HookContext::new(EntityType::Comment, HookOperation::Delete, Some(editor.id))
            .with_entity_id(id);
        self.hooks.after(&mut ctx).await;

        info!(comment_id = id, editor_id = editor.id, "Comment deleted");
        Ok(())
    }
}

fn comment_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Comment {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NewPost, NotificationTarget, NotificationVerb};
    use crate::services::test_support::Fixture;

    async fn post_by(fixture: &Fixture, author_id: i64) -> i64 {
        fixture
            .db
            .create_post(
                author_id,
                NewPost {
                    title: "A post".into(),
                    content: "body".into(),
                },
            )
            .await
            .unwrap()
            .id
    }

    fn comment(post: i64, content: &str) -> NewComment {
        NewComment {
            post,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_comment_on_own_post_does_not_notify() {
        let fixture = Fixture::new().await;
        let comments = CommentService::new(fixture.db.clone(), fixture.hooks.clone());
        let (alice_user, alice) = fixture.user("alice").await;
        let post_id = post_by(&fixture, alice_user.id).await;

        comments.create(&alice, comment(post_id, "me again")).await.unwrap();
        assert!(fixture.db.list_notifications(alice_user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_on_other_post_notifies_once() {
        let fixture = Fixture::new().await;
        let comments = CommentService::new(fixture.db.clone(), fixture.hooks.clone());
        let (alice_user, _) = fixture.user("alice").await;
        let (bob_user, bob) = fixture.user("bob").await;
        let post_id = post_by(&fixture, alice_user.id).await;

        let created = comments.create(&bob, comment(post_id, "nice")).await.unwrap();
        assert_eq!(created.author_username, "bob");

        let notifications = fixture.db.list_notifications(alice_user.id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        let notification = &notifications[0].notification;
        assert_eq!(notification.actor_id, bob_user.id);
        assert_eq!(notification.verb, NotificationVerb::Commented);
        assert_eq!(notification.target, NotificationTarget::Comment(created.comment.id));
        assert!(fixture.db.list_notifications(bob_user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_validation_and_missing_post() {
        let fixture = Fixture::new().await;
        let comments = CommentService::new(fixture.db.clone(), fixture.hooks.clone());
        let (alice_user, alice) = fixture.user("alice").await;
        let post_id = post_by(&fixture, alice_user.id).await;

        assert!(matches!(
            comments.create(&alice, comment(post_id, "  ")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            comments.create(&alice, comment(4242, "hello")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            comments.list_for_post(4242).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_permissions() {
        let fixture = Fixture::new().await;
        let comments = CommentService::new(fixture.db.clone(), fixture.hooks.clone());
        let (alice_user, alice) = fixture.user("alice").await;
        let (_, bob) = fixture.user("bob").await;
        let post_id = post_by(&fixture, alice_user.id).await;
        let created = comments.create(&alice, comment(post_id, "first")).await.unwrap();
        let id = created.comment.id;

        assert!(matches!(
            comments.update(&bob, id, Some("edited".into())).await,
            Err(AppError::Forbidden(_))
        ));
        let updated = comments.update(&alice, id, Some("edited".into())).await.unwrap();
        assert_eq!(updated.comment.content, "edited");

        assert!(matches!(comments.delete(&bob, id).await, Err(AppError::Forbidden(_))));
        comments.delete(&alice, id).await.unwrap();
        assert!(comments.list(Some(post_id)).await.unwrap().is_empty());
    }
}
