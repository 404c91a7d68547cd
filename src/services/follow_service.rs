// FollowService - directed follow edges between users

use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::ent_framework::{HookContext, HookOperation, HookRegistry};
use crate::entities::{EntityType, Follow};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::viewer::ViewerContext;

#[derive(Clone)]
pub struct FollowService {
    db: Arc<dyn DatabaseInterface>,
    hooks: Arc<HookRegistry>,
}

impl FollowService {
    pub fn new(db: Arc<dyn DatabaseInterface>, hooks: Arc<HookRegistry>) -> Self {
        Self { db, hooks }
    }

    #[instrument(skip(self, vc), fields(request_id = %vc.request_id))]
    pub async fn follow(&self, vc: &ViewerContext, followee_id: i64) -> AppResult<Follow> {
        let follower = vc.require_user()?;
        if follower.id == followee_id {
            return Err(AppError::InvalidOperation(
                "You cannot follow yourself.".to_string(),
            ));
        }
        let followee = self
            .db
            .get_user(followee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", followee_id)))?;
        if self.db.follow_exists(follower.id, followee.id).await? {
            return Err(already_following(&followee.username));
        }

        // the store's primary key still catches a concurrent duplicate
        let follow = self
            .db
            .create_follow(follower.id, followee.id)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => already_following(&followee.username),
                other => other,
            })?;

        let mut ctx = HookContext::new(EntityType::Follow, HookOperation::Create, Some(follower.id))
            .with_data(json!({ "followee_id": followee.id }));
        self.hooks.after(&mut ctx).await;

        info!(follower_id = follower.id, followee_id, "User followed");
        Ok(follow)
    }

    #[instrument(skip(self, vc), fields(request_id = %vc.request_id))]
    pub async fn unfollow(&self, vc: &ViewerContext, followee_id: i64) -> AppResult<()> {
        let follower = vc.require_user()?;
        if !self.db.delete_follow(follower.id, followee_id).await? {
            return Err(AppError::NotFound(
                "You are not following this user.".to_string(),
            ));
        }

        let mut ctx = HookContext::new(EntityType::Follow, HookOperation::Delete, Some(follower.id))
            .with_data(json!({ "followee_id": followee_id }));
        self.hooks.after(&mut ctx).await;

        info!(follower_id = follower.id, followee_id, "User unfollowed");
        Ok(())
    }
}

fn already_following(username: &str) -> AppError {
    AppError::Conflict(format!("You are already following {}.", username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NotificationTarget, NotificationVerb};
    use crate::services::test_support::Fixture;

    #[tokio::test]
    async fn test_follow_rules() {
        let fixture = Fixture::new().await;
        let follows = FollowService::new(fixture.db.clone(), fixture.hooks.clone());
        let (alice_user, alice) = fixture.user("alice").await;
        let (bob_user, bob) = fixture.user("bob").await;

        assert!(matches!(
            follows.follow(&alice, alice_user.id).await,
            Err(AppError::InvalidOperation(_))
        ));
        assert!(matches!(
            follows.follow(&alice, 9999).await,
            Err(AppError::NotFound(_))
        ));

        follows.follow(&bob, alice_user.id).await.unwrap();
        assert!(matches!(
            follows.follow(&bob, alice_user.id).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(fixture.db.count_followers(alice_user.id).await.unwrap(), 1);
        assert_eq!(fixture.db.count_following(bob_user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_follow_notifies_followee_with_actor_target() {
        let fixture = Fixture::new().await;
        let follows = FollowService::new(fixture.db.clone(), fixture.hooks.clone());
        let (alice_user, _) = fixture.user("alice").await;
        let (bob_user, bob) = fixture.user("bob").await;

        follows.follow(&bob, alice_user.id).await.unwrap();
        let notifications = fixture.db.list_notifications(alice_user.id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification.verb, NotificationVerb::Followed);
        assert_eq!(
            notifications[0].notification.target,
            NotificationTarget::User(bob_user.id)
        );
        assert_eq!(notifications[0].target_summary, "bob");
    }

    #[tokio::test]
    async fn test_unfollow_requires_existing_edge() {
        let fixture = Fixture::new().await;
        let follows = FollowService::new(fixture.db.clone(), fixture.hooks.clone());
        let (alice_user, _) = fixture.user("alice").await;
        let (bob_user, bob) = fixture.user("bob").await;

        assert!(matches!(
            follows.unfollow(&bob, alice_user.id).await,
            Err(AppError::NotFound(_))
        ));
        follows.follow(&bob, alice_user.id).await.unwrap();
        follows.unfollow(&bob, alice_user.id).await.unwrap();
        assert!(!fixture.db.follow_exists(bob_user.id, alice_user.id).await.unwrap());
    }
}
