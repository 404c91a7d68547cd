// Ent Hooks System - Middleware pattern for entity mutations
// Before hooks may reject a mutation; after hooks observe committed mutations and never fail them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entities::{
    ent_post::POST_TITLE_MAX_LEN, EntityType, NewNotification, NotificationTarget,
    NotificationVerb,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;

/// Hook context containing mutation information
#[derive(Debug, Clone)]
pub struct HookContext {
    pub entity_type: EntityType,
    pub entity_id: Option<i64>,
    pub operation: HookOperation,
    pub data: Option<Value>,
    pub actor_id: Option<i64>,
    pub metadata: HashMap<String, Value>,
}

impl HookContext {
    pub fn new(entity_type: EntityType, operation: HookOperation, actor_id: Option<i64>) -> Self {
        Self {
            entity_type,
            entity_id: None,
            operation,
            data: None,
            actor_id,
            metadata: HashMap::new(),
        }
    }

    pub fn with_entity_id(mut self, entity_id: i64) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.as_ref()?.get(key)?.as_i64()
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }
}

/// Types of operations that can trigger hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOperation {
    Create,
    Update,
    Delete,
}

/// Hook execution timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTiming {
    Before,
    After,
}

/// Trait for implementing entity hooks
#[async_trait]
pub trait EntHook: Send + Sync {
    /// Execute the hook logic
    async fn execute(&self, ctx: &mut HookContext) -> AppResult<()>;

    /// Get hook name for debugging
    fn name(&self) -> &str;

    /// Get supported operations
    fn operations(&self) -> Vec<HookOperation>;

    /// Get hook timing
    fn timing(&self) -> HookTiming;
}

/// Hook registry for managing entity hooks
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<EntityType, Vec<Box<dyn EntHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for an entity type
    pub fn register_hook(&mut self, entity_type: EntityType, hook: Box<dyn EntHook>) {
        self.hooks.entry(entity_type).or_default().push(hook);
    }

    /// Execute all applicable hooks for an operation.
    ///
    /// A failing `Before` hook aborts with its error. A failing `After` hook is logged
    /// and skipped: the mutation it observed has already been committed.
    pub async fn execute_hooks(&self, timing: HookTiming, ctx: &mut HookContext) -> AppResult<()> {
        let Some(hooks) = self.hooks.get(&ctx.entity_type) else {
            return Ok(());
        };
        for hook in hooks {
            if hook.timing() != timing || !hook.operations().contains(&ctx.operation) {
                continue;
            }
            match (timing, hook.execute(ctx).await) {
                (_, Ok(())) => {}
                (HookTiming::Before, Err(e)) => return Err(e),
                (HookTiming::After, Err(e)) => {
                    warn!(
                        hook = hook.name(),
                        entity_type = %ctx.entity_type,
                        entity_id = ctx.entity_id,
                        error = %e,
                        "After hook failed"
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn before(&self, ctx: &mut HookContext) -> AppResult<()> {
        self.execute_hooks(HookTiming::Before, ctx).await
    }

    /// Infallible from the caller's point of view.
    pub async fn after(&self, ctx: &mut HookContext) {
        // after hooks never propagate
        let _ = self.execute_hooks(HookTiming::After, ctx).await;
    }
}

/// Validation hook - validates entity data before mutations
pub struct ValidationHook;

#[async_trait]
impl EntHook for ValidationHook {
    async fn execute(&self, ctx: &mut HookContext) -> AppResult<()> {
        let partial = ctx.operation == HookOperation::Update;
        match ctx.entity_type {
            EntityType::Post => self.validate_post(ctx, partial),
            EntityType::Comment => self.validate_comment(ctx, partial),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "validation_hook"
    }

    fn operations(&self) -> Vec<HookOperation> {
        vec![HookOperation::Create, HookOperation::Update]
    }

    fn timing(&self) -> HookTiming {
        HookTiming::Before
    }
}

impl ValidationHook {
    fn validate_post(&self, ctx: &HookContext, partial: bool) -> AppResult<()> {
        match ctx.data_str("title") {
            Some(title) if title.trim().is_empty() => {
                return Err(AppError::Validation("Post title cannot be empty".to_string()));
            }
            Some(title) if title.chars().count() > POST_TITLE_MAX_LEN => {
                return Err(AppError::Validation(format!(
                    "Post title must be at most {} characters",
                    POST_TITLE_MAX_LEN
                )));
            }
            None if !partial => {
                return Err(AppError::Validation("Post title is required".to_string()));
            }
            _ => {}
        }
        match ctx.data_str("content") {
            Some(content) if content.trim().is_empty() => Err(AppError::Validation(
                "Post content cannot be empty".to_string(),
            )),
            None if !partial => Err(AppError::Validation("Post content is required".to_string())),
            _ => Ok(()),
        }
    }

    fn validate_comment(&self, ctx: &HookContext, partial: bool) -> AppResult<()> {
        match ctx.data_str("content") {
            Some(content) if content.trim().is_empty() => Err(AppError::Validation(
                "Comment content cannot be empty".to_string(),
            )),
            None if !partial => Err(AppError::Validation(
                "Comment content is required".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Notification hook - tells a content owner about actions other users take on it.
///
/// Comment and like notifications go to the post's author; follow notifications go to the
/// followed user. Actions a user takes on their own content produce nothing.
pub struct NotificationHook {
    db: Arc<dyn DatabaseInterface>,
}

impl NotificationHook {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    async fn post_author(&self, post_id: i64) -> AppResult<i64> {
        self.db
            .get_post(post_id)
            .await?
            .map(|post| post.author_id)
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))
    }

    /// Resolve the notification an action produces, if any.
    async fn notification_for(&self, ctx: &HookContext) -> AppResult<Option<NewNotification>> {
        let actor_id = ctx
            .actor_id
            .ok_or_else(|| AppError::Internal("notification hook requires an actor".to_string()))?;
        let missing = |key: &str| AppError::Internal(format!("hook data is missing '{}'", key));

        let (recipient_id, verb, target) = match ctx.entity_type {
            EntityType::Comment => {
                let comment_id = ctx.entity_id.ok_or_else(|| missing("entity_id"))?;
                let post_id = ctx.data_i64("post_id").ok_or_else(|| missing("post_id"))?;
                (
                    self.post_author(post_id).await?,
                    NotificationVerb::Commented,
                    NotificationTarget::Comment(comment_id),
                )
            }
            EntityType::Like => {
                let post_id = ctx.data_i64("post_id").ok_or_else(|| missing("post_id"))?;
                (
                    self.post_author(post_id).await?,
                    NotificationVerb::Liked,
                    NotificationTarget::Post(post_id),
                )
            }
            EntityType::Follow => {
                let followee_id = ctx
                    .data_i64("followee_id")
                    .ok_or_else(|| missing("followee_id"))?;
                (
                    followee_id,
                    NotificationVerb::Followed,
                    NotificationTarget::User(actor_id),
                )
            }
            _ => return Ok(None),
        };

        if recipient_id == actor_id {
            return Ok(None);
        }
        Ok(Some(NewNotification {
            recipient_id,
            actor_id,
            verb,
            target,
        }))
    }
}

#[async_trait]
impl EntHook for NotificationHook {
    async fn execute(&self, ctx: &mut HookContext) -> AppResult<()> {
        let Some(notification) = self.notification_for(ctx).await? else {
            debug!(entity_type = %ctx.entity_type, "No notification for self-action");
            return Ok(());
        };
        let created = self.db.create_notification(notification).await?;
        debug!(
            notification_id = created.id,
            recipient_id = created.recipient_id,
            verb = created.verb.as_str(),
            "Notification created"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "notification_hook"
    }

    fn operations(&self) -> Vec<HookOperation> {
        vec![HookOperation::Create]
    }

    fn timing(&self) -> HookTiming {
        HookTiming::After
    }
}

/// Audit log hook - records every committed mutation
pub struct AuditLogHook;

#[async_trait]
impl EntHook for AuditLogHook {
    async fn execute(&self, ctx: &mut HookContext) -> AppResult<()> {
        info!(
            target: "audit",
            operation = ?ctx.operation,
            entity_type = %ctx.entity_type,
            entity_id = ctx.entity_id,
            actor_id = ctx.actor_id,
            "Entity mutated"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "audit_log_hook"
    }

    fn operations(&self) -> Vec<HookOperation> {
        vec![
            HookOperation::Create,
            HookOperation::Update,
            HookOperation::Delete,
        ]
    }

    fn timing(&self) -> HookTiming {
        HookTiming::After
    }
}

/// Create default hook registry with common hooks
pub fn create_default_hook_registry(db: Arc<dyn DatabaseInterface>) -> HookRegistry {
    let mut registry = HookRegistry::new();

    registry.register_hook(EntityType::Post, Box::new(ValidationHook));
    registry.register_hook(EntityType::Comment, Box::new(ValidationHook));

    for entity_type in [EntityType::Comment, EntityType::Like, EntityType::Follow] {
        registry.register_hook(entity_type, Box::new(NotificationHook::new(db.clone())));
    }

    for entity_type in [
        EntityType::User,
        EntityType::Post,
        EntityType::Comment,
        EntityType::Like,
        EntityType::Follow,
    ] {
        registry.register_hook(entity_type, Box::new(AuditLogHook));
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::UserRecord;
    use crate::entities::{NewPost, UserRole};
    use crate::infrastructure::SqliteDatabase;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingHook;

    #[async_trait]
    impl EntHook for FailingHook {
        async fn execute(&self, _ctx: &mut HookContext) -> AppResult<()> {
            Err(AppError::Internal("boom".to_string()))
        }
        fn name(&self) -> &str {
            "failing_hook"
        }
        fn operations(&self) -> Vec<HookOperation> {
            vec![HookOperation::Create]
        }
        fn timing(&self) -> HookTiming {
            HookTiming::After
        }
    }

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl EntHook for CountingHook {
        async fn execute(&self, _ctx: &mut HookContext) -> AppResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &str {
            "counting_hook"
        }
        fn operations(&self) -> Vec<HookOperation> {
            vec![HookOperation::Create]
        }
        fn timing(&self) -> HookTiming {
            HookTiming::After
        }
    }

    async fn setup() -> (Arc<dyn DatabaseInterface>, i64, i64) {
        let db: Arc<dyn DatabaseInterface> = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let mut ids = Vec::new();
        for name in ["alice", "bob"] {
            let user = db
                .create_user(UserRecord {
                    username: name.to_string(),
                    password_hash: "x".to_string(),
                    email: None,
                    bio: String::new(),
                    profile_picture: None,
                    role: UserRole::Member,
                })
                .await
                .unwrap();
            ids.push(user.id);
        }
        (db, ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_failing_after_hook_does_not_stop_the_rest() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::new();
        registry.register_hook(EntityType::Like, Box::new(FailingHook));
        registry.register_hook(EntityType::Like, Box::new(CountingHook(counter.clone())));

        let mut ctx = HookContext::new(EntityType::Like, HookOperation::Create, Some(1));
        assert!(registry.execute_hooks(HookTiming::After, &mut ctx).await.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_post() {
        let (db, _, _) = setup().await;
        let registry = create_default_hook_registry(db);

        let mut ctx = HookContext::new(EntityType::Post, HookOperation::Create, Some(1))
            .with_data(json!({"title": "x".repeat(201), "content": "body"}));
        assert!(matches!(registry.before(&mut ctx).await, Err(AppError::Validation(_))));

        let mut ctx = HookContext::new(EntityType::Post, HookOperation::Update, Some(1))
            .with_data(json!({"content": "only content"}));
        assert!(registry.before(&mut ctx).await.is_ok());

        let mut ctx = HookContext::new(EntityType::Comment, HookOperation::Create, Some(1))
            .with_data(json!({"content": "   "}));
        assert!(registry.before(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_like_notifies_post_author_only_for_other_users() {
        let (db, alice, bob) = setup().await;
        let post = db
            .create_post(alice, NewPost { title: "t".into(), content: "c".into() })
            .await
            .unwrap();
        let registry = create_default_hook_registry(db.clone());

        let mut ctx = HookContext::new(EntityType::Like, HookOperation::Create, Some(alice))
            .with_data(json!({"post_id": post.id}));
        registry.after(&mut ctx).await;
        assert_eq!(db.count_unread_notifications(alice).await.unwrap(), 0);

        let mut ctx = HookContext::new(EntityType::Like, HookOperation::Create, Some(bob))
            .with_data(json!({"post_id": post.id}));
        registry.after(&mut ctx).await;
        let notifications = db.list_notifications(alice).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification.actor_id, bob);
        assert_eq!(notifications[0].notification.verb, NotificationVerb::Liked);
        assert_eq!(notifications[0].notification.target, NotificationTarget::Post(post.id));
    }

    #[tokio::test]
    async fn test_follow_notification_targets_actor() {
        let (db, alice, bob) = setup().await;
        let hook = NotificationHook::new(db.clone());
        let ctx = HookContext::new(EntityType::Follow, HookOperation::Create, Some(bob))
            .with_data(json!({"followee_id": alice}));
        let notification = hook.notification_for(&ctx).await.unwrap().unwrap();
        assert_eq!(notification.recipient_id, alice);
        assert_eq!(notification.target, NotificationTarget::User(bob));
        assert_eq!(notification.verb, NotificationVerb::Followed);
    }

    #[tokio::test]
    async fn test_missing_post_is_swallowed_after_commit() {
        let (db, _, bob) = setup().await;
        let registry = create_default_hook_registry(db);
        let mut ctx = HookContext::new(EntityType::Comment, HookOperation::Create, Some(bob))
            .with_entity_id(99)
            .with_data(json!({"post_id": 12345}));
        registry.after(&mut ctx).await;
    }
}
