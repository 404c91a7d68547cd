use std::sync::Arc;

use crate::{
    config::Config,
    ent_framework::{create_default_hook_registry, HookRegistry},
    infrastructure::{
        database::DatabaseInterface, middleware::HasDatabase, security::SecurityService,
        SqliteDatabase,
    },
    services::{
        AccountService, CommentService, FollowService, LikeService, NotificationService,
        PostService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseInterface>,
    pub hooks: Arc<HookRegistry>,
    pub accounts: AccountService,
    pub posts: PostService,
    pub comments: CommentService,
    pub likes: LikeService,
    pub follows: FollowService,
    pub notifications: NotificationService,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize database
        let database =
            SqliteDatabase::connect(&config.database.url, config.database.max_connections).await?;
        Ok(Self::with_database(Arc::new(database), config))
    }

    /// Wire every service around an already-initialized store.
    pub fn with_database(db: Arc<dyn DatabaseInterface>, config: Config) -> Self {
        let hooks = Arc::new(create_default_hook_registry(db.clone()));
        let security = Arc::new(SecurityService::new(config.security.clone()));

        Self {
            accounts: AccountService::new(db.clone(), hooks.clone(), security),
            posts: PostService::new(db.clone(), hooks.clone()),
            comments: CommentService::new(db.clone(), hooks.clone()),
            likes: LikeService::new(db.clone(), hooks.clone()),
            follows: FollowService::new(db.clone(), hooks.clone()),
            notifications: NotificationService::new(db.clone()),
            db,
            hooks,
            config,
        }
    }
}

impl HasDatabase for AppState {
    fn database(&self) -> &Arc<dyn DatabaseInterface> {
        &self.db
    }
}
