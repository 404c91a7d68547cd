// Service layer - business rules on top of the entity store
// Handlers call services with the request's ViewerContext; services call the
// store and run entity hooks around every mutation.

pub mod account_service;
pub mod comment_service;
pub mod follow_service;
pub mod like_service;
pub mod notification_service;
pub mod post_service;

pub use account_service::{AccountService, AuthResponse, LoginRequest};
pub use comment_service::CommentService;
pub use follow_service::FollowService;
pub use like_service::LikeService;
pub use notification_service::NotificationService;
pub use post_service::PostService;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::config::SecurityConfig;
    use crate::ent_framework::{create_default_hook_registry, HookRegistry};
    use crate::entities::{NewUser, User};
    use crate::infrastructure::database::DatabaseInterface;
    use crate::infrastructure::security::SecurityService;
    use crate::infrastructure::viewer::ViewerContext;
    use crate::infrastructure::SqliteDatabase;

    use super::AccountService;

    pub struct Fixture {
        pub db: Arc<dyn DatabaseInterface>,
        pub hooks: Arc<HookRegistry>,
        pub accounts: AccountService,
    }

    impl Fixture {
        pub async fn new() -> Self {
            let db: Arc<dyn DatabaseInterface> =
                Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
            let hooks = Arc::new(create_default_hook_registry(db.clone()));
            let security = Arc::new(SecurityService::new(SecurityConfig::default()));
            let accounts = AccountService::new(db.clone(), hooks.clone(), security);
            Self { db, hooks, accounts }
        }

        pub async fn user(&self, username: &str) -> (User, ViewerContext) {
            let registered = self
                .accounts
                .register(NewUser {
                    username: username.to_string(),
                    password: "password123".to_string(),
                    email: None,
                    bio: None,
                    profile_picture: None,
                })
                .await
                .unwrap();
            let vc = ViewerContext::authenticated(registered.user.clone(), "test".to_string());
            (registered.user, vc)
        }
    }
}
