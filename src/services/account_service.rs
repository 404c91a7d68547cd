// AccountService - registration, token login/logout and profiles

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::ent_framework::{HookContext, HookOperation, HookRegistry};
use crate::entities::{EntityType, NewUser, ProfileChanges, User, UserProfile, UserRole};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{DatabaseInterface, UserRecord};
use crate::infrastructure::security::SecurityService;
use crate::infrastructure::viewer::ViewerContext;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by register and login.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct AccountService {
    db: Arc<dyn DatabaseInterface>,
    hooks: Arc<HookRegistry>,
    security: Arc<SecurityService>,
}

impl AccountService {
    pub fn new(
        db: Arc<dyn DatabaseInterface>,
        hooks: Arc<HookRegistry>,
        security: Arc<SecurityService>,
    ) -> Self {
        Self {
            db,
            hooks,
            security,
        }
    }

    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn register(&self, new_user: NewUser) -> AppResult<AuthResponse> {
        self.security.validate_username(&new_user.username)?;
        self.security.validate_password(&new_user.password)?;
        let email = normalize(new_user.email);
        if let Some(email) = &email {
            self.security.validate_email(email)?;
        }

        let password_hash = self.security.hash_password(&new_user.password)?;
        let token = self.security.generate_token();
        let user = self
            .db
            .create_user_with_token(
                UserRecord {
                    username: new_user.username,
                    password_hash,
                    email,
                    bio: new_user.bio.unwrap_or_default(),
                    profile_picture: normalize(new_user.profile_picture),
                    role: UserRole::Member,
                },
                &token,
            )
            .await?;

        let mut ctx = HookContext::new(EntityType::User, HookOperation::Create, Some(user.id))
            .with_entity_id(user.id);
        self.hooks.after(&mut ctx).await;

        info!(user_id = user.id, "User registered");
        Ok(AuthResponse { token, user })
    }

    /// Returns the user's existing token, minting one if they have none.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let invalid = || AppError::Validation("Invalid credentials".to_string());
        let credentials = self
            .db
            .get_credentials(&request.username)
            .await?
            .ok_or_else(invalid)?;
        if !self
            .security
            .verify_password(&request.password, &credentials.password_hash)?
        {
            return Err(invalid());
        }

        let user = credentials.user;
        let token = self
            .db
            .get_or_create_token(user.id, &self.security.generate_token())
            .await?;

        info!(user_id = user.id, "User logged in");
        Ok(AuthResponse { token, user })
    }

    #[instrument(skip(self, vc))]
    pub async fn logout(&self, vc: &ViewerContext) -> AppResult<()> {
        let user = vc.require_user()?;
        self.db.delete_tokens_for_user(user.id).await?;
        info!(user_id = user.id, "User logged out");
        Ok(())
    }

    pub async fn own_profile(&self, vc: &ViewerContext) -> AppResult<UserProfile> {
        let user = vc.require_user()?;
        self.profile(user.id).await
    }

    /// Public profile with follower counters.
    pub async fn profile(&self, user_id: i64) -> AppResult<UserProfile> {
        let user = self.get_user(user_id).await?;
        let followers_count = self.db.count_followers(user.id).await?;
        let following_count = self.db.count_following(user.id).await?;
        Ok(UserProfile {
            user,
            followers_count,
            following_count,
        })
    }

    pub async fn get_user(&self, user_id: i64) -> AppResult<User> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    #[instrument(skip(self, vc, changes))]
    pub async fn update_profile(
        &self,
        vc: &ViewerContext,
        changes: ProfileChanges,
    ) -> AppResult<UserProfile> {
        let user = vc.require_user()?;
        if let Some(email) = changes.email.as_deref().filter(|email| !email.trim().is_empty()) {
            self.security.validate_email(email)?;
        }
        if !changes.is_empty() {
            let mut ctx = HookContext::new(EntityType::User, HookOperation::Update, Some(user.id))
                .with_entity_id(user.id);
            self.hooks.before(&mut ctx).await?;
            self.db.update_profile(user.id, changes).await?;
            self.hooks.after(&mut ctx).await;
            info!(user_id = user.id, "Profile updated");
        }
        self.profile(user.id).await
    }

    pub async fn followers(&self, user_id: i64) -> AppResult<Vec<User>> {
        self.get_user(user_id).await?;
        self.db.list_followers(user_id).await
    }

    pub async fn following(&self, user_id: i64) -> AppResult<Vec<User>> {
        self.get_user(user_id).await?;
        self.db.list_following(user_id).await
    }

    /// Look a user up by username, for operator tooling.
    pub async fn find_by_username(&self, username: &str) -> AppResult<User> {
        self.db
            .get_credentials(username)
            .await?
            .map(|credentials| credentials.user)
            .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", username)))
    }

    #[instrument(skip(self))]
    pub async fn set_role(&self, user_id: i64, role: UserRole) -> AppResult<User> {
        self.get_user(user_id).await?;
        let user = self.db.set_user_role(user_id, role).await?;
        let mut ctx =
            HookContext::new(EntityType::User, HookOperation::Update, None).with_entity_id(user_id);
        ctx.data = Some(json!({ "role": role.as_str() }));
        self.hooks.after(&mut ctx).await;
        info!(user_id, role = role.as_str(), "User role changed");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: i64) -> AppResult<()> {
        if !self.db.delete_user(user_id).await? {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        let mut ctx =
            HookContext::new(EntityType::User, HookOperation::Delete, None).with_entity_id(user_id);
        self.hooks.after(&mut ctx).await;
        info!(user_id, "User deleted");
        Ok(())
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
