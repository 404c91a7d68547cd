// Viewer Context - who is making the current request

use crate::entities::User;
use crate::error::{AppError, AppResult};

/// Request-scoped identity. Anonymous viewers carry no user.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub request_id: String,
    pub user: Option<User>,
}

impl ViewerContext {
    pub fn anonymous(request_id: String) -> Self {
        Self {
            request_id,
            user: None,
        }
    }

    pub fn authenticated(user: User, request_id: String) -> Self {
        Self {
            request_id,
            user: Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|user| user.id)
    }

    /// The authenticated user, or `Unauthorized` for anonymous viewers.
    pub fn require_user(&self) -> AppResult<&User> {
        self.user.as_ref().ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided.".to_string())
        })
    }

    /// Authors may modify their own content; admins may modify anything.
    pub fn require_owner_or_admin(&self, owner_id: i64) -> AppResult<&User> {
        let user = self.require_user()?;
        if user.id == owner_id || user.role.is_admin() {
            Ok(user)
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{millis_to_datetime, UserRole};

    fn user(id: i64, role: UserRole) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: None,
            bio: String::new(),
            profile_picture: None,
            role,
            created_at: millis_to_datetime(0),
        }
    }

    #[test]
    fn test_anonymous_viewer_is_rejected() {
        let vc = ViewerContext::anonymous("req-1".into());
        assert!(!vc.is_authenticated());
        assert!(matches!(vc.require_user(), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_owner_or_admin() {
        let member = ViewerContext::authenticated(user(1, UserRole::Member), "req".into());
        assert!(member.require_owner_or_admin(1).is_ok());
        assert!(matches!(
            member.require_owner_or_admin(2),
            Err(AppError::Forbidden(_))
        ));

        let admin = ViewerContext::authenticated(user(3, UserRole::Admin), "req".into());
        assert!(admin.require_owner_or_admin(2).is_ok());
    }
}
