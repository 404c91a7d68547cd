// Entity definitions - plain records persisted by the database layer

pub mod ent_user;
pub mod ent_post;
pub mod ent_comment;
pub mod ent_like;
pub mod ent_follow;
pub mod ent_notification;

pub use ent_user::{NewUser, ProfileChanges, User, UserCredentials, UserProfile, UserRole};
pub use ent_post::{NewPost, Post, PostChanges, PostFilter, PostView};
pub use ent_comment::{Comment, CommentView, NewComment};
pub use ent_like::Like;
pub use ent_follow::Follow;
pub use ent_notification::{
    NewNotification, Notification, NotificationTarget, NotificationVerb, NotificationView,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminator for every persisted entity kind.
/// Also used as the type half of a notification's generic target reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Post,
    Comment,
    Like,
    Follow,
    Notification,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Post => "post",
            EntityType::Comment => "comment",
            EntityType::Like => "like",
            EntityType::Follow => "follow",
            EntityType::Notification => "notification",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityType::User),
            "post" => Ok(EntityType::Post),
            "comment" => Ok(EntityType::Comment),
            "like" => Ok(EntityType::Like),
            "follow" => Ok(EntityType::Follow),
            "notification" => Ok(EntityType::Notification),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milliseconds since the Unix epoch; all timestamps are stored in this unit.
pub type Millis = i64;

pub fn current_time_millis() -> Millis {
    Utc::now().timestamp_millis()
}

pub fn millis_to_datetime(millis: Millis) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
