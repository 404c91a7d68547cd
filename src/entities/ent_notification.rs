// EntNotification - per-recipient record of an action taken by another user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityType;

/// Fixed set of notification verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationVerb {
    Commented,
    Liked,
    Followed,
}

impl NotificationVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationVerb::Commented => "commented on your post",
            NotificationVerb::Liked => "liked your post",
            NotificationVerb::Followed => "followed you",
        }
    }
}

impl std::str::FromStr for NotificationVerb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commented on your post" => Ok(NotificationVerb::Commented),
            "liked your post" => Ok(NotificationVerb::Liked),
            "followed you" => Ok(NotificationVerb::Followed),
            other => Err(format!("unknown notification verb: {}", other)),
        }
    }
}

impl Serialize for NotificationVerb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationVerb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Generic target reference: a type discriminator plus an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum NotificationTarget {
    Post(i64),
    Comment(i64),
    User(i64),
}

impl NotificationTarget {
    pub fn entity_type(&self) -> EntityType {
        match self {
            NotificationTarget::Post(_) => EntityType::Post,
            NotificationTarget::Comment(_) => EntityType::Comment,
            NotificationTarget::User(_) => EntityType::User,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            NotificationTarget::Post(id)
            | NotificationTarget::Comment(id)
            | NotificationTarget::User(id) => *id,
        }
    }

    pub fn from_parts(entity_type: EntityType, id: i64) -> Option<Self> {
        match entity_type {
            EntityType::Post => Some(NotificationTarget::Post(id)),
            EntityType::Comment => Some(NotificationTarget::Comment(id)),
            EntityType::User => Some(NotificationTarget::User(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub actor_id: i64,
    pub verb: NotificationVerb,
    pub target: NotificationTarget,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub actor_id: i64,
    pub verb: NotificationVerb,
    pub target: NotificationTarget,
}

/// Notification as listed in the recipient's feed.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub actor_username: String,
    pub target_summary: String,
}

pub const DELETED_TARGET_SUMMARY: &str = "Deleted Object";
