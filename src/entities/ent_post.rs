// EntPost - user-authored content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const POST_TITLE_MAX_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post as returned to clients, with author name and engagement counters.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author_username: String,
    pub likes_count: u64,
    pub comments_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl PostChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Listing filter. `search` matches title, content or author username.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub search: Option<String>,
    pub author_id: Option<i64>,
}
