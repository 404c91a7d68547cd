// Database Interface - entity store operations used by the service layer
// Implementations own uniqueness and cascade rules; services own business rules.

use async_trait::async_trait;

use crate::entities::{
    Comment, CommentView, Follow, Like, NewNotification, NewPost, Notification,
    NotificationView, Post, PostChanges, PostFilter, PostView, ProfileChanges, User,
    UserCredentials, UserRole,
};
use crate::error::AppResult;

/// Fields written when a user row is created. The password is already hashed.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub bio: String,
    pub profile_picture: Option<String>,
    pub role: UserRole,
}

#[async_trait]
pub trait DatabaseInterface: Send + Sync {
    async fn health_check(&self) -> AppResult<()>;

    // Users
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, record: UserRecord) -> AppResult<User>;
    /// Creates the user and their first auth token atomically.
    async fn create_user_with_token(&self, record: UserRecord, key: &str) -> AppResult<User>;
    async fn get_user(&self, id: i64) -> AppResult<Option<User>>;
    async fn get_credentials(&self, username: &str) -> AppResult<Option<UserCredentials>>;
    async fn update_profile(&self, id: i64, changes: ProfileChanges) -> AppResult<User>;
    async fn set_user_role(&self, id: i64, role: UserRole) -> AppResult<User>;
    /// Cascades to everything the user owns, received or caused.
    async fn delete_user(&self, id: i64) -> AppResult<bool>;

    // Auth tokens
    /// Returns the user's token, storing `candidate` first if they have none.
    async fn get_or_create_token(&self, user_id: i64, candidate: &str) -> AppResult<String>;
    async fn get_user_by_token(&self, key: &str) -> AppResult<Option<User>>;
    async fn delete_tokens_for_user(&self, user_id: i64) -> AppResult<bool>;

    // Posts
    async fn create_post(&self, author_id: i64, post: NewPost) -> AppResult<Post>;
    async fn get_post(&self, id: i64) -> AppResult<Option<Post>>;
    async fn get_post_view(&self, id: i64) -> AppResult<Option<PostView>>;
    async fn list_posts(&self, filter: PostFilter) -> AppResult<Vec<PostView>>;
    /// Posts authored by users that `follower_id` follows, newest first.
    async fn feed_posts(&self, follower_id: i64) -> AppResult<Vec<PostView>>;
    async fn update_post(&self, id: i64, changes: PostChanges) -> AppResult<Post>;
    /// Cascades to the post's comments, likes and the notifications targeting them.
    async fn delete_post(&self, id: i64) -> AppResult<bool>;

    // Comments
    async fn create_comment(&self, author_id: i64, post_id: i64, content: String)
        -> AppResult<Comment>;
    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>>;
    async fn get_comment_view(&self, id: i64) -> AppResult<Option<CommentView>>;
    async fn list_comments(&self, post_id: Option<i64>) -> AppResult<Vec<CommentView>>;
    async fn update_comment(&self, id: i64, content: String) -> AppResult<Comment>;
    async fn delete_comment(&self, id: i64) -> AppResult<bool>;

    // Likes
    /// Fails with `Conflict` when the pair already exists.
    async fn create_like(&self, user_id: i64, post_id: i64) -> AppResult<Like>;
    async fn delete_like(&self, user_id: i64, post_id: i64) -> AppResult<bool>;
    async fn count_likes(&self, post_id: i64) -> AppResult<u64>;

    // Follow edges
    /// Fails with `Conflict` when the edge already exists.
    async fn create_follow(&self, follower_id: i64, followee_id: i64) -> AppResult<Follow>;
    async fn delete_follow(&self, follower_id: i64, followee_id: i64) -> AppResult<bool>;
    async fn follow_exists(&self, follower_id: i64, followee_id: i64) -> AppResult<bool>;
    async fn list_followers(&self, user_id: i64) -> AppResult<Vec<User>>;
    async fn list_following(&self, user_id: i64) -> AppResult<Vec<User>>;
    async fn count_followers(&self, user_id: i64) -> AppResult<u64>;
    async fn count_following(&self, user_id: i64) -> AppResult<u64>;

    // Notifications
    async fn create_notification(&self, notification: NewNotification)
        -> AppResult<Notification>;
    async fn list_notifications(&self, recipient_id: i64) -> AppResult<Vec<NotificationView>>;
    /// Marks the recipient's unread rows read, then lists newest first.
    /// Rows flipped by this call come back unread; rows that arrive between the
    /// two statements are left for the next listing.
    async fn list_notifications_and_mark_read(
        &self,
        recipient_id: i64,
    ) -> AppResult<Vec<NotificationView>>;
    async fn count_unread_notifications(&self, recipient_id: i64) -> AppResult<u64>;
}
