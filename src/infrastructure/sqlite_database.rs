use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::entities::{
    current_time_millis, millis_to_datetime, ent_notification::DELETED_TARGET_SUMMARY, Comment,
    CommentView, EntityType, Follow, Like, NewNotification, NewPost, Notification,
    NotificationTarget, NotificationView, Post, PostChanges, PostFilter, PostView,
    ProfileChanges, User, UserCredentials, UserRole,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{DatabaseInterface, UserRecord};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        email TEXT,
        bio TEXT NOT NULL DEFAULT '',
        profile_picture TEXT,
        role TEXT NOT NULL DEFAULT 'member',
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_tokens (
        key TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS likes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        UNIQUE (user_id, post_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS follows (
        follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        followee_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (follower_id, followee_id),
        CHECK (follower_id <> followee_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recipient_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        actor_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        verb TEXT NOT NULL,
        target_type TEXT NOT NULL,
        target_id INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        is_read INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_author_created ON posts(author_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id)",
    "CREATE INDEX IF NOT EXISTS idx_follows_followee ON follows(followee_id)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_target ON notifications(target_type, target_id)",
];

const USER_COLUMNS: &str =
    "u.id, u.username, u.email, u.bio, u.profile_picture, u.role, u.created_at";

const POST_VIEW_SELECT: &str = r#"
    SELECT p.id, p.author_id, p.title, p.content, p.created_at, p.updated_at,
           u.username AS author_username,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS likes_count,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
"#;

const COMMENT_VIEW_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.author_id, c.content, c.created_at, c.updated_at,
           u.username AS author_username
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

const NOTIFICATION_VIEW_SELECT: &str = r#"
    SELECT n.id, n.recipient_id, n.actor_id, n.verb, n.target_type, n.target_id,
           n.created_at, n.is_read,
           a.username AS actor_username,
           CASE n.target_type
               WHEN 'post' THEN (SELECT p.title FROM posts p WHERE p.id = n.target_id)
               WHEN 'user' THEN (SELECT tu.username FROM users tu WHERE tu.id = n.target_id)
               WHEN 'comment' THEN (
                   SELECT 'Comment by ' || cu.username || ' on ' || substr(cp.title, 1, 20)
                   FROM comments tc
                   JOIN users cu ON cu.id = tc.author_id
                   JOIN posts cp ON cp.id = tc.post_id
                   WHERE tc.id = n.target_id
               )
           END AS target_summary
    FROM notifications n
    JOIN users a ON a.id = n.actor_id
    WHERE n.recipient_id = ?
    ORDER BY n.created_at DESC, n.id DESC
"#;

/// SQLite implementation of the entity store
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Connect to `url`, creating the file (and its directory) if missing, and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid database URL {}: {}", url, e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let options = if in_memory {
            options
        } else {
            // Readers keep going while a writer commits.
            options.journal_mode(SqliteJournalMode::Wal)
        };
        if !in_memory {
            if let Some(parent) = database_path(url).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::ConfigurationError(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        // Every connection to an in-memory database sees its own empty database,
        // so the pool is pinned to one connection that is never recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        let db = Self { pool };
        db.initialize().await?;
        info!(url, "Entity store ready");
        Ok(db)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn initialize(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to apply schema: {}", e)))?;
        }
        Ok(())
    }

    async fn count(&self, sql: &str, id: i64) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(sql).bind(id).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}

fn user_from_row(row: &SqliteRow) -> AppResult<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        profile_picture: row.try_get("profile_picture")?,
        role: role.parse().map_err(AppError::DatabaseError)?,
        created_at: millis_to_datetime(row.try_get("created_at")?),
    })
}

fn post_from_row(row: &SqliteRow) -> AppResult<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        created_at: millis_to_datetime(row.try_get("created_at")?),
        updated_at: millis_to_datetime(row.try_get("updated_at")?),
    })
}

fn post_view_from_row(row: &SqliteRow) -> AppResult<PostView> {
    Ok(PostView {
        post: post_from_row(row)?,
        author_username: row.try_get("author_username")?,
        likes_count: row.try_get::<i64, _>("likes_count")? as u64,
        comments_count: row.try_get::<i64, _>("comments_count")? as u64,
    })
}

fn comment_from_row(row: &SqliteRow) -> AppResult<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        content: row.try_get("content")?,
        created_at: millis_to_datetime(row.try_get("created_at")?),
        updated_at: millis_to_datetime(row.try_get("updated_at")?),
    })
}

fn comment_view_from_row(row: &SqliteRow) -> AppResult<CommentView> {
    Ok(CommentView {
        comment: comment_from_row(row)?,
        author_username: row.try_get("author_username")?,
    })
}

fn notification_view_from_row(row: &SqliteRow) -> AppResult<NotificationView> {
    let verb: String = row.try_get("verb")?;
    let target_type: String = row.try_get("target_type")?;
    let target_id: i64 = row.try_get("target_id")?;
    let entity_type: EntityType = target_type.parse().map_err(AppError::DatabaseError)?;
    let target = NotificationTarget::from_parts(entity_type, target_id).ok_or_else(|| {
        AppError::DatabaseError(format!("{} is not a notification target type", target_type))
    })?;
    let summary: Option<String> = row.try_get("target_summary")?;

    Ok(NotificationView {
        notification: Notification {
            id: row.try_get("id")?,
            recipient_id: row.try_get("recipient_id")?,
            actor_id: row.try_get("actor_id")?,
            verb: verb.parse().map_err(AppError::DatabaseError)?,
            target,
            created_at: millis_to_datetime(row.try_get("created_at")?),
            is_read: row.try_get("is_read")?,
        },
        actor_username: row.try_get("actor_username")?,
        target_summary: summary.unwrap_or_else(|| DELETED_TARGET_SUMMARY.to_string()),
    })
}

/// File path part of a `sqlite:` URL, without scheme or query string.
fn database_path(url: &str) -> &Path {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    Path::new(rest.split('?').next().unwrap_or(rest))
}

/// Map constraint failures to domain errors; everything else is a storage error.
fn map_constraint(err: sqlx::Error, conflict: &str, missing: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::Conflict(conflict.to_string());
        }
        if db_err.is_foreign_key_violation() {
            return AppError::NotFound(missing.to_string());
        }
    }
    err.into()
}

async fn insert_user<'e, E>(executor: E, record: UserRecord) -> AppResult<User>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let now = current_time_millis();
    let result = sqlx::query(
        "INSERT INTO users (username, password_hash, email, bio, profile_picture, role, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.username)
    .bind(&record.password_hash)
    .bind(&record.email)
    .bind(&record.bio)
    .bind(&record.profile_picture)
    .bind(record.role.as_str())
    .bind(now)
    .execute(executor)
    .await
    .map_err(|e| map_constraint(e, "A user with that username already exists.", "User not found"))?;

    Ok(User {
        id: result.last_insert_rowid(),
        username: record.username,
        email: record.email,
        bio: record.bio,
        profile_picture: record.profile_picture,
        role: record.role,
        created_at: millis_to_datetime(now),
    })
}

/// Escape LIKE wildcards so user search text matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl DatabaseInterface for SqliteDatabase {
    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    async fn create_user(&self, record: UserRecord) -> AppResult<User> {
        insert_user(&self.pool, record).await
    }

    async fn create_user_with_token(&self, record: UserRecord, key: &str) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;
        let user = insert_user(&mut *tx, record).await?;
        sqlx::query("INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(user.id)
            .bind(current_time_millis())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_constraint(e, "Token already exists", "User not found"))?;
        tx.commit().await?;
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users u WHERE u.id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_credentials(&self, username: &str) -> AppResult<Option<UserCredentials>> {
        let row = sqlx::query(&format!(
            "SELECT {}, u.password_hash FROM users u WHERE u.username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(UserCredentials {
                user: user_from_row(&row)?,
                password_hash: row.try_get("password_hash")?,
            })),
            None => Ok(None),
        }
    }

    async fn update_profile(&self, id: i64, changes: ProfileChanges) -> AppResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = CASE WHEN ?1 IS NULL THEN email ELSE NULLIF(TRIM(?1), '') END,
                bio = COALESCE(?2, bio),
                profile_picture = CASE WHEN ?3 IS NULL THEN profile_picture ELSE NULLIF(TRIM(?3), '') END
            WHERE id = ?4
            "#,
        )
        .bind(changes.email)
        .bind(changes.bio)
        .bind(changes.profile_picture)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn set_user_role(&self, id: i64, role: UserRole) -> AppResult<User> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn delete_user(&self, id: i64) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Generic targets have no foreign key, so clean those up by hand.
        sqlx::query(
            r#"
            DELETE FROM notifications WHERE
                (target_type = 'user' AND target_id = ?1)
                OR (target_type = 'post' AND target_id IN (SELECT id FROM posts WHERE author_id = ?1))
                OR (target_type = 'comment' AND target_id IN (
                    SELECT c.id FROM comments c
                    WHERE c.author_id = ?1
                       OR c.post_id IN (SELECT id FROM posts WHERE author_id = ?1)
                ))
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_or_create_token(&self, user_id: i64, candidate: &str) -> AppResult<String> {
        sqlx::query(
            "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?, ?, ?) ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(candidate)
        .bind(user_id)
        .bind(current_time_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "Token already exists", "User not found"))?;

        let key = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(key)
    }

    async fn get_user_by_token(&self, key: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM auth_tokens t JOIN users u ON u.id = t.user_id WHERE t.key = ?",
            USER_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete_tokens_for_user(&self, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_post(&self, author_id: i64, post: NewPost) -> AppResult<Post> {
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT INTO posts (author_id, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(author_id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "Post already exists", "Author not found"))?;

        Ok(Post {
            id: result.last_insert_rowid(),
            author_id,
            title: post.title,
            content: post.content,
            created_at: millis_to_datetime(now),
            updated_at: millis_to_datetime(now),
        })
    }

    async fn get_post(&self, id: i64) -> AppResult<Option<Post>> {
        let row = sqlx::query(
            "SELECT id, author_id, title, content, created_at, updated_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn get_post_view(&self, id: i64) -> AppResult<Option<PostView>> {
        let row = sqlx::query(&format!("{} WHERE p.id = ?", POST_VIEW_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_view_from_row).transpose()
    }

    async fn list_posts(&self, filter: PostFilter) -> AppResult<Vec<PostView>> {
        let mut qb = QueryBuilder::<Sqlite>::new(POST_VIEW_SELECT);
        qb.push(" WHERE 1 = 1");

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            qb.push(" AND (p.title LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR p.content LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR u.username LIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\')");
        }
        if let Some(author_id) = filter.author_id {
            qb.push(" AND p.author_id = ");
            qb.push_bind(author_id);
        }

        qb.push(" ORDER BY p.created_at DESC, p.id DESC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(post_view_from_row).collect()
    }

    async fn feed_posts(&self, follower_id: i64) -> AppResult<Vec<PostView>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.author_id IN (SELECT followee_id FROM follows WHERE follower_id = ?) ORDER BY p.created_at DESC, p.id DESC",
            POST_VIEW_SELECT
        ))
        .bind(follower_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(post_view_from_row).collect()
    }

    async fn update_post(&self, id: i64, changes: PostChanges) -> AppResult<Post> {
        let result = sqlx::query(
            "UPDATE posts SET title = COALESCE(?, title), content = COALESCE(?, content), updated_at = ? WHERE id = ?",
        )
        .bind(changes.title)
        .bind(changes.content)
        .bind(current_time_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Post {} not found", id)));
        }
        self.get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", id)))
    }

    async fn delete_post(&self, id: i64) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM notifications WHERE
                (target_type = 'post' AND target_id = ?1)
                OR (target_type = 'comment' AND target_id IN (SELECT id FROM comments WHERE post_id = ?1))
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Comments and likes go with the post through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(post_id = id, deleted = result.rows_affected(), "Deleted post");
        Ok(result.rows_affected() > 0)
    }

    async fn create_comment(
        &self,
        author_id: i64,
        post_id: i64,
        content: String,
    ) -> AppResult<Comment> {
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT INTO comments (post_id, author_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(&content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "Comment already exists", "Post not found"))?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id,
            author_id,
            content,
            created_at: millis_to_datetime(now),
            updated_at: millis_to_datetime(now),
        })
    }

    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, post_id, author_id, content, created_at, updated_at FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn get_comment_view(&self, id: i64) -> AppResult<Option<CommentView>> {
        let row = sqlx::query(&format!("{} WHERE c.id = ?", COMMENT_VIEW_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(comment_view_from_row).transpose()
    }

    async fn list_comments(&self, post_id: Option<i64>) -> AppResult<Vec<CommentView>> {
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_VIEW_SELECT);
        if let Some(post_id) = post_id {
            qb.push(" WHERE c.post_id = ");
            qb.push_bind(post_id);
        }
        qb.push(" ORDER BY c.created_at DESC, c.id DESC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(comment_view_from_row).collect()
    }

    async fn update_comment(&self, id: i64, content: String) -> AppResult<Comment> {
        let result = sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(current_time_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Comment {} not found", id)));
        }
        self.get_comment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", id)))
    }

    async fn delete_comment(&self, id: i64) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM notifications WHERE target_type = 'comment' AND target_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_like(&self, user_id: i64, post_id: i64) -> AppResult<Like> {
        let now = current_time_millis();
        let result = sqlx::query("INSERT INTO likes (user_id, post_id, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(post_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_constraint(e, "You have already liked this post.", "Post not found"))?;

        Ok(Like {
            id: result.last_insert_rowid(),
            user_id,
            post_id,
            created_at: millis_to_datetime(now),
        })
    }

    async fn delete_like(&self, user_id: i64, post_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_likes(&self, post_id: i64) -> AppResult<u64> {
        self.count("SELECT COUNT(*) FROM likes WHERE post_id = ?", post_id).await
    }

    async fn create_follow(&self, follower_id: i64, followee_id: i64) -> AppResult<Follow> {
        let now = current_time_millis();
        sqlx::query("INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)")
            .bind(follower_id)
            .bind(followee_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_constraint(e, "You are already following this user.", "User not found"))?;

        Ok(Follow {
            follower_id,
            followee_id,
            created_at: millis_to_datetime(now),
        })
    }

    async fn delete_follow(&self, follower_id: i64, followee_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
            .bind(follower_id)
            .bind(followee_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn follow_exists(&self, follower_id: i64, followee_id: i64) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM follows WHERE follower_id = ? AND followee_id = ?")
            .bind(follower_id)
            .bind(followee_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list_followers(&self, user_id: i64) -> AppResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM follows f JOIN users u ON u.id = f.follower_id WHERE f.followee_id = ? ORDER BY f.created_at DESC, u.id DESC",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn list_following(&self, user_id: i64) -> AppResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM follows f JOIN users u ON u.id = f.followee_id WHERE f.follower_id = ? ORDER BY f.created_at DESC, u.id DESC",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn count_followers(&self, user_id: i64) -> AppResult<u64> {
        self.count("SELECT COUNT(*) FROM follows WHERE followee_id = ?", user_id).await
    }

    async fn count_following(&self, user_id: i64) -> AppResult<u64> {
        self.count("SELECT COUNT(*) FROM follows WHERE follower_id = ?", user_id).await
    }

    async fn create_notification(&self, notification: NewNotification) -> AppResult<Notification> {
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT INTO notifications (recipient_id, actor_id, verb, target_type, target_id, created_at, is_read) VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(notification.recipient_id)
        .bind(notification.actor_id)
        .bind(notification.verb.as_str())
        .bind(notification.target.entity_type().as_str())
        .bind(notification.target.id())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_constraint(e, "Notification already exists", "User not found"))?;

        Ok(Notification {
            id: result.last_insert_rowid(),
            recipient_id: notification.recipient_id,
            actor_id: notification.actor_id,
            verb: notification.verb,
            target: notification.target,
            created_at: millis_to_datetime(now),
            is_read: false,
        })
    }

    async fn list_notifications(&self, recipient_id: i64) -> AppResult<Vec<NotificationView>> {
        let rows = sqlx::query(NOTIFICATION_VIEW_SELECT)
            .bind(recipient_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(notification_view_from_row).collect()
    }

    async fn list_notifications_and_mark_read(
        &self,
        recipient_id: i64,
    ) -> AppResult<Vec<NotificationView>> {
        // Mark first as one write statement; the select below takes no write lock.
        let marked: Vec<i64> = sqlx::query_scalar(
            "UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0 RETURNING id",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        let marked: HashSet<i64> = marked.into_iter().collect();

        let rows = sqlx::query(NOTIFICATION_VIEW_SELECT)
            .bind(recipient_id)
            .fetch_all(&self.pool)
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut view = notification_view_from_row(row)?;
            if marked.contains(&view.notification.id) {
                view.notification.is_read = false;
            } else if !view.notification.is_read {
                // arrived after the mark; delivered unread by the next listing
                continue;
            }
            views.push(view);
        }
        debug!(recipient_id, marked = marked.len(), "Marked notifications read");
        Ok(views)
    }

    async fn count_unread_notifications(&self, recipient_id: i64) -> AppResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
            recipient_id,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::task::JoinSet;

    fn record(username: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            email: None,
            bio: String::new(),
            profile_picture: None,
            role: UserRole::Member,
        }
    }

    fn new_post(title: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        db.create_user(record("alice")).await.unwrap();
        let err = db.create_user(record("alice")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_like_pair_is_unique() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db.create_user(record("alice")).await.unwrap();
        let post = db.create_post(alice.id, new_post("hello")).await.unwrap();

        db.create_like(alice.id, post.id).await.unwrap();
        let err = db.create_like(alice.id, post.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(db.count_likes(post.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_like_on_missing_post_is_not_found() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db.create_user(record("alice")).await.unwrap();
        let err = db.create_like(alice.id, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_post_cascades() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db.create_user(record("alice")).await.unwrap();
        let bob = db.create_user(record("bob")).await.unwrap();
        let post = db.create_post(alice.id, new_post("hello")).await.unwrap();

        let comment = db.create_comment(bob.id, post.id, "hi".into()).await.unwrap();
        db.create_like(bob.id, post.id).await.unwrap();
        db.create_notification(NewNotification {
            recipient_id: alice.id,
            actor_id: bob.id,
            verb: crate::entities::NotificationVerb::Commented,
            target: NotificationTarget::Comment(comment.id),
        })
        .await
        .unwrap();

        assert!(db.delete_post(post.id).await.unwrap());

        assert!(db.get_comment(comment.id).await.unwrap().is_none());
        assert_eq!(db.count_likes(post.id).await.unwrap(), 0);
        assert!(db.list_notifications(alice.id).await.unwrap().is_empty());
        assert!(!db.delete_post(post.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user_cascades_notifications() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db.create_user(record("alice")).await.unwrap();
        let bob = db.create_user(record("bob")).await.unwrap();
        db.create_follow(bob.id, alice.id).await.unwrap();
        db.create_notification(NewNotification {
            recipient_id: alice.id,
            actor_id: bob.id,
            verb: crate::entities::NotificationVerb::Followed,
            target: NotificationTarget::User(bob.id),
        })
        .await
        .unwrap();

        assert!(db.delete_user(bob.id).await.unwrap());
        assert!(db.list_notifications(alice.id).await.unwrap().is_empty());
        assert_eq!(db.count_followers(alice.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db.create_user(record("alice")).await.unwrap();
        db.create_post(alice.id, new_post("100% rust")).await.unwrap();
        db.create_post(alice.id, new_post("1000 lines")).await.unwrap();

        let found = db
            .list_posts(PostFilter {
                search: Some("0%".into()),
                author_id: None,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].post.title, "100% rust");

        let by_author = db
            .list_posts(PostFilter {
                search: Some("ALICE".into()),
                author_id: None,
            })
            .await
            .unwrap();
        assert_eq!(by_author.len(), 2);
    }

    #[test]
    fn test_database_path_strips_scheme_and_query() {
        assert_eq!(database_path("sqlite:data/social.db"), Path::new("data/social.db"));
        assert_eq!(
            database_path("sqlite://data/social.db?mode=rwc"),
            Path::new("data/social.db")
        );
    }

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("nested/social.db").display());

        {
            let db = SqliteDatabase::connect(&url, 2).await.unwrap();
            db.create_user(record("alice")).await.unwrap();
        }

        let db = SqliteDatabase::connect(&url, 2).await.unwrap();
        let creds = db.get_credentials("alice").await.unwrap().unwrap();
        assert_eq!(creds.user.username, "alice");
        assert_eq!(creds.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_failed_token_insert_rolls_back_user() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        db.create_user_with_token(record("alice"), "shared-key").await.unwrap();

        let err = db
            .create_user_with_token(record("bob"), "shared-key")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(db.get_credentials("bob").await.unwrap().is_none());

        let bob = db.create_user_with_token(record("bob"), "bob-key").await.unwrap();
        assert_eq!(db.get_user_by_token("bob-key").await.unwrap().unwrap().id, bob.id);
    }

    #[tokio::test]
    async fn test_get_or_create_token_keeps_first_key() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db.create_user(record("alice")).await.unwrap();

        let first = db.get_or_create_token(alice.id, "first").await.unwrap();
        let second = db.get_or_create_token(alice.id, "second").await.unwrap();
        assert_eq!(first, "first");
        assert_eq!(second, "first");
        assert!(db.get_user_by_token("second").await.unwrap().is_none());

        let err = db.get_or_create_token(999, "orphan").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_profile_fields_are_stored_as_null() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = db
            .create_user(UserRecord {
                email: Some("alice@example.com".into()),
                profile_picture: Some("https://example.com/a.png".into()),
                ..record("alice")
            })
            .await
            .unwrap();

        let untouched = db
            .update_profile(
                alice.id,
                ProfileChanges {
                    bio: Some("hi".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(untouched.email.as_deref(), Some("alice@example.com"));

        let cleared = db
            .update_profile(
                alice.id,
                ProfileChanges {
                    email: Some(String::new()),
                    profile_picture: Some(" ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.email, None);
        assert_eq!(cleared.profile_picture, None);
        assert_eq!(cleared.bio, "hi");
    }

    #[tokio::test]
    async fn test_feed_listing_under_concurrent_writes() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("feed.db").display());
        let db = Arc::new(SqliteDatabase::connect(&url, 4).await.unwrap());
        let alice = db.create_user(record("alice")).await.unwrap().id;
        let bob = db.create_user(record("bob")).await.unwrap().id;

        let mut tasks = JoinSet::new();
        for _ in 0..20 {
            let db = db.clone();
            tasks.spawn(async move {
                db.create_notification(NewNotification {
                    recipient_id: alice,
                    actor_id: bob,
                    verb: crate::entities::NotificationVerb::Followed,
                    target: NotificationTarget::User(bob),
                })
                .await
                .map(|_| 0)
            });
        }
        for _ in 0..5 {
            let db = db.clone();
            tasks.spawn(async move {
                db.list_notifications_and_mark_read(alice).await.map(|views| {
                    views.iter().filter(|v| !v.notification.is_read).count()
                })
            });
        }

        let mut delivered_unread = 0;
        while let Some(result) = tasks.join_next().await {
            delivered_unread += result.unwrap().unwrap();
        }
        let last = db.list_notifications_and_mark_read(alice).await.unwrap();
        delivered_unread += last.iter().filter(|v| !v.notification.is_read).count();

        assert_eq!(last.len(), 20);
        assert_eq!(delivered_unread, 20);
        assert_eq!(db.count_unread_notifications(alice).await.unwrap(), 0);
    }
}
