// NotificationService - the recipient's notification feed

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::entities::NotificationView;
use crate::error::AppResult;
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::viewer::ViewerContext;

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<dyn DatabaseInterface>,
}

impl NotificationService {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    /// Newest first. Everything returned is marked read, but the response shows
    /// the flags as they were, so each notification is seen unread exactly once.
    #[instrument(skip(self, vc), fields(request_id = %vc.request_id))]
    pub async fn list_and_mark_read(&self, vc: &ViewerContext) -> AppResult<Vec<NotificationView>> {
        let user = vc.require_user()?;
        let notifications = self.db.list_notifications_and_mark_read(user.id).await?;
        debug!(
            recipient_id = user.id,
            count = notifications.len(),
            "Listed notifications"
        );
        Ok(notifications)
    }

    pub async fn unread_count(&self, vc: &ViewerContext) -> AppResult<u64> {
        let user = vc.require_user()?;
        self.db.count_unread_notifications(user.id).await
    }
}
