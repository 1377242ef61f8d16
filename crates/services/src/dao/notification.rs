use bson::{DateTime, Document, doc, oid::ObjectId};
use hirewire_db::models::{Notification, NotificationType};
use mongodb::Database;

use super::base::{BaseDao, DaoResult};

pub struct NotificationDao {
    pub base: BaseDao<Notification>,
}

impl NotificationDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Notification::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        title: String,
        content: String,
        metadata: Document,
    ) -> DaoResult<Notification> {
        let notification = Notification {
            id: None,
            user_id,
            notification_type,
            title,
            content,
            metadata,
            is_read: false,
            read_at: None,
            created_at: DateTime::now(),
        };
        let id = self.base.insert_one(&notification).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_for_user(&self, user_id: ObjectId) -> DaoResult<Vec<Notification>> {
        self.base
            .find_many(
                doc! { "user_id": user_id },
                Some(doc! { "created_at": -1 }),
            )
            .await
    }

    pub async fn unread_count(&self, user_id: ObjectId) -> DaoResult<u64> {
        self.base
            .count(doc! { "user_id": user_id, "is_read": false })
            .await
    }

    pub async fn mark_read(&self, notification_id: ObjectId, user_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": notification_id, "user_id": user_id },
                doc! { "$set": { "is_read": true, "read_at": DateTime::now() } },
            )
            .await
    }
}
