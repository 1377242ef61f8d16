use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use hirewire_db::models::{Call, NotificationType, User};
use std::sync::Arc;
use tracing::warn;

use crate::dao::notification::NotificationDao;
use crate::store::{StoreError, StoreResult};

/// Delivery seam for the notification collaborator. Best-effort: callers
/// never propagate sink failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create_notification(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        title: String,
        content: String,
        metadata: bson::Document,
    ) -> StoreResult<()>;
}

#[async_trait]
impl NotificationSink for NotificationDao {
    async fn create_notification(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        title: String,
        content: String,
        metadata: bson::Document,
    ) -> StoreResult<()> {
        self.create(user_id, notification_type, title, content, metadata)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }
}

/// Fire-and-forget dispatcher for call notices. Failures are logged and
/// swallowed so they never abort the primary operation.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub async fn call_invite(&self, user_id: ObjectId, call: &Call, from: &User) {
        let title = format!("{} is inviting you to a call", from.display_name);
        let content = call
            .title
            .clone()
            .unwrap_or_else(|| "Incoming call".to_string());
        self.deliver(
            user_id,
            NotificationType::CallInvite,
            title,
            content,
            call_metadata(call),
        )
        .await;
    }

    pub async fn huddle_started(&self, user_id: ObjectId, call: &Call, from: &User) {
        let title = format!("{} started a huddle", from.display_name);
        let content = call
            .title
            .clone()
            .unwrap_or_else(|| "Huddle in your channel".to_string());
        self.deliver(
            user_id,
            NotificationType::CallInvite,
            title,
            content,
            call_metadata(call),
        )
        .await;
    }

    pub async fn call_ended(&self, user_id: ObjectId, call: &Call) {
        let content = match call.total_duration {
            Some(secs) => format!("Call lasted {secs} seconds"),
            None => "Call ended".to_string(),
        };
        self.deliver(
            user_id,
            NotificationType::CallEnded,
            "Call ended".to_string(),
            content,
            call_metadata(call),
        )
        .await;
    }

    pub async fn recording_started(&self, user_id: ObjectId, call: &Call) {
        self.deliver(
            user_id,
            NotificationType::RecordingStarted,
            "Recording started".to_string(),
            "This call is now being recorded".to_string(),
            call_metadata(call),
        )
        .await;
    }

    async fn deliver(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        title: String,
        content: String,
        metadata: bson::Document,
    ) {
        if let Err(e) = self
            .sink
            .create_notification(user_id, notification_type, title, content, metadata)
            .await
        {
            warn!(%user_id, %e, "Failed to deliver notification");
        }
    }
}

fn call_metadata(call: &Call) -> bson::Document {
    doc! {
        "call_id": call.id.map(|id| id.to_hex()).unwrap_or_default(),
        "room_id": &call.room_id,
        "workspace_id": call.workspace_id.to_hex(),
    }
}
