//! In-memory `CallStore` + `NotificationSink` so the suite exercises the
//! real server without a MongoDB instance. Mirrors the patch semantics of
//! the Mongo implementation.

use async_trait::async_trait;
use bson::{DateTime, oid::ObjectId};
use hirewire_db::models::{
    Call, CallParticipant, CallStatus, Channel, ChannelMember, Notification, NotificationType,
    ParticipantStatus, User,
};
use hirewire_services::notify::NotificationSink;
use hirewire_services::store::{
    CallPatch, CallStore, ParticipantPatch, StoreError, StoreResult,
};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    users: HashMap<ObjectId, User>,
    channels: HashMap<ObjectId, Channel>,
    channel_members: Vec<ChannelMember>,
    calls: HashMap<ObjectId, Call>,
    // Insertion order doubles as the created_at tie-break.
    participants: Vec<CallParticipant>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryCallStore {
    inner: Mutex<Inner>,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding / assertion helpers ─────────────────────────────

    pub fn seed_user(&self, username: &str, is_admin: bool) -> User {
        let now = DateTime::now();
        let user = User {
            id: Some(ObjectId::new()),
            email: format!("{username}@example.com"),
            username: username.to_string(),
            display_name: username.to_string(),
            avatar: None,
            is_admin,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .users
            .insert(user.id.unwrap(), user.clone());
        user
    }

    pub fn seed_channel(
        &self,
        workspace_id: ObjectId,
        name: &str,
        is_private: bool,
        members: &[ObjectId],
    ) -> Channel {
        let now = DateTime::now();
        let channel = Channel {
            id: Some(ObjectId::new()),
            workspace_id,
            name: name.to_string(),
            is_private,
            created_at: now,
        };
        let channel_id = channel.id.unwrap();
        let mut inner = self.inner.lock();
        inner.channels.insert(channel_id, channel.clone());
        for user_id in members {
            inner.channel_members.push(ChannelMember {
                id: Some(ObjectId::new()),
                channel_id,
                user_id: *user_id,
                created_at: now,
            });
        }
        channel
    }

    pub fn notifications_for(&self, user_id: ObjectId) -> Vec<Notification> {
        self.inner
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn call(&self, call_id: ObjectId) -> Option<Call> {
        self.inner.lock().calls.get(&call_id).cloned()
    }

    pub fn participant(&self, call_id: ObjectId, user_id: ObjectId) -> Option<CallParticipant> {
        self.inner
            .lock()
            .participants
            .iter()
            .find(|p| p.call_id == call_id && p.user_id == user_id)
            .cloned()
    }
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn get_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn get_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>> {
        let inner = self.inner.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.users.get(id).cloned())
            .collect())
    }

    async fn get_channel(&self, id: ObjectId) -> StoreResult<Option<Channel>> {
        Ok(self.inner.lock().channels.get(&id).cloned())
    }

    async fn user_has_channel_access(
        &self,
        user_id: ObjectId,
        channel_id: ObjectId,
    ) -> StoreResult<bool> {
        let inner = self.inner.lock();
        let Some(channel) = inner.channels.get(&channel_id) else {
            return Ok(false);
        };
        if !channel.is_private {
            return Ok(true);
        }
        Ok(inner
            .channel_members
            .iter()
            .any(|m| m.channel_id == channel_id && m.user_id == user_id))
    }

    async fn get_channel_members(&self, channel_id: ObjectId) -> StoreResult<Vec<ObjectId>> {
        Ok(self
            .inner
            .lock()
            .channel_members
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .map(|m| m.user_id)
            .collect())
    }

    async fn create_call(&self, mut call: Call) -> StoreResult<Call> {
        let id = ObjectId::new();
        call.id = Some(id);
        self.inner.lock().calls.insert(id, call.clone());
        Ok(call)
    }

    async fn get_call(&self, id: ObjectId) -> StoreResult<Option<Call>> {
        Ok(self.inner.lock().calls.get(&id).cloned())
    }

    async fn get_call_by_room_id(&self, room_id: &str) -> StoreResult<Option<Call>> {
        Ok(self
            .inner
            .lock()
            .calls
            .values()
            .find(|c| c.room_id == room_id)
            .cloned())
    }

    async fn update_call(&self, id: ObjectId, patch: CallPatch) -> StoreResult<Call> {
        let mut inner = self.inner.lock();
        let call = inner.calls.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(status) = patch.status {
            call.status = status;
        }
        if let Some(initiator_id) = patch.initiator_id {
            call.initiator_id = initiator_id;
        }
        if let Some(title) = patch.title {
            call.title = Some(title);
        }
        if let Some(max) = patch.max_participants {
            call.max_participants = max;
        }
        if let Some(recording) = patch.is_recording {
            call.is_recording = recording;
        }
        if let Some(at) = patch.recording_started_at {
            call.recording_started_at = Some(at);
        }
        if let Some(at) = patch.recording_stopped_at {
            call.recording_stopped_at = Some(at);
        }
        if let Some(at) = patch.started_at {
            call.started_at = Some(at);
        }
        if let Some(at) = patch.ended_at {
            call.ended_at = Some(at);
        }
        if let Some(duration) = patch.total_duration {
            call.total_duration = Some(duration);
        }
        if let Some((user_hex, metrics)) = patch.merge_quality {
            call.quality_metrics.insert(user_hex, metrics);
        }
        call.updated_at = DateTime::now();
        Ok(call.clone())
    }

    async fn get_active_calls(&self, workspace_id: ObjectId) -> StoreResult<Vec<Call>> {
        Ok(self
            .inner
            .lock()
            .calls
            .values()
            .filter(|c| c.workspace_id == workspace_id && c.status != CallStatus::Ended)
            .cloned()
            .collect())
    }

    async fn user_in_call(&self, user_id: ObjectId) -> StoreResult<Option<Call>> {
        let inner = self.inner.lock();
        for p in &inner.participants {
            let active = matches!(
                p.status,
                ParticipantStatus::Connecting | ParticipantStatus::Connected
            );
            if p.user_id == user_id && active {
                if let Some(call) = inner.calls.get(&p.call_id) {
                    if call.status != CallStatus::Ended {
                        return Ok(Some(call.clone()));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn stale_pending_calls(&self, created_before: DateTime) -> StoreResult<Vec<Call>> {
        Ok(self
            .inner
            .lock()
            .calls
            .values()
            .filter(|c| c.status == CallStatus::Pending && c.created_at < created_before)
            .cloned()
            .collect())
    }

    async fn add_participant(
        &self,
        mut participant: CallParticipant,
    ) -> StoreResult<CallParticipant> {
        let mut inner = self.inner.lock();
        if inner
            .participants
            .iter()
            .any(|p| p.call_id == participant.call_id && p.user_id == participant.user_id)
        {
            return Err(StoreError::Duplicate(
                "participant already exists".to_string(),
            ));
        }
        participant.id = Some(ObjectId::new());
        inner.participants.push(participant.clone());
        Ok(participant)
    }

    async fn get_participants(&self, call_id: ObjectId) -> StoreResult<Vec<CallParticipant>> {
        Ok(self
            .inner
            .lock()
            .participants
            .iter()
            .filter(|p| p.call_id == call_id)
            .cloned()
            .collect())
    }

    async fn get_participant(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> StoreResult<Option<CallParticipant>> {
        Ok(self
            .inner
            .lock()
            .participants
            .iter()
            .find(|p| p.call_id == call_id && p.user_id == user_id)
            .cloned())
    }

    async fn update_participant(
        &self,
        id: ObjectId,
        patch: ParticipantPatch,
    ) -> StoreResult<CallParticipant> {
        let mut inner = self.inner.lock();
        let participant = inner
            .participants
            .iter_mut()
            .find(|p| p.id == Some(id))
            .ok_or(StoreError::NotFound)?;

        if let Some(status) = patch.status {
            participant.status = status;
        }
        if let Some(audio) = patch.audio_enabled {
            participant.audio_enabled = audio;
        }
        if let Some(video) = patch.video_enabled {
            participant.video_enabled = video;
        }
        if let Some(sharing) = patch.screen_sharing {
            participant.screen_sharing = sharing;
        }
        if let Some(consent) = patch.recording_consent {
            participant.recording_consent = Some(consent);
        }
        if let Some(at) = patch.consent_given_at {
            participant.consent_given_at = Some(at);
        }
        if let Some(quality) = patch.network_quality {
            participant.network_quality = Some(quality);
        }
        if let Some(bitrate) = patch.avg_bitrate {
            participant.avg_bitrate = Some(bitrate);
        }
        if let Some(loss) = patch.packet_loss {
            participant.packet_loss = Some(loss);
        }
        if let Some(latency) = patch.avg_latency {
            participant.avg_latency = Some(latency);
        }
        if let Some(at) = patch.joined_at {
            participant.joined_at = Some(at);
        }
        if let Some(at) = patch.left_at {
            participant.left_at = Some(at);
        }
        participant.updated_at = DateTime::now();
        Ok(participant.clone())
    }
}

#[async_trait]
impl NotificationSink for MemoryCallStore {
    async fn create_notification(
        &self,
        user_id: ObjectId,
        notification_type: NotificationType,
        title: String,
        content: String,
        metadata: bson::Document,
    ) -> StoreResult<()> {
        self.inner.lock().notifications.push(Notification {
            id: Some(ObjectId::new()),
            user_id,
            notification_type,
            title,
            content,
            metadata,
            is_read: false,
            read_at: None,
            created_at: DateTime::now(),
        });
        Ok(())
    }
}
