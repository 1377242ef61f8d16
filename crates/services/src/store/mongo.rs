use async_trait::async_trait;
use bson::{DateTime, Document, doc, oid::ObjectId};
use hirewire_db::models::{Call, CallParticipant, Channel, User};
use mongodb::Database;

use super::{CallPatch, CallStore, ParticipantPatch, StoreError, StoreResult};
use crate::dao::base::DaoError;
use crate::dao::call::CallDao;
use crate::dao::channel::ChannelDao;
use crate::dao::user::UserDao;

/// Production `CallStore` backed by the MongoDB DAO layer.
pub struct MongoCallStore {
    pub users: UserDao,
    pub channels: ChannelDao,
    pub calls: CallDao,
}

impl MongoCallStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: UserDao::new(db),
            channels: ChannelDao::new(db),
            calls: CallDao::new(db),
        }
    }
}

#[async_trait]
impl CallStore for MongoCallStore {
    async fn get_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self.users.find_by_id(id).await?)
    }

    async fn get_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>> {
        Ok(self.users.find_by_ids(ids).await?)
    }

    async fn get_channel(&self, id: ObjectId) -> StoreResult<Option<Channel>> {
        Ok(self.channels.find_by_id(id).await?)
    }

    async fn user_has_channel_access(
        &self,
        user_id: ObjectId,
        channel_id: ObjectId,
    ) -> StoreResult<bool> {
        Ok(self.channels.has_access(channel_id, user_id).await?)
    }

    async fn get_channel_members(&self, channel_id: ObjectId) -> StoreResult<Vec<ObjectId>> {
        Ok(self.channels.find_member_user_ids(channel_id).await?)
    }

    async fn create_call(&self, call: Call) -> StoreResult<Call> {
        Ok(self.calls.create(call).await?)
    }

    async fn get_call(&self, id: ObjectId) -> StoreResult<Option<Call>> {
        Ok(self.calls.find_by_id(id).await?)
    }

    async fn get_call_by_room_id(&self, room_id: &str) -> StoreResult<Option<Call>> {
        Ok(self.calls.find_by_room_id(room_id).await?)
    }

    async fn update_call(&self, id: ObjectId, patch: CallPatch) -> StoreResult<Call> {
        let set = call_patch_doc(&patch)?;
        Ok(self.calls.update_call(id, doc! { "$set": set }).await?)
    }

    async fn get_active_calls(&self, workspace_id: ObjectId) -> StoreResult<Vec<Call>> {
        Ok(self.calls.find_active_by_workspace(workspace_id).await?)
    }

    async fn user_in_call(&self, user_id: ObjectId) -> StoreResult<Option<Call>> {
        Ok(self.calls.find_active_for_user(user_id).await?)
    }

    async fn stale_pending_calls(&self, created_before: DateTime) -> StoreResult<Vec<Call>> {
        Ok(self.calls.find_stale_pending(created_before).await?)
    }

    async fn add_participant(
        &self,
        participant: CallParticipant,
    ) -> StoreResult<CallParticipant> {
        Ok(self.calls.add_participant(participant).await?)
    }

    async fn get_participants(&self, call_id: ObjectId) -> StoreResult<Vec<CallParticipant>> {
        Ok(self.calls.find_participants(call_id).await?)
    }

    async fn get_participant(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> StoreResult<Option<CallParticipant>> {
        Ok(self.calls.find_participant(call_id, user_id).await?)
    }

    async fn update_participant(
        &self,
        id: ObjectId,
        patch: ParticipantPatch,
    ) -> StoreResult<CallParticipant> {
        let set = participant_patch_doc(&patch)?;
        Ok(self
            .calls
            .update_participant(id, doc! { "$set": set })
            .await?)
    }
}

fn call_patch_doc(patch: &CallPatch) -> Result<Document, StoreError> {
    let mut set = Document::new();
    if let Some(status) = patch.status {
        set.insert("status", to_bson(&status)?);
    }
    if let Some(initiator_id) = patch.initiator_id {
        set.insert("initiator_id", initiator_id);
    }
    if let Some(ref title) = patch.title {
        set.insert("title", title);
    }
    if let Some(max) = patch.max_participants {
        set.insert("max_participants", max as i64);
    }
    if let Some(recording) = patch.is_recording {
        set.insert("is_recording", recording);
    }
    if let Some(at) = patch.recording_started_at {
        set.insert("recording_started_at", at);
    }
    if let Some(at) = patch.recording_stopped_at {
        set.insert("recording_stopped_at", at);
    }
    if let Some(at) = patch.started_at {
        set.insert("started_at", at);
    }
    if let Some(at) = patch.ended_at {
        set.insert("ended_at", at);
    }
    if let Some(duration) = patch.total_duration {
        set.insert("total_duration", duration);
    }
    if let Some((ref user_hex, ref metrics)) = patch.merge_quality {
        set.insert(format!("quality_metrics.{user_hex}"), to_bson(metrics)?);
    }
    set.insert("updated_at", DateTime::now());
    Ok(set)
}

fn participant_patch_doc(patch: &ParticipantPatch) -> Result<Document, StoreError> {
    let mut set = Document::new();
    if let Some(status) = patch.status {
        set.insert("status", to_bson(&status)?);
    }
    if let Some(audio) = patch.audio_enabled {
        set.insert("audio_enabled", audio);
    }
    if let Some(video) = patch.video_enabled {
        set.insert("video_enabled", video);
    }
    if let Some(sharing) = patch.screen_sharing {
        set.insert("screen_sharing", sharing);
    }
    if let Some(consent) = patch.recording_consent {
        set.insert("recording_consent", consent);
    }
    if let Some(at) = patch.consent_given_at {
        set.insert("consent_given_at", at);
    }
    if let Some(ref quality) = patch.network_quality {
        set.insert("network_quality", quality);
    }
    if let Some(bitrate) = patch.avg_bitrate {
        set.insert("avg_bitrate", bitrate);
    }
    if let Some(loss) = patch.packet_loss {
        set.insert("packet_loss", loss);
    }
    if let Some(latency) = patch.avg_latency {
        set.insert("avg_latency", latency);
    }
    if let Some(at) = patch.joined_at {
        set.insert("joined_at", at);
    }
    if let Some(at) = patch.left_at {
        set.insert("left_at", at);
    }
    set.insert("updated_at", DateTime::now());
    Ok(set)
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<bson::Bson, StoreError> {
    bson::to_bson(value)
        .map_err(DaoError::BsonSer)
        .map_err(StoreError::from)
}
