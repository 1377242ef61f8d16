pub mod mongo;

use async_trait::async_trait;
use bson::{DateTime, oid::ObjectId};
use hirewire_db::models::{
    Call, CallParticipant, CallStatus, Channel, ParticipantStatus, QualityMetrics, User,
};
use serde::Serialize;
use thiserror::Error;

use crate::dao::base::DaoError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<DaoError> for StoreError {
    fn from(err: DaoError) -> Self {
        match err {
            DaoError::NotFound => StoreError::NotFound,
            DaoError::DuplicateKey(msg) => StoreError::Duplicate(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Field-level update to a call record. `None` leaves the field untouched.
#[derive(Debug, Default, Clone)]
pub struct CallPatch {
    pub status: Option<CallStatus>,
    pub initiator_id: Option<ObjectId>,
    pub title: Option<String>,
    pub max_participants: Option<u32>,
    pub is_recording: Option<bool>,
    pub recording_started_at: Option<DateTime>,
    pub recording_stopped_at: Option<DateTime>,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    pub total_duration: Option<i64>,
    /// Last-write-wins merge into `Call.quality_metrics`, keyed by user id hex.
    pub merge_quality: Option<(String, QualityMetrics)>,
}

#[derive(Debug, Default, Clone)]
pub struct ParticipantPatch {
    pub status: Option<ParticipantStatus>,
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
    pub screen_sharing: Option<bool>,
    pub recording_consent: Option<bool>,
    pub consent_given_at: Option<DateTime>,
    pub network_quality: Option<String>,
    pub avg_bitrate: Option<f64>,
    pub packet_loss: Option<f64>,
    pub avg_latency: Option<f64>,
    pub joined_at: Option<DateTime>,
    pub left_at: Option<DateTime>,
}

/// Profile summary attached to read-side participant listings.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

/// Durable call-data interface. The single source of truth for capacity and
/// membership decisions: both the lifecycle manager and the signaling
/// registry authorize against this, never against in-memory room state.
#[async_trait]
pub trait CallStore: Send + Sync {
    // Users / channels (read-only collaborators)
    async fn get_user(&self, id: ObjectId) -> StoreResult<Option<User>>;
    async fn get_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>>;
    async fn get_channel(&self, id: ObjectId) -> StoreResult<Option<Channel>>;
    async fn user_has_channel_access(
        &self,
        user_id: ObjectId,
        channel_id: ObjectId,
    ) -> StoreResult<bool>;
    async fn get_channel_members(&self, channel_id: ObjectId) -> StoreResult<Vec<ObjectId>>;

    // Calls
    async fn create_call(&self, call: Call) -> StoreResult<Call>;
    async fn get_call(&self, id: ObjectId) -> StoreResult<Option<Call>>;
    async fn get_call_by_room_id(&self, room_id: &str) -> StoreResult<Option<Call>>;
    async fn update_call(&self, id: ObjectId, patch: CallPatch) -> StoreResult<Call>;
    async fn get_active_calls(&self, workspace_id: ObjectId) -> StoreResult<Vec<Call>>;
    /// The non-ended call the user is currently active in, if any.
    async fn user_in_call(&self, user_id: ObjectId) -> StoreResult<Option<Call>>;
    /// Non-ended calls still `pending` and created before the cutoff.
    async fn stale_pending_calls(&self, created_before: DateTime) -> StoreResult<Vec<Call>>;

    // Participants
    async fn add_participant(&self, participant: CallParticipant)
    -> StoreResult<CallParticipant>;
    async fn get_participants(&self, call_id: ObjectId) -> StoreResult<Vec<CallParticipant>>;
    async fn get_participant(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> StoreResult<Option<CallParticipant>>;
    async fn update_participant(
        &self,
        id: ObjectId,
        patch: ParticipantPatch,
    ) -> StoreResult<CallParticipant>;
}
