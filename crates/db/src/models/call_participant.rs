use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// One user's membership in one call. Unique per `(call_id, user_id)`;
/// departures are marked `disconnected` rather than deleted so the row
/// remains observable after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParticipant {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub call_id: ObjectId,
    pub user_id: ObjectId,
    pub status: ParticipantStatus,
    #[serde(default)]
    pub audio_enabled: bool,
    #[serde(default)]
    pub video_enabled: bool,
    #[serde(default)]
    pub screen_sharing: bool,
    pub recording_consent: Option<bool>,
    pub consent_given_at: Option<DateTime>,
    pub network_quality: Option<String>,
    pub avg_bitrate: Option<f64>,
    pub packet_loss: Option<f64>,
    pub avg_latency: Option<f64>,
    /// First promotion to `connected`. Host reassignment picks the earliest.
    pub joined_at: Option<DateTime>,
    pub left_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl CallParticipant {
    pub const COLLECTION: &'static str = "call_participants";

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            ParticipantStatus::Connecting | ParticipantStatus::Connected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Invited,
    Connecting,
    Connected,
    Disconnected,
}
