use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One real-time session. Exactly one non-ended call may reference a given
/// `room_id` at a time (unique sparse index, cleared on end).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub workspace_id: ObjectId,
    /// Bound channel; `None` for ad-hoc calls.
    pub channel_id: Option<ObjectId>,
    /// Current host. Reassigned when the host leaves and others remain.
    pub initiator_id: ObjectId,
    pub call_type: CallType,
    pub title: Option<String>,
    pub scheduled_for: Option<DateTime>,
    /// Unguessable token correlating the call to its ephemeral signaling room.
    pub room_id: String,
    pub status: CallStatus,
    pub max_participants: u32,
    /// ICE configuration snapshot captured at call start and handed to
    /// joining peers verbatim.
    #[serde(default)]
    pub stun_servers: Vec<String>,
    #[serde(default)]
    pub turn_servers: Vec<IceServer>,
    #[serde(default)]
    pub is_recording: bool,
    pub recording_started_at: Option<DateTime>,
    pub recording_stopped_at: Option<DateTime>,
    /// Last-reported metrics per participant, keyed by user id hex.
    #[serde(default)]
    pub quality_metrics: HashMap<String, QualityMetrics>,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    /// Seconds between first join and end, set once on end.
    pub total_duration: Option<i64>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Call {
    pub const COLLECTION: &'static str = "calls";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Voice,
    Video,
    Huddle,
    ScreenShare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Active,
    Ended,
}

/// One TURN entry of the ICE snapshot. Opaque to this core; serialized into
/// `room_joined` for clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub network_quality: Option<String>,
    pub avg_bitrate: Option<f64>,
    pub packet_loss: Option<f64>,
    pub avg_latency: Option<f64>,
    pub reported_at: DateTime,
}
