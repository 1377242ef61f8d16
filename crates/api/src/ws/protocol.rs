//! Signaling wire protocol: one JSON envelope per message,
//! `{type, payload, targetPeerId?, roomId?}`, camelCase fields.
//! Negotiation payloads (SDP offers/answers, ICE candidates) pass through
//! opaque and unparsed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: ClientMessageType,
    #[serde(default)]
    pub payload: Value,
    pub target_peer_id: Option<String>,
    pub room_id: Option<String>,
}

/// Closed set of client-to-server message types. Anything else fails
/// envelope parsing and earns a `validation` error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessageType {
    JoinRoom,
    LeaveRoom,
    Offer,
    Answer,
    IceCandidate,
    MediaStatus,
    ScreenShareStatus,
    QualityReport,
    RecordingStatus,
}

impl ClientMessageType {
    /// Wire name, reused verbatim when forwarding negotiation messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientMessageType::JoinRoom => "join_room",
            ClientMessageType::LeaveRoom => "leave_room",
            ClientMessageType::Offer => "offer",
            ClientMessageType::Answer => "answer",
            ClientMessageType::IceCandidate => "ice_candidate",
            ClientMessageType::MediaStatus => "media_status",
            ClientMessageType::ScreenShareStatus => "screen_share_status",
            ClientMessageType::QualityReport => "quality_report",
            ClientMessageType::RecordingStatus => "recording_status",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinRoomPayload {
    pub call_id: Option<String>,
    pub room_id: Option<String>,
    pub media_constraints: Option<MediaConstraintsPayload>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaConstraintsPayload {
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatusPayload {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    #[serde(default)]
    pub screen_sharing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareStatusPayload {
    pub screen_sharing: bool,
    pub screen_stream_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityReportPayload {
    pub bitrate: Option<f64>,
    pub packet_loss: Option<f64>,
    pub latency: Option<f64>,
    pub network_quality: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatusPayload {
    pub recording: bool,
    pub consent: Option<bool>,
}

/// One peer as seen in `room_joined.existingPeers` and `peer_joined`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub peer_id: String,
    pub user_id: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
}

/// Serializes a server-to-client frame.
pub fn frame(kind: &str, payload: Value) -> String {
    serde_json::json!({ "type": kind, "payload": payload }).to_string()
}

/// A forwarded negotiation message: the untouched payload annotated with
/// the sending peer.
pub fn forwarded_frame(kind: &str, from_peer_id: &str, payload: &Value) -> String {
    serde_json::json!({
        "type": kind,
        "fromPeerId": from_peer_id,
        "payload": payload,
    })
    .to_string()
}

pub fn error_frame(code: &str, message: &str) -> String {
    frame(
        "error",
        serde_json::json!({ "code": code, "message": message }),
    )
}
