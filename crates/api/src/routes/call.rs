use axum::{
    Json,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use hirewire_db::models::{Call, CallParticipant, CallStatus, CallType, IceServer, ParticipantStatus};
use hirewire_services::call::{
    MediaConstraints, MediaToggle, QualityReport, SettingsUpdate, StartCallInput,
};
use hirewire_services::store::UserSummary;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

// ── DTOs ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct StartCallRequest {
    pub channel_id: Option<String>,
    pub call_type: CallType,
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[validate(range(min = 2, max = 100))]
    pub max_participants: Option<u32>,
    pub scheduled_for: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinCallRequest {
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(range(min = 2, max = 100))]
    pub max_participants: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleMediaRequest {
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    pub consent: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsRequest {
    pub bitrate: Option<f64>,
    pub packet_loss: Option<f64>,
    pub latency: Option<f64>,
    pub network_quality: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallResponse {
    pub id: String,
    pub workspace_id: String,
    pub channel_id: Option<String>,
    pub initiator_id: String,
    pub call_type: CallType,
    pub title: Option<String>,
    pub room_id: String,
    pub status: CallStatus,
    pub max_participants: u32,
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<IceServer>,
    pub is_recording: bool,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub total_duration: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ParticipantResponse {
    pub user_id: String,
    pub status: ParticipantStatus,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
    pub recording_consent: Option<bool>,
    pub network_quality: Option<String>,
    pub avg_bitrate: Option<f64>,
    pub packet_loss: Option<f64>,
    pub avg_latency: Option<f64>,
    pub joined_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct JoinCallResponse {
    pub call: CallResponse,
    pub participant: ParticipantResponse,
}

#[derive(Debug, Serialize)]
pub struct CallDetailResponse {
    #[serde(flatten)]
    pub call: CallResponse,
    pub participants: Vec<ParticipantResponse>,
}

// ── Handlers ────────────────────────────────────────────────────

pub async fn start(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<String>,
    Json(body): Json<StartCallRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    body.validate()?;
    let workspace_id = parse_oid(&workspace_id, "workspace_id")?;
    let channel_id = body
        .channel_id
        .as_deref()
        .map(|id| parse_oid(id, "channel_id"))
        .transpose()?;
    let participants = body
        .participants
        .iter()
        .map(|id| parse_oid(id, "participants"))
        .collect::<Result<Vec<_>, _>>()?;

    let call = state
        .calls
        .start_call(
            auth.user_id,
            StartCallInput {
                workspace_id,
                channel_id,
                call_type: body.call_type,
                title: body.title,
                participants,
                max_participants: body.max_participants,
                scheduled_for: body.scheduled_for.map(bson::DateTime::from_chrono),
            },
        )
        .await?;

    Ok(Json(to_call_response(&call)))
}

pub async fn active(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(workspace_id): Path<String>,
) -> Result<Json<Vec<CallResponse>>, ApiError> {
    let workspace_id = parse_oid(&workspace_id, "workspace_id")?;
    let calls = state.calls.get_active_calls(workspace_id).await?;
    Ok(Json(calls.iter().map(to_call_response).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
) -> Result<Json<CallDetailResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let detail = state.calls.get_call_with_participants(call_id).await?;

    Ok(Json(CallDetailResponse {
        call: to_call_response(&detail.call),
        participants: detail
            .participants
            .into_iter()
            .map(|(p, user)| to_participant_response(&p, user))
            .collect(),
    }))
}

pub async fn join(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
    Json(body): Json<JoinCallRequest>,
) -> Result<Json<JoinCallResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;

    let (call, participant) = state
        .calls
        .join_call(
            call_id,
            auth.user_id,
            MediaConstraints {
                audio_enabled: body.audio_enabled,
                video_enabled: body.video_enabled,
            },
        )
        .await?;

    Ok(Json(JoinCallResponse {
        call: to_call_response(&call),
        participant: to_participant_response(&participant, None),
    }))
}

pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let room_id = state
        .store
        .get_call(call_id)
        .await?
        .map(|c| c.room_id)
        .unwrap_or_default();

    let outcome = state.calls.leave_call(call_id, auth.user_id).await?;

    // Keep the room topology in step with the store: drop the leaver's
    // peers, or tear the whole room down if the call drained.
    match &outcome.ended {
        Some(ended) => state.registry.teardown(&ended.room_id, "call_ended").await,
        None => state.registry.disconnect_user(&room_id, auth.user_id).await,
    }

    Ok(Json(serde_json::json!({
        "left": true,
        "ended": outcome.ended.is_some(),
        "new_host": outcome.new_host.map(|id| id.to_hex()),
    })))
}

pub async fn end(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
) -> Result<Json<CallResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let call = state.calls.end_call(call_id, auth.user_id).await?;
    state.registry.teardown(&call.room_id, "ended_by_host").await;
    Ok(Json(to_call_response(&call)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    body.validate()?;
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let call = state
        .calls
        .update_settings(
            call_id,
            auth.user_id,
            SettingsUpdate {
                title: body.title,
                max_participants: body.max_participants,
            },
        )
        .await?;
    Ok(Json(to_call_response(&call)))
}

pub async fn toggle_media(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
    Json(body): Json<ToggleMediaRequest>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let participant = state
        .calls
        .toggle_media(
            call_id,
            auth.user_id,
            MediaToggle {
                audio_enabled: body.audio_enabled,
                video_enabled: body.video_enabled,
            },
        )
        .await?;

    if let Some(room_id) = room_id_of(&state, call_id).await? {
        state
            .registry
            .broadcast_media_update(&room_id, auth.user_id, &participant, "media_status_changed")
            .await;
    }

    Ok(Json(to_participant_response(&participant, None)))
}

pub async fn start_screen_share(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let participant = state.calls.start_screen_share(call_id, auth.user_id).await?;

    if let Some(room_id) = room_id_of(&state, call_id).await? {
        state
            .registry
            .broadcast_media_update(
                &room_id,
                auth.user_id,
                &participant,
                "screen_share_status_changed",
            )
            .await;
    }

    Ok(Json(to_participant_response(&participant, None)))
}

pub async fn stop_screen_share(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let participant = state.calls.stop_screen_share(call_id, auth.user_id).await?;

    if let Some(room_id) = room_id_of(&state, call_id).await? {
        state
            .registry
            .broadcast_media_update(
                &room_id,
                auth.user_id,
                &participant,
                "screen_share_status_changed",
            )
            .await;
    }

    Ok(Json(to_participant_response(&participant, None)))
}

pub async fn record_consent(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
    Json(body): Json<ConsentRequest>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let participant = state
        .calls
        .record_consent(call_id, auth.user_id, body.consent)
        .await?;
    Ok(Json(to_participant_response(&participant, None)))
}

pub async fn update_metrics(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((workspace_id, call_id)): Path<(String, String)>,
    Json(body): Json<MetricsRequest>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let call_id = scoped_call_id(&state, &workspace_id, &call_id).await?;
    let participant = state
        .calls
        .update_quality_metrics(
            call_id,
            auth.user_id,
            QualityReport {
                bitrate: body.bitrate,
                packet_loss: body.packet_loss,
                latency: body.latency,
                network_quality: body.network_quality,
            },
        )
        .await?;
    Ok(Json(to_participant_response(&participant, None)))
}

// ── Helpers ─────────────────────────────────────────────────────

fn parse_oid(value: &str, field: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::BadRequest(format!("Invalid {field}")))
}

/// Resolves the call id while pinning it to the workspace in the path.
async fn scoped_call_id(
    state: &AppState,
    workspace_id: &str,
    call_id: &str,
) -> Result<ObjectId, ApiError> {
    let workspace_id = parse_oid(workspace_id, "workspace_id")?;
    let call_id = parse_oid(call_id, "call_id")?;
    match state.store.get_call(call_id).await? {
        Some(call) if call.workspace_id == workspace_id => Ok(call_id),
        _ => Err(ApiError::NotFound("call not found".to_string())),
    }
}

async fn room_id_of(state: &AppState, call_id: ObjectId) -> Result<Option<String>, ApiError> {
    Ok(state.store.get_call(call_id).await?.map(|c| c.room_id))
}

fn to_call_response(call: &Call) -> CallResponse {
    CallResponse {
        id: call.id.map(|id| id.to_hex()).unwrap_or_default(),
        workspace_id: call.workspace_id.to_hex(),
        channel_id: call.channel_id.map(|id| id.to_hex()),
        initiator_id: call.initiator_id.to_hex(),
        call_type: call.call_type,
        title: call.title.clone(),
        room_id: call.room_id.clone(),
        status: call.status,
        max_participants: call.max_participants,
        stun_servers: call.stun_servers.clone(),
        turn_servers: call.turn_servers.clone(),
        is_recording: call.is_recording,
        started_at: call.started_at.map(rfc3339),
        ended_at: call.ended_at.map(rfc3339),
        total_duration: call.total_duration,
        created_at: rfc3339(call.created_at),
    }
}

fn to_participant_response(
    participant: &CallParticipant,
    user: Option<UserSummary>,
) -> ParticipantResponse {
    ParticipantResponse {
        user_id: participant.user_id.to_hex(),
        status: participant.status,
        audio_enabled: participant.audio_enabled,
        video_enabled: participant.video_enabled,
        screen_sharing: participant.screen_sharing,
        recording_consent: participant.recording_consent,
        network_quality: participant.network_quality.clone(),
        avg_bitrate: participant.avg_bitrate,
        packet_loss: participant.packet_loss,
        avg_latency: participant.avg_latency,
        joined_at: participant.joined_at.map(rfc3339),
        user,
    }
}

fn rfc3339(dt: bson::DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}
