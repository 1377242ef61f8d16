use bson::{DateTime, oid::ObjectId};
use hirewire_config::{CallSettings, IceSettings};
use hirewire_db::models::{
    Call, CallParticipant, CallStatus, CallType, ParticipantStatus, QualityMetrics, User,
};
use nanoid::nanoid;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::CallError;
use super::locks::CallLocks;
use super::rules;
use crate::ice;
use crate::notify::Notifier;
use crate::store::{CallPatch, CallStore, ParticipantPatch, StoreError, UserSummary};

/// Length of the unguessable room token correlating a call to its
/// signaling room.
const ROOM_TOKEN_LEN: usize = 24;

#[derive(Debug, Clone)]
pub struct StartCallInput {
    pub workspace_id: ObjectId,
    pub channel_id: Option<ObjectId>,
    pub call_type: CallType,
    pub title: Option<String>,
    pub participants: Vec<ObjectId>,
    pub max_participants: Option<u32>,
    pub scheduled_for: Option<DateTime>,
}

/// Initial media state requested by a joiner. Unset fields fall back to the
/// call-type defaults (audio on, video on for video calls).
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaConstraints {
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MediaToggle {
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub title: Option<String>,
    pub max_participants: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    pub bitrate: Option<f64>,
    pub packet_loss: Option<f64>,
    pub latency: Option<f64>,
    pub network_quality: Option<String>,
}

#[derive(Debug, Default)]
pub struct LeaveOutcome {
    /// Set when this departure drained the call and ended it.
    pub ended: Option<Call>,
    /// Set when the host left and the role moved to another participant.
    pub new_host: Option<ObjectId>,
}

pub struct CallWithParticipants {
    pub call: Call,
    pub participants: Vec<(CallParticipant, Option<UserSummary>)>,
}

/// Owns the authoritative state transitions of calls and their
/// participants. Socket-free: the signaling registry calls into it and
/// handles its own fan-out. Every check-then-write sequence holds the
/// per-call lock from the shared [`CallLocks`] table.
pub struct CallManager {
    store: Arc<dyn CallStore>,
    notifier: Notifier,
    locks: Arc<CallLocks>,
    call_settings: CallSettings,
    ice_settings: IceSettings,
}

impl CallManager {
    pub fn new(
        store: Arc<dyn CallStore>,
        notifier: Notifier,
        locks: Arc<CallLocks>,
        call_settings: CallSettings,
        ice_settings: IceSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            locks,
            call_settings,
            ice_settings,
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────

    pub async fn start_call(
        &self,
        initiator_id: ObjectId,
        input: StartCallInput,
    ) -> Result<Call, CallError> {
        let initiator = self
            .store
            .get_user(initiator_id)
            .await?
            .ok_or(CallError::NotFound("user"))?;

        if self.store.user_in_call(initiator_id).await?.is_some() {
            return Err(CallError::Conflict(
                "user is already in an active call".to_string(),
            ));
        }

        if let Some(channel_id) = input.channel_id {
            self.store
                .get_channel(channel_id)
                .await?
                .ok_or(CallError::NotFound("channel"))?;
            if !self
                .store
                .user_has_channel_access(initiator_id, channel_id)
                .await?
            {
                return Err(CallError::Forbidden(
                    "no access to the bound channel".to_string(),
                ));
            }
        }

        let max_participants = match input.max_participants {
            Some(max) if max < 2 => {
                return Err(CallError::Validation(
                    "max_participants must be at least 2".to_string(),
                ));
            }
            Some(max) => max,
            None => self.call_settings.default_max_participants,
        };

        let (stun_servers, turn_servers) = ice::snapshot(&self.ice_settings, &initiator_id);

        let now = DateTime::now();
        let call = Call {
            id: None,
            workspace_id: input.workspace_id,
            channel_id: input.channel_id,
            initiator_id,
            call_type: input.call_type,
            title: input.title,
            scheduled_for: input.scheduled_for,
            room_id: nanoid!(ROOM_TOKEN_LEN),
            status: CallStatus::Pending,
            max_participants,
            stun_servers,
            turn_servers,
            is_recording: false,
            recording_started_at: None,
            recording_stopped_at: None,
            quality_metrics: Default::default(),
            started_at: None,
            ended_at: None,
            total_duration: None,
            created_at: now,
            updated_at: now,
        };
        let call = self.store.create_call(call).await?;
        let call_id = row_id(call.id)?;

        self.store
            .add_participant(new_participant(
                call_id,
                initiator_id,
                ParticipantStatus::Connecting,
                true,
                input.call_type == CallType::Video,
            ))
            .await?;

        // Invites are best-effort: an unknown id or a failed notice never
        // aborts call creation.
        let mut notified: HashSet<ObjectId> = HashSet::new();
        notified.insert(initiator_id);
        for user_id in &input.participants {
            if !notified.insert(*user_id) {
                continue;
            }
            match self.store.get_user(*user_id).await {
                Ok(Some(_)) => {
                    self.store
                        .add_participant(new_participant(
                            call_id,
                            *user_id,
                            ParticipantStatus::Invited,
                            false,
                            false,
                        ))
                        .await?;
                    self.notifier.call_invite(*user_id, &call, &initiator).await;
                }
                Ok(None) => warn!(%user_id, "Skipping invite for unknown user"),
                Err(e) => warn!(%user_id, %e, "Failed to look up invitee"),
            }
        }

        if input.call_type == CallType::Huddle {
            if let Some(channel_id) = input.channel_id {
                match self.store.get_channel_members(channel_id).await {
                    Ok(members) => {
                        for member_id in members {
                            if notified.insert(member_id) {
                                self.notifier
                                    .huddle_started(member_id, &call, &initiator)
                                    .await;
                            }
                        }
                    }
                    Err(e) => warn!(%channel_id, %e, "Failed to notify channel members"),
                }
            }
        }

        info!(call_id = %call_id, room_id = %call.room_id, "Call created");
        Ok(call)
    }

    pub async fn join_call(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
        media: MediaConstraints,
    ) -> Result<(Call, CallParticipant), CallError> {
        let _guard = self.locks.acquire(call_id).await;
        self.join_locked(call_id, user_id, media, ParticipantStatus::Connecting)
            .await
    }

    /// Transport-boundary join: the same validation as [`join_call`], but
    /// the participant lands directly in `connected` since the signaling
    /// channel is already up.
    pub async fn connect_participant(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
        media: MediaConstraints,
    ) -> Result<(Call, CallParticipant), CallError> {
        let _guard = self.locks.acquire(call_id).await;
        self.join_locked(call_id, user_id, media, ParticipantStatus::Connected)
            .await
    }

    async fn join_locked(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
        media: MediaConstraints,
        target: ParticipantStatus,
    ) -> Result<(Call, CallParticipant), CallError> {
        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        self.store
            .get_user(user_id)
            .await?
            .ok_or(CallError::NotFound("user"))?;

        rules::ensure_not_ended(&call)?;
        rules::ensure_not_in_other_call(call_id, self.store.user_in_call(user_id).await?.as_ref())?;

        if let Some(channel_id) = call.channel_id {
            if !self
                .store
                .user_has_channel_access(user_id, channel_id)
                .await?
            {
                return Err(CallError::Forbidden(
                    "no access to the bound channel".to_string(),
                ));
            }
        }

        let participants = self.store.get_participants(call_id).await?;
        let existing = participants.iter().find(|p| p.user_id == user_id);

        // A reconnecting participant already holds a seat.
        if existing.map(|p| p.status) != Some(ParticipantStatus::Connected) {
            rules::ensure_capacity(&call, &participants)?;
        }

        let audio = media.audio_enabled.unwrap_or(true);
        let video = media
            .video_enabled
            .unwrap_or(call.call_type == CallType::Video);

        let participant = match existing {
            Some(row) => {
                // A request-path join never demotes a peer the transport
                // already promoted.
                let status = if row.status == ParticipantStatus::Connected
                    && target == ParticipantStatus::Connecting
                {
                    ParticipantStatus::Connected
                } else {
                    target
                };
                let patch = ParticipantPatch {
                    status: Some(status),
                    audio_enabled: Some(audio),
                    video_enabled: Some(video),
                    joined_at: match (status, row.joined_at) {
                        (ParticipantStatus::Connected, None) => Some(DateTime::now()),
                        _ => None,
                    },
                    ..Default::default()
                };
                self.store
                    .update_participant(row_id(row.id)?, patch)
                    .await?
            }
            None => {
                let mut row = new_participant(call_id, user_id, target, audio, video);
                if target == ParticipantStatus::Connected {
                    row.joined_at = Some(DateTime::now());
                }
                self.store.add_participant(row).await?
            }
        };

        let call = if call.status == CallStatus::Pending {
            self.store
                .update_call(
                    call_id,
                    CallPatch {
                        status: Some(CallStatus::Active),
                        started_at: Some(DateTime::now()),
                        ..Default::default()
                    },
                )
                .await?
        } else {
            call
        };

        Ok((call, participant))
    }

    pub async fn leave_call(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> Result<LeaveOutcome, CallError> {
        let _guard = self.locks.acquire(call_id).await;

        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        if call.status == CallStatus::Ended {
            return Ok(LeaveOutcome::default());
        }

        let participant = self
            .store
            .get_participant(call_id, user_id)
            .await?
            .ok_or(CallError::NotFound("participant"))?;

        if participant.is_active() {
            self.store
                .update_participant(
                    row_id(participant.id)?,
                    ParticipantPatch {
                        status: Some(ParticipantStatus::Disconnected),
                        left_at: Some(DateTime::now()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let participants = self.store.get_participants(call_id).await?;
        if rules::active_participants(&participants).is_empty() {
            let ended = self.finalize_end(&call, &participants).await?;
            return Ok(LeaveOutcome {
                ended: Some(ended),
                new_host: None,
            });
        }

        let mut new_host = None;
        if call.initiator_id == user_id {
            if let Some(host) = rules::pick_new_host(&participants, user_id) {
                self.store
                    .update_call(
                        call_id,
                        CallPatch {
                            initiator_id: Some(host),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(%call_id, old_host = %user_id, %host, "Host reassigned");
                new_host = Some(host);
            }
        }

        Ok(LeaveOutcome {
            ended: None,
            new_host,
        })
    }

    pub async fn end_call(&self, call_id: ObjectId, ended_by: ObjectId) -> Result<Call, CallError> {
        let _guard = self.locks.acquire(call_id).await;

        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        rules::ensure_not_ended(&call)?;

        if ended_by != call.initiator_id {
            let user = self
                .store
                .get_user(ended_by)
                .await?
                .ok_or(CallError::NotFound("user"))?;
            if !user.is_admin {
                return Err(CallError::Forbidden(
                    "only the host or an administrator can end the call".to_string(),
                ));
            }
        }

        let participants = self.store.get_participants(call_id).await?;
        self.finalize_end(&call, &participants).await
    }

    /// End path shared by explicit `end_call`, last-leave, and the pending
    /// sweeper. Assumes the caller holds the call lock. Marks stragglers
    /// disconnected, stamps duration, clears recording, notifies everyone
    /// who took part.
    async fn finalize_end(
        &self,
        call: &Call,
        participants: &[CallParticipant],
    ) -> Result<Call, CallError> {
        let call_id = row_id(call.id)?;
        let now = DateTime::now();
        let started = call.started_at.unwrap_or(call.created_at);
        let duration = ((now.timestamp_millis() - started.timestamp_millis()) / 1000).max(0);

        let mut patch = CallPatch {
            status: Some(CallStatus::Ended),
            ended_at: Some(now),
            total_duration: Some(duration),
            ..Default::default()
        };
        if call.is_recording {
            patch.is_recording = Some(false);
            patch.recording_stopped_at = Some(now);
        }
        let ended = self.store.update_call(call_id, patch).await?;

        for p in participants.iter().filter(|p| p.is_active()) {
            self.store
                .update_participant(
                    row_id(p.id)?,
                    ParticipantPatch {
                        status: Some(ParticipantStatus::Disconnected),
                        left_at: Some(now),
                        ..Default::default()
                    },
                )
                .await?;
        }

        // Notices go to everyone who actually took part; invitees who never
        // answered are spared.
        for p in participants {
            if p.is_active() || p.joined_at.is_some() {
                self.notifier.call_ended(p.user_id, &ended).await;
            }
        }

        self.locks.retire(&call_id);
        info!(%call_id, duration_secs = duration, "Call ended");
        Ok(ended)
    }

    /// Sweeps calls that sat `pending` past the configured TTL. Returns the
    /// calls it ended so the caller can tear down any rooms.
    pub async fn sweep_stale_pending(&self, ttl_secs: u64) -> Result<Vec<Call>, CallError> {
        let cutoff =
            DateTime::from_millis(DateTime::now().timestamp_millis() - (ttl_secs as i64) * 1000);
        let stale = self.store.stale_pending_calls(cutoff).await?;

        let mut ended = Vec::new();
        for call in stale {
            let call_id = match call.id {
                Some(id) => id,
                None => continue,
            };
            let _guard = self.locks.acquire(call_id).await;
            // Re-check under the lock: a join may have landed meanwhile.
            let current = match self.store.get_call(call_id).await? {
                Some(c) if c.status == CallStatus::Pending => c,
                _ => continue,
            };
            let participants = self.store.get_participants(call_id).await?;
            warn!(%call_id, ttl_secs, "Expiring pending call that never started");
            ended.push(self.finalize_end(&current, &participants).await?);
        }
        Ok(ended)
    }

    // ── Field-level mutations ───────────────────────────────────

    pub async fn update_settings(
        &self,
        call_id: ObjectId,
        updated_by: ObjectId,
        update: SettingsUpdate,
    ) -> Result<Call, CallError> {
        let _guard = self.locks.acquire(call_id).await;

        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        rules::ensure_not_ended(&call)?;
        self.ensure_host_or_admin(&call, updated_by).await?;

        if let Some(max) = update.max_participants {
            if max < 2 {
                return Err(CallError::Validation(
                    "max_participants must be at least 2".to_string(),
                ));
            }
            let participants = self.store.get_participants(call_id).await?;
            if (max as usize) < rules::connected_count(&participants) {
                return Err(CallError::Conflict(
                    "max_participants is below the current connected count".to_string(),
                ));
            }
        }

        Ok(self
            .store
            .update_call(
                call_id,
                CallPatch {
                    title: update.title,
                    max_participants: update.max_participants,
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn toggle_media(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
        toggle: MediaToggle,
    ) -> Result<CallParticipant, CallError> {
        let _guard = self.locks.acquire(call_id).await;

        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        rules::ensure_not_ended(&call)?;

        let participant = self.active_participant(call_id, user_id).await?;
        Ok(self
            .store
            .update_participant(
                row_id(participant.id)?,
                ParticipantPatch {
                    audio_enabled: toggle.audio_enabled,
                    video_enabled: toggle.video_enabled,
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn start_screen_share(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> Result<CallParticipant, CallError> {
        let _guard = self.locks.acquire(call_id).await;

        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        rules::ensure_not_ended(&call)?;

        let participant = self.active_participant(call_id, user_id).await?;
        let participants = self.store.get_participants(call_id).await?;
        rules::ensure_no_other_sharer(&participants, user_id)?;

        Ok(self
            .store
            .update_participant(
                row_id(participant.id)?,
                ParticipantPatch {
                    screen_sharing: Some(true),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn stop_screen_share(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> Result<CallParticipant, CallError> {
        let _guard = self.locks.acquire(call_id).await;

        let participant = self
            .store
            .get_participant(call_id, user_id)
            .await?
            .ok_or(CallError::NotFound("participant"))?;
        if !participant.screen_sharing {
            return Ok(participant);
        }
        Ok(self
            .store
            .update_participant(
                row_id(participant.id)?,
                ParticipantPatch {
                    screen_sharing: Some(false),
                    ..Default::default()
                },
            )
            .await?)
    }

    pub async fn record_consent(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
        consent: bool,
    ) -> Result<CallParticipant, CallError> {
        let participant = self
            .store
            .get_participant(call_id, user_id)
            .await?
            .ok_or(CallError::NotFound("participant"))?;
        Ok(self
            .store
            .update_participant(
                row_id(participant.id)?,
                ParticipantPatch {
                    recording_consent: Some(consent),
                    consent_given_at: Some(DateTime::now()),
                    ..Default::default()
                },
            )
            .await?)
    }

    /// Host-gated recording toggle. Returns the updated call; idempotent
    /// when the flag already matches.
    pub async fn set_recording(
        &self,
        call_id: ObjectId,
        requested_by: ObjectId,
        recording: bool,
    ) -> Result<Call, CallError> {
        let _guard = self.locks.acquire(call_id).await;

        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        rules::ensure_not_ended(&call)?;
        self.ensure_host_or_admin(&call, requested_by).await?;

        if call.is_recording == recording {
            return Ok(call);
        }

        let patch = if recording {
            CallPatch {
                is_recording: Some(true),
                recording_started_at: Some(DateTime::now()),
                ..Default::default()
            }
        } else {
            CallPatch {
                is_recording: Some(false),
                recording_stopped_at: Some(DateTime::now()),
                ..Default::default()
            }
        };
        let call = self.store.update_call(call_id, patch).await?;

        if recording {
            let participants = self.store.get_participants(call_id).await?;
            for p in participants.iter().filter(|p| p.is_active()) {
                if p.user_id != requested_by {
                    self.notifier.recording_started(p.user_id, &call).await;
                }
            }
        }

        Ok(call)
    }

    pub async fn update_quality_metrics(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
        report: QualityReport,
    ) -> Result<CallParticipant, CallError> {
        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        rules::ensure_not_ended(&call)?;

        let participant = self
            .store
            .get_participant(call_id, user_id)
            .await?
            .ok_or(CallError::NotFound("participant"))?;

        let updated = self
            .store
            .update_participant(
                row_id(participant.id)?,
                ParticipantPatch {
                    network_quality: report.network_quality.clone(),
                    avg_bitrate: report.bitrate,
                    packet_loss: report.packet_loss,
                    avg_latency: report.latency,
                    ..Default::default()
                },
            )
            .await?;

        let metrics = QualityMetrics {
            network_quality: report.network_quality,
            avg_bitrate: report.bitrate,
            packet_loss: report.packet_loss,
            avg_latency: report.latency,
            reported_at: DateTime::now(),
        };
        self.store
            .update_call(
                call_id,
                CallPatch {
                    merge_quality: Some((user_id.to_hex(), metrics)),
                    ..Default::default()
                },
            )
            .await?;

        Ok(updated)
    }

    // ── Reads ───────────────────────────────────────────────────

    pub async fn get_active_calls(&self, workspace_id: ObjectId) -> Result<Vec<Call>, CallError> {
        Ok(self.store.get_active_calls(workspace_id).await?)
    }

    pub async fn get_call_with_participants(
        &self,
        call_id: ObjectId,
    ) -> Result<CallWithParticipants, CallError> {
        let call = self
            .store
            .get_call(call_id)
            .await?
            .ok_or(CallError::NotFound("call"))?;
        let participants = self.store.get_participants(call_id).await?;

        let user_ids: Vec<ObjectId> = participants.iter().map(|p| p.user_id).collect();
        let users: Vec<User> = self.store.get_users(&user_ids).await?;

        let participants = participants
            .into_iter()
            .map(|p| {
                let summary = users
                    .iter()
                    .find(|u| u.id == Some(p.user_id))
                    .map(UserSummary::from);
                (p, summary)
            })
            .collect();

        Ok(CallWithParticipants { call, participants })
    }

    // ── Helpers ─────────────────────────────────────────────────

    async fn ensure_host_or_admin(&self, call: &Call, user_id: ObjectId) -> Result<(), CallError> {
        if user_id == call.initiator_id {
            return Ok(());
        }
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(CallError::NotFound("user"))?;
        if user.is_admin {
            return Ok(());
        }
        Err(CallError::Forbidden(
            "only the host or an administrator may do this".to_string(),
        ))
    }

    async fn active_participant(
        &self,
        call_id: ObjectId,
        user_id: ObjectId,
    ) -> Result<CallParticipant, CallError> {
        let participant = self
            .store
            .get_participant(call_id, user_id)
            .await?
            .ok_or(CallError::NotFound("participant"))?;
        if !participant.is_active() {
            return Err(CallError::Conflict(
                "participant is not in the call".to_string(),
            ));
        }
        Ok(participant)
    }
}

fn new_participant(
    call_id: ObjectId,
    user_id: ObjectId,
    status: ParticipantStatus,
    audio_enabled: bool,
    video_enabled: bool,
) -> CallParticipant {
    let now = DateTime::now();
    CallParticipant {
        id: None,
        call_id,
        user_id,
        status,
        audio_enabled,
        video_enabled,
        screen_sharing: false,
        recording_consent: None,
        consent_given_at: None,
        network_quality: None,
        avg_bitrate: None,
        packet_loss: None,
        avg_latency: None,
        joined_at: None,
        left_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn row_id(id: Option<ObjectId>) -> Result<ObjectId, CallError> {
    id.ok_or(CallError::Store(StoreError::Backend(
        "record is missing its id".to_string(),
    )))
}
