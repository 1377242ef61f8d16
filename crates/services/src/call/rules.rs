//! Invariant checks shared by the lifecycle manager and the signaling
//! registry. The registry re-runs these at the transport boundary because a
//! join over the socket can race a join over HTTP; both paths evaluate
//! against store state, under the same per-call lock.

use bson::oid::ObjectId;
use hirewire_db::models::{Call, CallParticipant, CallStatus, ParticipantStatus};

use super::error::CallError;

pub fn connected_count(participants: &[CallParticipant]) -> usize {
    participants
        .iter()
        .filter(|p| p.status == ParticipantStatus::Connected)
        .count()
}

/// Participants still in the call: `connecting` or `connected`.
pub fn active_participants(participants: &[CallParticipant]) -> Vec<&CallParticipant> {
    participants.iter().filter(|p| p.is_active()).collect()
}

pub fn ensure_not_ended(call: &Call) -> Result<(), CallError> {
    if call.status == CallStatus::Ended {
        return Err(CallError::Conflict("call has ended".to_string()));
    }
    Ok(())
}

/// Capacity is checked against the durable connected count, never against
/// the in-memory room snapshot.
pub fn ensure_capacity(call: &Call, participants: &[CallParticipant]) -> Result<(), CallError> {
    if connected_count(participants) >= call.max_participants as usize {
        return Err(CallError::Conflict("call is full".to_string()));
    }
    Ok(())
}

/// A user occupies at most one active participant row across all non-ended
/// calls. Rejoining the same call is allowed.
pub fn ensure_not_in_other_call(
    call_id: ObjectId,
    current: Option<&Call>,
) -> Result<(), CallError> {
    if let Some(other) = current {
        if other.id != Some(call_id) {
            return Err(CallError::Conflict(
                "user is already in another active call".to_string(),
            ));
        }
    }
    Ok(())
}

/// At most one participant per call shares their screen.
pub fn ensure_no_other_sharer(
    participants: &[CallParticipant],
    user_id: ObjectId,
) -> Result<(), CallError> {
    let taken = participants
        .iter()
        .any(|p| p.screen_sharing && p.user_id != user_id && p.is_active());
    if taken {
        return Err(CallError::Conflict(
            "another participant is already sharing their screen".to_string(),
        ));
    }
    Ok(())
}

/// Host reassignment target: the earliest-joined connected participant,
/// falling back to the earliest connecting one. Earliest-joined is the
/// deterministic tie-break; `created_at`/id order backstops rows that never
/// recorded a join time.
pub fn pick_new_host(participants: &[CallParticipant], leaving: ObjectId) -> Option<ObjectId> {
    let mut candidates: Vec<&CallParticipant> = participants
        .iter()
        .filter(|p| p.user_id != leaving && p.status == ParticipantStatus::Connected)
        .collect();
    if candidates.is_empty() {
        candidates = participants
            .iter()
            .filter(|p| p.user_id != leaving && p.status == ParticipantStatus::Connecting)
            .collect();
    }
    candidates.sort_by_key(|p| (p.joined_at, p.created_at, p.id));
    candidates.first().map(|p| p.user_id)
}
