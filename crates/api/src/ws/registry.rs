use bson::oid::ObjectId;
use dashmap::DashMap;
use hirewire_db::models::{Call, CallParticipant, CallStatus};
use hirewire_services::call::{
    CallError, CallManager, MediaConstraints, MediaToggle, QualityReport,
};
use hirewire_services::store::CallStore;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::dispatcher::{self, WsSender};
use super::protocol::{
    self, ClientMessageType, JoinRoomPayload, MediaStatusPayload, PeerSummary,
    QualityReportPayload, RecordingStatusPayload, ScreenShareStatusPayload,
};

/// One connection's registration within a room.
pub struct PeerHandle {
    pub peer_id: String,
    pub user_id: ObjectId,
    pub sender: WsSender,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
}

impl PeerHandle {
    fn summary(&self) -> PeerSummary {
        PeerSummary {
            peer_id: self.peer_id.clone(),
            user_id: self.user_id.to_hex(),
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            screen_sharing: self.screen_sharing,
        }
    }
}

struct RoomState {
    call_id: ObjectId,
    peers: HashMap<String, PeerHandle>,
}

impl RoomState {
    fn new(call_id: ObjectId) -> Self {
        Self {
            call_id,
            peers: HashMap::new(),
        }
    }

    fn senders(&self) -> Vec<WsSender> {
        self.peers.values().map(|p| p.sender.clone()).collect()
    }

    fn other_senders(&self, peer_id: &str) -> Vec<WsSender> {
        self.peers
            .values()
            .filter(|p| p.peer_id != peer_id)
            .map(|p| p.sender.clone())
            .collect()
    }
}

/// The connection actor's record of where it is joined.
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    pub room_id: String,
    pub call_id: ObjectId,
}

/// Owns all ephemeral room state: `room_id → peers`, created on first join
/// and destroyed when empty or torn down. Rooms are guarded by one async
/// mutex each, held across the whole register/snapshot/broadcast unit;
/// authorization always goes through the store and the per-call lock
/// (inside [`CallManager`]), never through the in-memory maps.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Mutex<RoomState>>>,
    store: Arc<dyn CallStore>,
    calls: Arc<CallManager>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn CallStore>, calls: Arc<CallManager>) -> Self {
        Self {
            rooms: DashMap::new(),
            store,
            calls,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    // ── join_room ───────────────────────────────────────────────

    pub async fn join(
        &self,
        user_id: ObjectId,
        peer_id: &str,
        sender: &WsSender,
        payload: JoinRoomPayload,
        envelope_room_id: Option<String>,
    ) -> Result<JoinedRoom, CallError> {
        let room_token = payload.room_id.or(envelope_room_id);
        let call = self.resolve_call(payload.call_id.as_deref(), room_token.as_deref()).await?;
        let call_id = call
            .id
            .ok_or_else(|| CallError::Validation("call record is missing its id".to_string()))?;

        let media = MediaConstraints {
            audio_enabled: payload.media_constraints.and_then(|m| m.audio_enabled),
            video_enabled: payload.media_constraints.and_then(|m| m.video_enabled),
        };

        // The same business rules the request path enforces, re-run here
        // under the shared per-call lock: this path can race a join started
        // elsewhere. Persists the participant as connected and activates a
        // pending call.
        let (call, participant) = self.calls.connect_participant(call_id, user_id, media).await?;

        let room = Arc::clone(
            self.rooms
                .entry(call.room_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(RoomState::new(call_id))))
                .value(),
        );
        let mut room = room.lock().await;

        // An end may have landed between the persist and this registration;
        // never expose a peer inside a dead room.
        match self.store.get_call(call_id).await? {
            Some(c) if c.status == CallStatus::Active => {}
            _ => {
                drop(room);
                self.remove_room_if_empty(&call.room_id);
                return Err(CallError::Conflict("call has ended".to_string()));
            }
        }

        let existing_peers: Vec<PeerSummary> =
            room.peers.values().map(PeerHandle::summary).collect();

        let handle = PeerHandle {
            peer_id: peer_id.to_string(),
            user_id,
            sender: sender.clone(),
            audio_enabled: participant.audio_enabled,
            video_enabled: participant.video_enabled,
            screen_sharing: participant.screen_sharing,
        };

        // Everyone already in the room learns about the newcomer, with its
        // media status; the store write above happened first.
        let peer_joined = protocol::frame(
            "peer_joined",
            json!({
                "roomId": call.room_id,
                "peer": handle.summary(),
            }),
        );
        for peer in room.peers.values() {
            dispatcher::send(&peer.sender, &peer_joined).await;
        }

        room.peers.insert(peer_id.to_string(), handle);

        let room_joined = protocol::frame(
            "room_joined",
            json!({
                "roomId": call.room_id,
                "callId": call_id.to_hex(),
                "peerId": peer_id,
                "existingPeers": existing_peers,
                "iceServers": ice_servers_json(&call),
            }),
        );
        dispatcher::send(sender, &room_joined).await;

        info!(%call_id, room_id = %call.room_id, %peer_id, "Peer joined room");
        Ok(JoinedRoom {
            room_id: call.room_id.clone(),
            call_id,
        })
    }

    async fn resolve_call(
        &self,
        call_id: Option<&str>,
        room_id: Option<&str>,
    ) -> Result<Call, CallError> {
        let call = match (call_id, room_id) {
            (Some(cid), _) => {
                let cid = ObjectId::parse_str(cid)
                    .map_err(|_| CallError::Validation("invalid callId".to_string()))?;
                self.store.get_call(cid).await?
            }
            (None, Some(rid)) => self.store.get_call_by_room_id(rid).await?,
            (None, None) => {
                return Err(CallError::Validation(
                    "callId or roomId is required".to_string(),
                ));
            }
        };
        call.ok_or(CallError::NotFound("call"))
    }

    // ── leave_room / socket close ───────────────────────────────

    pub async fn leave(&self, joined: &JoinedRoom, user_id: ObjectId, peer_id: &str) {
        let mut user_still_present = false;
        let mut remaining: Vec<WsSender> = Vec::new();
        let mut was_member = false;

        if let Some(room) = self.rooms.get(&joined.room_id).map(|r| Arc::clone(r.value())) {
            let mut room = room.lock().await;
            if room.peers.remove(peer_id).is_some() {
                was_member = true;
                user_still_present = room.peers.values().any(|p| p.user_id == user_id);
                remaining = room.senders();
            }
        }
        self.remove_room_if_empty(&joined.room_id);

        // Persist the departure (possibly ending the call) before telling
        // anyone. A user with another live connection in the room keeps
        // their participant row.
        if !user_still_present {
            match self.calls.leave_call(joined.call_id, user_id).await {
                Ok(outcome) => {
                    if let Some(ended) = outcome.ended {
                        info!(call_id = %joined.call_id, "Room drained, call ended");
                        self.teardown(&ended.room_id, "call_ended").await;
                    }
                }
                // Already gone via the request path; nothing to persist.
                Err(CallError::NotFound(_)) => {}
                Err(e) => warn!(call_id = %joined.call_id, %e, "Signaling leave failed"),
            }
        }

        if was_member && !remaining.is_empty() {
            let frame = protocol::frame(
                "peer_left",
                json!({
                    "roomId": joined.room_id,
                    "peerId": peer_id,
                    "userId": user_id.to_hex(),
                }),
            );
            dispatcher::broadcast(&remaining, &frame).await;
        }
    }

    // ── offer / answer / ice_candidate ──────────────────────────

    /// Forwards a negotiation message to exactly one peer in the same room,
    /// annotated with the sender. A missing target is not an error, it may
    /// have just left.
    pub async fn route(
        &self,
        joined: &JoinedRoom,
        from_peer: &str,
        kind: ClientMessageType,
        target_peer_id: Option<&str>,
        payload: &Value,
    ) -> Result<(), CallError> {
        let target = target_peer_id
            .ok_or_else(|| CallError::Validation("targetPeerId is required".to_string()))?;

        let room = match self.rooms.get(&joined.room_id).map(|r| Arc::clone(r.value())) {
            Some(r) => r,
            // Room already torn down; same as a departed target.
            None => return Ok(()),
        };
        let room = room.lock().await;

        if !room.peers.contains_key(from_peer) {
            return Err(CallError::Forbidden(
                "not a member of this room".to_string(),
            ));
        }

        match room.peers.get(target) {
            Some(peer) => {
                let text = protocol::forwarded_frame(kind.as_str(), from_peer, payload);
                dispatcher::send(&peer.sender, &text).await;
            }
            None => {
                debug!(%target, "Dropping message for unknown peer");
            }
        }
        Ok(())
    }

    // ── media_status ────────────────────────────────────────────

    pub async fn media_status(
        &self,
        joined: &JoinedRoom,
        user_id: ObjectId,
        peer_id: &str,
        payload: MediaStatusPayload,
    ) -> Result<(), CallError> {
        self.ensure_member(&joined.room_id, peer_id).await?;

        self.calls
            .toggle_media(
                joined.call_id,
                user_id,
                MediaToggle {
                    audio_enabled: Some(payload.audio_enabled),
                    video_enabled: Some(payload.video_enabled),
                },
            )
            .await?;

        // The screen flag goes through the exclusivity check rather than a
        // raw field write.
        let participant = if payload.screen_sharing {
            self.calls
                .start_screen_share(joined.call_id, user_id)
                .await?
        } else {
            self.calls.stop_screen_share(joined.call_id, user_id).await?
        };

        self.refresh_peer_and_broadcast(
            &joined.room_id,
            peer_id,
            &participant,
            "media_status_changed",
            None,
        )
        .await;
        Ok(())
    }

    // ── screen_share_status ─────────────────────────────────────

    pub async fn screen_share(
        &self,
        joined: &JoinedRoom,
        user_id: ObjectId,
        peer_id: &str,
        payload: ScreenShareStatusPayload,
    ) -> Result<(), CallError> {
        self.ensure_member(&joined.room_id, peer_id).await?;

        let participant = if payload.screen_sharing {
            self.calls
                .start_screen_share(joined.call_id, user_id)
                .await?
        } else {
            self.calls.stop_screen_share(joined.call_id, user_id).await?
        };

        self.refresh_peer_and_broadcast(
            &joined.room_id,
            peer_id,
            &participant,
            "screen_share_status_changed",
            payload.screen_stream_id.as_deref(),
        )
        .await;
        Ok(())
    }

    // ── quality_report ──────────────────────────────────────────

    /// Persisted onto the participant row and merged into the call's
    /// metrics map. No broadcast.
    pub async fn quality_report(
        &self,
        joined: &JoinedRoom,
        user_id: ObjectId,
        payload: QualityReportPayload,
    ) -> Result<(), CallError> {
        self.calls
            .update_quality_metrics(
                joined.call_id,
                user_id,
                QualityReport {
                    bitrate: payload.bitrate,
                    packet_loss: payload.packet_loss,
                    latency: payload.latency,
                    network_quality: payload.network_quality,
                },
            )
            .await?;
        Ok(())
    }

    // ── recording_status ────────────────────────────────────────

    pub async fn recording(
        &self,
        joined: &JoinedRoom,
        user_id: ObjectId,
        payload: RecordingStatusPayload,
    ) -> Result<(), CallError> {
        // Host-gated in the manager; non-hosts come back Forbidden with no
        // field changes.
        self.calls
            .set_recording(joined.call_id, user_id, payload.recording)
            .await?;

        if let Some(consent) = payload.consent {
            if let Err(e) = self
                .calls
                .record_consent(joined.call_id, user_id, consent)
                .await
            {
                warn!(call_id = %joined.call_id, %e, "Failed to record host consent");
            }
        }

        let senders = match self.rooms.get(&joined.room_id).map(|r| Arc::clone(r.value())) {
            Some(room) => room.lock().await.senders(),
            None => return Ok(()),
        };
        let text = if payload.recording {
            protocol::frame(
                "recording_started",
                json!({ "roomId": joined.room_id, "requestConsent": true }),
            )
        } else {
            protocol::frame("recording_stopped", json!({ "roomId": joined.room_id }))
        };
        dispatcher::broadcast(&senders, &text).await;
        Ok(())
    }

    // ── externally triggered teardown ───────────────────────────

    /// Broadcasts `call_ended{reason}` to every socket still registered and
    /// clears the room, whether or not anyone sends `leave_room`.
    pub async fn teardown(&self, room_id: &str, reason: &str) {
        let Some((_, room)) = self.rooms.remove(room_id) else {
            return;
        };
        let mut room = room.lock().await;
        let call_id = room.call_id;
        if room.peers.is_empty() {
            return;
        }
        let senders = room.senders();
        room.peers.clear();
        drop(room);

        let text = protocol::frame(
            "call_ended",
            json!({ "roomId": room_id, "reason": reason }),
        );
        dispatcher::broadcast(&senders, &text).await;
        info!(%call_id, %room_id, reason, "Room torn down");
    }

    /// Request-path leave glue: drops any of the user's peers from the room
    /// and tells the others. The store was already updated by the manager.
    pub async fn disconnect_user(&self, room_id: &str, user_id: ObjectId) {
        let Some(room) = self.rooms.get(room_id).map(|r| Arc::clone(r.value())) else {
            return;
        };
        let mut room = room.lock().await;
        let removed: Vec<String> = room
            .peers
            .values()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.peer_id.clone())
            .collect();
        if removed.is_empty() {
            return;
        }
        for peer_id in &removed {
            room.peers.remove(peer_id);
        }
        let remaining = room.senders();
        drop(room);
        self.remove_room_if_empty(room_id);

        for peer_id in removed {
            let frame = protocol::frame(
                "peer_left",
                json!({
                    "roomId": room_id,
                    "peerId": peer_id,
                    "userId": user_id.to_hex(),
                }),
            );
            dispatcher::broadcast(&remaining, &frame).await;
        }
    }

    /// Request-path media glue: mirrors a participant update into the room
    /// cache and fans out the change to the other peers.
    pub async fn broadcast_media_update(
        &self,
        room_id: &str,
        user_id: ObjectId,
        participant: &CallParticipant,
        kind: &str,
    ) {
        let Some(room) = self.rooms.get(room_id).map(|r| Arc::clone(r.value())) else {
            return;
        };
        let mut room = room.lock().await;

        let peer_ids: Vec<String> = room
            .peers
            .values()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.peer_id.clone())
            .collect();
        for peer_id in &peer_ids {
            if let Some(peer) = room.peers.get_mut(peer_id) {
                peer.audio_enabled = participant.audio_enabled;
                peer.video_enabled = participant.video_enabled;
                peer.screen_sharing = participant.screen_sharing;
            }
        }

        let peer_id = peer_ids.first().cloned();
        let others: Vec<WsSender> = match peer_id {
            Some(ref pid) => room.other_senders(pid),
            None => room.senders(),
        };
        drop(room);

        let text = protocol::frame(
            kind,
            json!({
                "roomId": room_id,
                "peerId": peer_id,
                "userId": user_id.to_hex(),
                "audioEnabled": participant.audio_enabled,
                "videoEnabled": participant.video_enabled,
                "screenSharing": participant.screen_sharing,
            }),
        );
        dispatcher::broadcast(&others, &text).await;
    }

    // ── internals ───────────────────────────────────────────────

    async fn ensure_member(&self, room_id: &str, peer_id: &str) -> Result<(), CallError> {
        let room = self
            .rooms
            .get(room_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| CallError::Forbidden("not a member of this room".to_string()))?;
        let room = room.lock().await;
        if !room.peers.contains_key(peer_id) {
            return Err(CallError::Forbidden(
                "not a member of this room".to_string(),
            ));
        }
        Ok(())
    }

    /// Mirrors persisted media flags into the peer handle and broadcasts
    /// the change to the rest of the room. The persist already happened.
    async fn refresh_peer_and_broadcast(
        &self,
        room_id: &str,
        peer_id: &str,
        participant: &CallParticipant,
        kind: &str,
        screen_stream_id: Option<&str>,
    ) {
        let Some(room) = self.rooms.get(room_id).map(|r| Arc::clone(r.value())) else {
            return;
        };
        let mut room = room.lock().await;
        let Some(peer) = room.peers.get_mut(peer_id) else {
            return;
        };
        peer.audio_enabled = participant.audio_enabled;
        peer.video_enabled = participant.video_enabled;
        peer.screen_sharing = participant.screen_sharing;
        let user_hex = peer.user_id.to_hex();
        let others = room.other_senders(peer_id);
        drop(room);

        let mut payload = json!({
            "roomId": room_id,
            "peerId": peer_id,
            "userId": user_hex,
            "audioEnabled": participant.audio_enabled,
            "videoEnabled": participant.video_enabled,
            "screenSharing": participant.screen_sharing,
        });
        if let Some(stream_id) = screen_stream_id {
            payload["screenStreamId"] = json!(stream_id);
        }
        dispatcher::broadcast(&others, &protocol::frame(kind, payload)).await;
    }

    fn remove_room_if_empty(&self, room_id: &str) {
        self.rooms.remove_if(room_id, |_, room| {
            room.try_lock().map(|r| r.peers.is_empty()).unwrap_or(false)
        });
    }
}

fn ice_servers_json(call: &Call) -> Vec<Value> {
    let mut servers: Vec<Value> = call
        .stun_servers
        .iter()
        .map(|url| json!({ "urls": [url] }))
        .collect();
    servers.extend(call.turn_servers.iter().map(|s| {
        json!({
            "urls": s.urls,
            "username": s.username,
            "credential": s.credential,
        })
    }));
    servers
}
