use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bson::oid::ObjectId;
use futures::StreamExt;
use hirewire_services::call::CallError;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

use super::dispatcher::{self, WsSender};
use super::protocol::{self, ClientMessageType, Envelope};
use super::registry::JoinedRoom;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Signaling upgrade. A connection without a verifiable token is refused
/// outright: closed, not merely errored.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match state.auth.verify_access_token(&params.token) {
        Ok(c) => c,
        Err(_) => {
            return Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap_or_default();
        }
    };

    let user_id = match ObjectId::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return Response::builder()
                .status(400)
                .body("Invalid user ID".into())
                .unwrap_or_default();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// One actor per connection: messages are dispatched one at a time in
/// arrival order, and every store write completes before the matching
/// broadcast goes out. A dropped socket is an implicit `leave_room`.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: ObjectId) {
    let peer_id = Uuid::new_v4().to_string();
    info!(%user_id, %peer_id, "Signaling connection opened");

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    dispatcher::send(
        &sender,
        &protocol::frame(
            "authenticated",
            serde_json::json!({
                "userId": user_id.to_hex(),
                "peerId": peer_id,
            }),
        ),
    )
    .await;

    let mut joined: Option<JoinedRoom> = None;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_frame(&state, user_id, &peer_id, &sender, &mut joined, &text).await;
            }
            Ok(Message::Ping(_)) => {
                // axum answers pings at the protocol level
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(%user_id, %peer_id, %e, "Signaling connection error");
                break;
            }
            _ => {}
        }
    }

    if let Some(joined) = joined.take() {
        state.registry.leave(&joined, user_id, &peer_id).await;
    }

    info!(%user_id, %peer_id, "Signaling connection closed");
}

async fn handle_frame(
    state: &AppState,
    user_id: ObjectId,
    peer_id: &str,
    sender: &WsSender,
    joined: &mut Option<JoinedRoom>,
    text: &str,
) {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            debug!(%user_id, %e, "Malformed signaling envelope");
            dispatcher::send(
                sender,
                &protocol::error_frame("validation", "malformed message envelope"),
            )
            .await;
            return;
        }
    };

    debug!(%user_id, %peer_id, kind = envelope.kind.as_str(), "Signaling message");

    let result = match envelope.kind {
        ClientMessageType::JoinRoom => {
            if joined.is_some() {
                Err(CallError::Conflict(
                    "already joined a room".to_string(),
                ))
            } else {
                match serde_json::from_value(envelope.payload) {
                    Ok(payload) => state
                        .registry
                        .join(user_id, peer_id, sender, payload, envelope.room_id)
                        .await
                        .map(|room| {
                            *joined = Some(room);
                        }),
                    Err(_) => Err(CallError::Validation(
                        "malformed join_room payload".to_string(),
                    )),
                }
            }
        }
        ClientMessageType::LeaveRoom => {
            if let Some(current) = joined.take() {
                state.registry.leave(&current, user_id, peer_id).await;
            }
            Ok(())
        }
        ClientMessageType::Offer | ClientMessageType::Answer | ClientMessageType::IceCandidate => {
            match joined.as_ref() {
                Some(current) => {
                    state
                        .registry
                        .route(
                            current,
                            peer_id,
                            envelope.kind,
                            envelope.target_peer_id.as_deref(),
                            &envelope.payload,
                        )
                        .await
                }
                None => Err(not_joined()),
            }
        }
        ClientMessageType::MediaStatus => match (joined.as_ref(), parse(envelope.payload)) {
            (Some(current), Ok(payload)) => {
                state
                    .registry
                    .media_status(current, user_id, peer_id, payload)
                    .await
            }
            (None, _) => Err(not_joined()),
            (_, Err(e)) => Err(e),
        },
        ClientMessageType::ScreenShareStatus => match (joined.as_ref(), parse(envelope.payload)) {
            (Some(current), Ok(payload)) => {
                state
                    .registry
                    .screen_share(current, user_id, peer_id, payload)
                    .await
            }
            (None, _) => Err(not_joined()),
            (_, Err(e)) => Err(e),
        },
        ClientMessageType::QualityReport => match (joined.as_ref(), parse(envelope.payload)) {
            (Some(current), Ok(payload)) => {
                state.registry.quality_report(current, user_id, payload).await
            }
            (None, _) => Err(not_joined()),
            (_, Err(e)) => Err(e),
        },
        ClientMessageType::RecordingStatus => match (joined.as_ref(), parse(envelope.payload)) {
            (Some(current), Ok(payload)) => {
                state.registry.recording(current, user_id, payload).await
            }
            (None, _) => Err(not_joined()),
            (_, Err(e)) => Err(e),
        },
    };

    // Errors go back as frames on the same connection; the connection
    // itself stays open.
    if let Err(e) = result {
        dispatcher::send(sender, &protocol::error_frame(e.code(), &e.to_string())).await;
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    payload: serde_json::Value,
) -> Result<T, CallError> {
    serde_json::from_value(payload)
        .map_err(|_| CallError::Validation("malformed payload".to_string()))
}

fn not_joined() -> CallError {
    CallError::Forbidden("join a room first".to_string())
}
