use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Write half of one connection, shared between the connection actor and
/// the room registry's fan-out.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Sends a pre-serialized frame to a single connection. Delivery is
/// best-effort: a dead socket is logged, not propagated. The reader side
/// will observe the close and run the leave path.
pub async fn send(sender: &WsSender, text: &str) {
    let mut guard = sender.lock().await;
    if let Err(e) = guard.send(Message::text(text.to_string())).await {
        warn!(%e, "Failed to send WS frame");
    } else {
        debug!("WS frame sent");
    }
}

/// Fans a frame out to every sender in the list.
pub async fn broadcast(senders: &[WsSender], text: &str) {
    for sender in senders {
        send(sender, text).await;
    }
}
