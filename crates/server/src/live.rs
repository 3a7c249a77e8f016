//! WebSocket push endpoint.
//!
//! Each connection registers itself with the subscriber hub and is fed
//! every broadcast change as a `{event, data}` text frame. Inbound frames
//! are read only to notice the client going away.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

use newswire_sync::{SendError, Subscriber};

use crate::state::AppState;

// ── Subscriber handle ───────────────────────────────────────────

/// Write half of a WebSocket, shared with the hub.
struct WsSubscriber {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SendError(e.to_string()))
    }
}

// ── WebSocket Handler ───────────────────────────────────────────

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let subscriber = Arc::new(WsSubscriber {
        sink: Mutex::new(sender),
    });
    let id = state.hub.register(subscriber.clone()).await;

    // Consume incoming messages (pings, close frames) but ignore content.
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.unregister(id).await;
    if let Err(e) = subscriber.sink.lock().await.close().await {
        debug!(subscriber = %id, error = %e, "websocket close failed");
    }
}
