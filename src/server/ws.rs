use crate::state::{AppState, WsMessage};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

type WsSender = SplitSink<WebSocket, Message>;

/// GET /ws -- live run stream
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| stream_runs(socket, state))
}

/// Serialize and push one message. `Err` means the client is gone.
async fn push(sender: &mut WsSender, msg: &WsMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, "ws message not serializable, skipped");
            Ok(())
        }
    }
}

async fn stream_runs(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the snapshot so no stage between the two is missed
    let mut runs = state.ws_tx.subscribe();

    let snapshot = state.last_run_rx.borrow().clone();
    if let Some(summary) = snapshot {
        let msg = WsMessage::LastRun {
            summary: Box::new(summary),
        };
        if push(&mut sender, &msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            next = runs.recv() => match next {
                Ok(msg) => {
                    if push(&mut sender, &msg).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "ws client lagging, stage points dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients only listen; anything else they send is ignored
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("ws client disconnected");
}
