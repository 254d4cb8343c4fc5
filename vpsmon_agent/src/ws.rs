//! WebSocket upgrade and per-connection push loop. The feed is one-way: a
//! fresh sample every cycle, no acknowledgements expected or read.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{debug, warn};

use crate::metrics::collect_sample;
use crate::state::AppState;

pub const PUSH_INTERVAL: Duration = Duration::from_secs(2);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| push_samples(socket, state))
}

async fn push_samples(mut socket: WebSocket, state: AppState) {
    debug!("dashboard connected");
    let mut ticker = tokio::time::interval(PUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = collect_sample(&state).await;
                let json = match serde_json::to_string(&sample) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize sample");
                        continue;
                    }
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            // Drain inbound frames so pings/closes are handled promptly.
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }
    debug!("dashboard disconnected");
}
