//! Per-endpoint connection plumbing: status/event types, the `Dialer` seam,
//! and the tokio-tungstenite transport task behind it.
//!
//! A transport task owns exactly one WebSocket for one endpoint. It never
//! touches shared state; everything it learns is reported as `ConnEvent`s
//! tagged with the generation the manager handed it, so events from a dead
//! transport are cheap to discard.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

pub type EndpointId = i64;

/// A read-only snapshot of one configured endpoint row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Lifecycle events flowing from transports (and reconnect timers) into the
/// manager task. `gen` identifies which transport incarnation sent the event.
#[derive(Debug)]
pub enum ConnEvent {
    Opened { id: EndpointId, gen: u64 },
    Message { id: EndpointId, gen: u64, text: String },
    TransportError { id: EndpointId, gen: u64 },
    Closed { id: EndpointId, gen: u64 },
    /// A scheduled reconnect delay elapsed. `gen` is the transport whose
    /// close scheduled it; a timer outliving that incarnation is dropped.
    ReconnectDue { id: EndpointId, gen: u64 },
}

/// Seam between the manager and the wire. The production impl dials real
/// WebSockets; tests substitute a recorder that replays scripted events.
pub trait Dialer: Send + Sync + 'static {
    /// Spawn the transport task for `(endpoint, gen)`. The task reports
    /// lifecycle events on `events` and closes the socket when `shutdown`
    /// resolves. Must not block the caller.
    fn spawn(
        &self,
        endpoint: Endpoint,
        gen: u64,
        events: mpsc::UnboundedSender<ConnEvent>,
        shutdown: oneshot::Receiver<()>,
    );
}

/// Dials the endpoint address with tokio-tungstenite.
pub struct WsDialer;

impl Dialer for WsDialer {
    fn spawn(
        &self,
        endpoint: Endpoint,
        gen: u64,
        events: mpsc::UnboundedSender<ConnEvent>,
        shutdown: oneshot::Receiver<()>,
    ) {
        tokio::spawn(run_transport(endpoint, gen, events, shutdown));
    }
}

async fn run_transport(
    endpoint: Endpoint,
    gen: u64,
    events: mpsc::UnboundedSender<ConnEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    use futures_util::StreamExt;

    let id = endpoint.id;
    let mut ws = match connect_async(endpoint.address.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            debug!(id, gen, error = %e, "dial failed for {}", endpoint.name);
            // Mirror the error-then-close ordering the state machine expects.
            let _ = events.send(ConnEvent::TransportError { id, gen });
            let _ = events.send(ConnEvent::Closed { id, gen });
            return;
        }
    };

    if events.send(ConnEvent::Opened { id, gen }).is_err() {
        return; // manager is gone
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = ws.close(None).await;
                break;
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if events.send(ConnEvent::Message { id, gen, text }).is_err() {
                        return;
                    }
                }
                // Pings are answered by tungstenite on the next read/write.
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(id, gen, error = %e, "transport error for {}", endpoint.name);
                    let _ = events.send(ConnEvent::TransportError { id, gen });
                    break;
                }
            }
        }
    }

    let _ = events.send(ConnEvent::Closed { id, gen });
}
