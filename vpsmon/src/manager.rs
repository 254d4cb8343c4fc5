//! Connection set manager: owns the live connection map, reconciles it
//! against the configured endpoint list, and runs every per-endpoint state
//! machine by consuming transport events.
//!
//! The manager is a single task fed by two unbounded channels (commands from
//! the API layer, events from transports and reconnect timers), so no two
//! transitions for the same endpoint can ever run concurrently and no caller
//! ever blocks. Reconnects are message-passed: the close path schedules a
//! `ReconnectDue` which is re-validated against the map when it arrives,
//! never a closure capturing a stale endpoint list.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::conn::{ConnEvent, ConnStatus, Dialer, Endpoint, EndpointId};
use crate::readmodel::{EndpointView, ReadModel};
use crate::sample;

/// Fixed retry delay after a transport closes. No cap, no jitter.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Command {
    Reconcile(Vec<Endpoint>),
    /// Acknowledged once every transport has been signalled to close.
    Shutdown(oneshot::Sender<()>),
}

/// Cheap cloneable handle to the manager task.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
    read: ReadModel,
}

impl ManagerHandle {
    /// Align the live connection set with `endpoints`. Returns immediately;
    /// the effects become visible through the read model.
    pub fn reconcile(&self, endpoints: Vec<Endpoint>) {
        let _ = self.commands.send(Command::Reconcile(endpoints));
    }

    /// Close every transport and stop the manager task. Resolves only after
    /// the teardown ran, so callers can rely on the sockets being signalled.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn read(&self) -> ReadModel {
        self.read.clone()
    }
}

struct Entry {
    endpoint: Endpoint,
    gen: u64,
    /// Shutdown signal for the live transport task, if one exists.
    /// Invariant: at most one live transport per endpoint id.
    transport: Option<oneshot::Sender<()>>,
    reconnect_pending: bool,
}

pub struct Manager {
    entries: HashMap<EndpointId, Entry>,
    dialer: Arc<dyn Dialer>,
    events_tx: mpsc::UnboundedSender<ConnEvent>,
    read: ReadModel,
    delay: Duration,
    next_gen: u64,
}

impl Manager {
    /// Spawn the manager task and return its handle.
    pub fn spawn(dialer: Arc<dyn Dialer>) -> ManagerHandle {
        Self::spawn_with_delay(dialer, RECONNECT_DELAY)
    }

    pub fn spawn_with_delay(dialer: Arc<dyn Dialer>, delay: Duration) -> ManagerHandle {
        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let read = ReadModel::new();

        let mut mgr = Manager {
            entries: HashMap::new(),
            dialer,
            events_tx,
            read: read.clone(),
            delay,
            next_gen: 0,
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = commands_rx.recv() => match cmd {
                        Some(Command::Reconcile(eps)) => mgr.reconcile(eps).await,
                        Some(Command::Shutdown(ack)) => {
                            mgr.teardown_all().await;
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            mgr.teardown_all().await;
                            break;
                        }
                    },
                    Some(ev) = events_rx.recv() => mgr.handle_event(ev).await,
                }
            }
            info!("connection manager stopped");
        });

        ManagerHandle {
            commands: commands_tx,
            read,
        }
    }

    async fn reconcile(&mut self, endpoints: Vec<Endpoint>) {
        // Tear down what is no longer configured.
        let removed: Vec<EndpointId> = self
            .entries
            .keys()
            .copied()
            .filter(|id| !endpoints.iter().any(|e| e.id == *id))
            .collect();
        for id in removed {
            self.teardown(id).await;
        }

        for ep in endpoints {
            // Existing ids are left connected, but the stored record is
            // refreshed so a later reconnect dials the current address.
            if let Some(entry) = self.entries.get_mut(&ep.id) {
                if entry.endpoint.name != ep.name {
                    self.read.rename(ep.id, ep.name.clone()).await;
                }
                entry.endpoint = ep;
                continue;
            }

            info!(id = ep.id, name = %ep.name, "adding endpoint");
            self.entries.insert(
                ep.id,
                Entry {
                    endpoint: ep.clone(),
                    gen: 0,
                    transport: None,
                    reconnect_pending: false,
                },
            );
            self.dial(ep.id).await;
        }
    }

    /// Open a fresh transport for an endpoint already present in the map.
    /// Resets the read-model entry to `connecting` with no sample.
    async fn dial(&mut self, id: EndpointId) {
        let gen = self.next_gen;
        self.next_gen += 1;

        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        entry.gen = gen;
        entry.transport = Some(shutdown_tx);

        self.read
            .insert(id, EndpointView::connecting(entry.endpoint.name.clone()))
            .await;
        debug!(id, gen, "dialing {}", entry.endpoint.address);
        self.dialer
            .spawn(entry.endpoint.clone(), gen, self.events_tx.clone(), shutdown_rx);
    }

    /// Cancel any pending reconnect, close the transport, and drop all state
    /// for this id. A timer that fires afterwards finds no entry and no-ops.
    async fn teardown(&mut self, id: EndpointId) {
        if let Some(entry) = self.entries.remove(&id) {
            info!(id, name = %entry.endpoint.name, "removing endpoint");
            if let Some(shutdown) = entry.transport {
                let _ = shutdown.send(());
            }
            self.read.remove(id).await;
        }
    }

    async fn teardown_all(&mut self) {
        let ids: Vec<EndpointId> = self.entries.keys().copied().collect();
        for id in ids {
            self.teardown(id).await;
        }
    }

    /// Look up the entry an event belongs to, discarding events from torn
    /// down or superseded transports.
    fn entry_for(&mut self, id: EndpointId, gen: u64) -> Option<&mut Entry> {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.gen == gen => Some(entry),
            Some(_) => {
                debug!(id, gen, "dropping event from stale transport");
                None
            }
            None => None,
        }
    }

    async fn handle_event(&mut self, ev: ConnEvent) {
        match ev {
            ConnEvent::Opened { id, gen } => {
                if self.entry_for(id, gen).is_some() {
                    self.read.set_status(id, ConnStatus::Connected).await;
                }
            }
            ConnEvent::Message { id, gen, text } => {
                if self.entry_for(id, gen).is_none() {
                    return;
                }
                match sample::decode(&text) {
                    Ok(s) => self.read.record_sample(id, s, Utc::now()).await,
                    // A malformed message is not a connection failure.
                    Err(e) => warn!(id, error = %e, "discarding sample"),
                }
            }
            ConnEvent::TransportError { id, gen } => {
                if self.entry_for(id, gen).is_some() {
                    self.read.set_status(id, ConnStatus::Error).await;
                }
            }
            ConnEvent::Closed { id, gen } => {
                let delay = self.delay;
                let events = self.events_tx.clone();
                let Some(entry) = self.entry_for(id, gen) else {
                    return;
                };
                entry.transport = None;
                self.read.set_status(id, ConnStatus::Disconnected).await;

                // One pending retry per endpoint, local to this id.
                let Some(entry) = self.entries.get_mut(&id) else {
                    return;
                };
                if !entry.reconnect_pending {
                    entry.reconnect_pending = true;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = events.send(ConnEvent::ReconnectDue { id, gen });
                    });
                }
            }
            ConnEvent::ReconnectDue { id, gen } => {
                // Same stale-gen filter as transport events: a timer from an
                // endpoint that was removed (or removed and re-added) while
                // it was pending must not touch the current incarnation.
                let due = match self.entry_for(id, gen) {
                    Some(entry) => {
                        entry.reconnect_pending = false;
                        // Guard against a retry firing after the transport
                        // was already recreated by other means.
                        entry.transport.is_none()
                    }
                    None => return,
                };
                if due {
                    debug!(id, "reconnecting");
                    self.dial(id).await;
                }
            }
        }
    }
}
