//! Consumer-facing projection of the connection set: per endpoint id, the
//! current status plus the most recent sample and its arrival time. Written
//! only by the manager task; read concurrently by the HTTP layer. Transport
//! handles never appear here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::conn::{ConnStatus, EndpointId};
use crate::sample::Sample;

#[derive(Debug, Clone, Serialize)]
pub struct EndpointView {
    pub name: String,
    pub status: ConnStatus,
    pub last_sample: Option<Sample>,
    pub last_update: Option<DateTime<Utc>>,
}

impl EndpointView {
    pub(crate) fn connecting(name: String) -> Self {
        Self {
            name,
            status: ConnStatus::Connecting,
            last_sample: None,
            last_update: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct ReadModel {
    inner: Arc<RwLock<HashMap<EndpointId, EndpointView>>>,
}

impl ReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self, id: EndpointId) -> Option<ConnStatus> {
        self.inner.read().await.get(&id).map(|v| v.status)
    }

    pub async fn sample(&self, id: EndpointId) -> Option<Sample> {
        self.inner.read().await.get(&id).and_then(|v| v.last_sample.clone())
    }

    pub async fn last_update(&self, id: EndpointId) -> Option<DateTime<Utc>> {
        self.inner.read().await.get(&id).and_then(|v| v.last_update)
    }

    /// One atomic per-endpoint snapshot: sample and timestamp are guaranteed
    /// to come from the same update.
    pub async fn view(&self, id: EndpointId) -> Option<EndpointView> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<EndpointId, EndpointView> {
        self.inner.read().await.clone()
    }

    // Writers below are manager-only.

    pub(crate) async fn insert(&self, id: EndpointId, view: EndpointView) {
        self.inner.write().await.insert(id, view);
    }

    pub(crate) async fn remove(&self, id: EndpointId) {
        self.inner.write().await.remove(&id);
    }

    pub(crate) async fn rename(&self, id: EndpointId, name: String) {
        if let Some(v) = self.inner.write().await.get_mut(&id) {
            v.name = name;
        }
    }

    pub(crate) async fn set_status(&self, id: EndpointId, status: ConnStatus) {
        if let Some(v) = self.inner.write().await.get_mut(&id) {
            v.status = status;
        }
    }

    pub(crate) async fn record_sample(&self, id: EndpointId, sample: Sample, at: DateTime<Utc>) {
        if let Some(v) = self.inner.write().await.get_mut(&id) {
            v.last_sample = Some(sample);
            v.last_update = Some(at);
        }
    }
}
