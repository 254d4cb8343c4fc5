//! Shared probe state: persistent sysinfo handles so CPU usage and network
//! deltas are meaningful across refreshes.

use std::sync::Arc;
use std::time::Instant;

use sysinfo::{Networks, System};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub sys: Arc<Mutex<System>>,
    pub nets: Arc<Mutex<Networks>>,
    /// When the networks handle was last refreshed, for rate computation.
    pub last_net_refresh: Arc<Mutex<Instant>>,
}

impl AppState {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let nets = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            nets: Arc::new(Mutex::new(nets)),
            last_net_refresh: Arc::new(Mutex::new(Instant::now())),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
