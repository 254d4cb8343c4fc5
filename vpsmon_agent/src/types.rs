//! The JSON record pushed to the dashboard, one per update cycle.

use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct Sample {
    pub os_name: String,
    pub uptime_days: f64,
    /// 1/5/15 minute load averages.
    pub load: [f64; 3],
    pub cpu: f64,
    // Memory is pre-formatted for display.
    pub mem_used: String,
    pub mem_total: String,
    pub disk_used_gib: f64,
    pub disk_total_gib: f64,
    /// Bytes/sec since the previous refresh.
    pub rx_rate: f64,
    pub tx_rate: f64,
    pub rx_total_gib: f64,
    pub tx_total_gib: f64,
    pub swap_used_mib: f64,
    pub swap_total_mib: f64,
    pub tcp: u64,
    pub udp: u64,
    pub processes: u64,
    pub threads: u64,
}
