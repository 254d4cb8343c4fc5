//! Types that mirror the probe's JSON schema, plus the decoder for one
//! inbound push message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One decoded metrics snapshot from a probe. Values are stored exactly as
/// received; CPU percent is clamped only when rendered (see `format`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub os_name: String,
    pub uptime_days: f64,
    /// 1/5/15 minute load averages.
    pub load: [f64; 3],
    pub cpu: f64,
    // The probe pre-formats memory as display strings.
    pub mem_used: String,
    pub mem_total: String,
    pub disk_used_gib: f64,
    pub disk_total_gib: f64,
    /// Instantaneous rates in bytes/sec.
    pub rx_rate: f64,
    pub tx_rate: f64,
    /// Cumulative totals since the probe started.
    pub rx_total_gib: f64,
    pub tx_total_gib: f64,
    pub swap_used_mib: f64,
    pub swap_total_mib: f64,
    pub tcp: u64,
    pub udp: u64,
    pub processes: u64,
    pub threads: u64,
}

#[derive(Debug, Error)]
#[error("malformed probe payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Parse one inbound text payload. Every syntax error or missing field is a
/// `DecodeError`; callers treat it as "no update this tick", never as
/// connection-fatal.
pub fn decode(payload: &str) -> Result<Sample, DecodeError> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_json(cpu: f64) -> String {
        format!(
            r#"{{
                "os_name": "Ubuntu 24.04", "uptime_days": 1.25,
                "load": [0.31, 0.24, 0.18], "cpu": {cpu},
                "mem_used": "1.2 GB", "mem_total": "3.8 GB",
                "disk_used_gib": 12.4, "disk_total_gib": 78.7,
                "rx_rate": 1536.0, "tx_rate": 512.0,
                "rx_total_gib": 4.2, "tx_total_gib": 1.1,
                "swap_used_mib": 0.0, "swap_total_mib": 2048.0,
                "tcp": 14, "udp": 3,
                "processes": 132, "threads": 411
            }}"#
        )
    }

    #[test]
    fn decodes_full_payload() {
        let s = decode(&sample_json(42.5)).unwrap();
        assert_eq!(s.os_name, "Ubuntu 24.04");
        assert_eq!(s.load, [0.31, 0.24, 0.18]);
        assert_eq!(s.cpu, 42.5);
        assert_eq!(s.mem_total, "3.8 GB");
        assert_eq!(s.tcp, 14);
        assert_eq!(s.threads, 411);
    }

    #[test]
    fn rejects_malformed_syntax() {
        assert!(decode("{not json").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn rejects_missing_field() {
        // Drop a required field and make sure the whole decode fails.
        let payload = sample_json(1.0).replace(r#""tcp": 14,"#, "");
        assert!(decode(&payload).is_err());
    }

    #[test]
    fn rejects_wrong_load_arity() {
        let payload = sample_json(1.0).replace("[0.31, 0.24, 0.18]", "[0.31, 0.24]");
        assert!(decode(&payload).is_err());
    }

    #[test]
    fn stores_out_of_range_cpu_unclamped() {
        // A misbehaving probe can report > 100; storage keeps the raw value.
        let s = decode(&sample_json(250.0)).unwrap();
        assert_eq!(s.cpu, 250.0);
    }
}
