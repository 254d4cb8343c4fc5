//! Sample collection using sysinfo.

use sysinfo::{Disks, System};

use crate::net;
use crate::state::AppState;
use crate::types::Sample;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

pub async fn collect_sample(state: &AppState) -> Sample {
    let mut sys = state.sys.lock().await;
    sys.refresh_all();

    let os_name = match (System::name(), System::os_version()) {
        (Some(n), Some(v)) => format!("{n} {v}"),
        (Some(n), None) => n,
        _ => "unknown".to_string(),
    };
    let uptime_days = System::uptime() as f64 / 86_400.0;
    let la = System::load_average();

    // Disks: fresh handle each cycle, skipping pseudo-filesystems with no
    // reported space.
    let disks = Disks::new_with_refreshed_list();
    let (mut disk_total, mut disk_avail) = (0u64, 0u64);
    for d in disks.list().iter().filter(|d| d.total_space() > 0) {
        disk_total += d.total_space();
        disk_avail += d.available_space();
    }

    // Networks: received()/transmitted() are deltas since the last refresh,
    // so rate = delta / elapsed. Totals are cumulative.
    let mut nets = state.nets.lock().await;
    nets.refresh();
    let mut last = state.last_net_refresh.lock().await;
    let elapsed = last.elapsed().as_secs_f64().max(1e-6);
    *last = std::time::Instant::now();

    let (mut rx_delta, mut tx_delta, mut rx_total, mut tx_total) = (0u64, 0u64, 0u64, 0u64);
    for (_name, data) in nets.iter() {
        rx_delta += data.received();
        tx_delta += data.transmitted();
        rx_total += data.total_received();
        tx_total += data.total_transmitted();
    }

    let (tcp, udp) = net::socket_counts();

    Sample {
        os_name,
        uptime_days,
        load: [la.one, la.five, la.fifteen],
        cpu: sys.global_cpu_usage() as f64,
        mem_used: human_bytes(sys.used_memory() as f64),
        mem_total: human_bytes(sys.total_memory() as f64),
        disk_used_gib: (disk_total - disk_avail) as f64 / GIB,
        disk_total_gib: disk_total as f64 / GIB,
        rx_rate: rx_delta as f64 / elapsed,
        tx_rate: tx_delta as f64 / elapsed,
        rx_total_gib: rx_total as f64 / GIB,
        tx_total_gib: tx_total as f64 / GIB,
        swap_used_mib: sys.used_swap() as f64 / MIB,
        swap_total_mib: sys.total_swap() as f64 / MIB,
        tcp,
        udp,
        processes: sys.processes().len() as u64,
        threads: net::thread_count(&sys),
    }
}

/// Base-1024 display string, one decimal. The dashboard shows these as-is.
fn human_bytes(b: f64) -> String {
    const K: f64 = 1024.0;
    if b < K {
        return format!("{b:.0} B");
    }
    let kb = b / K;
    if kb < K {
        return format!("{kb:.1} KB");
    }
    let mb = kb / K;
    if mb < K {
        return format!("{mb:.1} MB");
    }
    let gb = mb / K;
    if gb < K {
        return format!("{gb:.1} GB");
    }
    format!("{:.1} TB", gb / K)
}

#[cfg(test)]
mod tests {
    use super::human_bytes;

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(0.0), "0 B");
        assert_eq!(human_bytes(512.0), "512 B");
        assert_eq!(human_bytes(1536.0), "1.5 KB");
        assert_eq!(human_bytes(3.5 * 1024.0 * 1024.0 * 1024.0), "3.5 GB");
    }
}
