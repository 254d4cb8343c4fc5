//! Socket and thread counting. Linux reads procfs; other platforms report
//! what sysinfo can offer.

use sysinfo::System;

/// (tcp, udp) socket counts.
#[cfg(target_os = "linux")]
pub fn socket_counts() -> (u64, u64) {
    let count = |path: &str| {
        std::fs::read_to_string(path)
            .map(|text| count_entries(&text))
            .unwrap_or(0)
    };
    (
        count("/proc/net/tcp") + count("/proc/net/tcp6"),
        count("/proc/net/udp") + count("/proc/net/udp6"),
    )
}

#[cfg(not(target_os = "linux"))]
pub fn socket_counts() -> (u64, u64) {
    (0, 0)
}

/// Entries in a /proc/net table: every non-empty line after the header.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn count_entries(text: &str) -> u64 {
    text.lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .count() as u64
}

#[cfg(target_os = "linux")]
pub fn thread_count(sys: &System) -> u64 {
    sys.processes()
        .values()
        .map(|p| p.tasks().map(|t| t.len() as u64).unwrap_or(1))
        .sum()
}

#[cfg(not(target_os = "linux"))]
pub fn thread_count(sys: &System) -> u64 {
    sys.processes().len() as u64
}

#[cfg(test)]
mod tests {
    use super::count_entries;

    #[test]
    fn counts_lines_after_header() {
        let table = "  sl  local_address rem_address   st\n\
                     0: 0100007F:1F90 00000000:0000 0A\n\
                     1: 00000000:0050 00000000:0000 0A\n";
        assert_eq!(count_entries(table), 2);
    }

    #[test]
    fn header_only_table_is_empty() {
        assert_eq!(count_entries("  sl  local_address\n"), 0);
        assert_eq!(count_entries(""), 0);
    }
}
