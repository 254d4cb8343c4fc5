//! Human-readable formatting for derived metrics. Pure functions; inputs are
//! already validated non-negative by the decoder.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Base-1024 byte magnitude with up to two decimals, trailing zeros trimmed.
/// `0.0` renders as `"0 B"`.
pub fn format_bytes(bytes: f64) -> String {
    if bytes == 0.0 {
        return "0 B".to_string();
    }
    let mut v = bytes;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", s, UNITS[unit])
}

/// Fractional-day uptime: `"Xh Ym"` under one day, else `"N day(s) Xh"`.
pub fn format_uptime(days: f64) -> String {
    if days < 1.0 {
        let hours = (days * 24.0).floor();
        let minutes = ((days * 24.0 - hours) * 60.0).floor();
        return format!("{hours:.0}h {minutes:.0}m");
    }
    let whole = days.floor();
    let hours = ((days - whole) * 24.0).floor();
    if whole == 1.0 {
        format!("1 day {hours:.0}h")
    } else {
        format!("{whole:.0} days {hours:.0}h")
    }
}

/// Render-time clamp for CPU percent. Stored samples keep the raw value.
pub fn clamp_cpu(pct: f64) -> f64 {
    pct.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_zero() {
        assert_eq!(format_bytes(0.0), "0 B");
    }

    #[test]
    fn bytes_units() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(1536.0), "1.5 KB");
        assert_eq!(format_bytes(1024.0 * 1024.0), "1 MB");
        assert_eq!(format_bytes(2.5 * 1024.0 * 1024.0 * 1024.0), "2.5 GB");
        assert_eq!(format_bytes(3.0 * 1024f64.powi(4)), "3 TB");
    }

    #[test]
    fn bytes_two_decimal_precision() {
        assert_eq!(format_bytes(1126.0), "1.1 KB"); // 1.0996 -> 1.10 -> trim
        assert_eq!(format_bytes(1153.0), "1.13 KB");
        // Beyond TB just keeps scaling in TB.
        assert_eq!(format_bytes(1536.0 * 1024f64.powi(4)), "1536 TB");
    }

    #[test]
    fn uptime_under_one_day() {
        assert_eq!(format_uptime(0.5), "12h 0m");
        assert_eq!(format_uptime(0.0), "0h 0m");
        assert_eq!(format_uptime(0.99), "23h 45m");
    }

    #[test]
    fn uptime_day_pluralization() {
        assert_eq!(format_uptime(1.25), "1 day 6h");
        assert_eq!(format_uptime(2.5), "2 days 12h");
        assert_eq!(format_uptime(1.0), "1 day 0h");
    }

    #[test]
    fn cpu_clamped_for_display_only() {
        assert_eq!(clamp_cpu(250.0), 100.0);
        assert_eq!(clamp_cpu(-3.0), 0.0);
        assert_eq!(clamp_cpu(42.5), 42.5);
    }
}
