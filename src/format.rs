//! Human-readable formatting of sizes and durations.

use std::time::Duration;

use crate::download::Eta;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Formats a byte count as `B`, `KB`, `MB` or `GB` with one decimal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    }
}

/// Formats a duration as `1h 2m 3s`, dropping leading zero units.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Formats an ETA; indeterminate values never render a number.
#[must_use]
pub fn format_eta(eta: Eta) -> String {
    match eta {
        Eta::Remaining(remaining) => format_duration(remaining),
        Eta::Calculating => "calculating".to_string(),
        Eta::Indeterminate => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(176 * MIB), "176.0 MB");
        assert_eq!(format_bytes(2 * GIB + GIB / 2), "2.5 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(7)), "7s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_eta_indeterminate_has_no_digits() {
        let text = format_eta(Eta::Indeterminate);
        assert!(!text.chars().any(|c| c.is_ascii_digit()));
        assert_eq!(format_eta(Eta::Remaining(Duration::from_secs(61))), "1m 1s");
    }
}
