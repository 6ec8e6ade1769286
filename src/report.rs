//! # Reporting
//!
//! Human-readable formatting for periodic status lines and the final run summary.
//! Pure formatting helpers, no business logic -- mirrors the teacher's `utils.rs`
//! formatter style and ports `original_source/src/valueformatter.hpp`'s
//! `toHumanReadable` (decimal-prefix scaling with a fixed two-decimal precision)
//! to Rust, colorized with the teacher's `colored` dependency.

use colored::Colorize;

use crate::stats::Counters;
use crate::worker::StatsReport;

/// Scales `value` into the largest decimal prefix (k/M/G) that keeps the
/// mantissa below 1000, matching `cValueFormatter::toHumanReadable(value, false)`.
pub fn human_count(value: i64) -> String {
    let v = value as f64;
    let abs = v.abs();
    if abs > 1_000_000_000.0 {
        format!("{:.2} G", v / 1_000_000_000.0)
    } else if abs > 1_000_000.0 {
        format!("{:.2} M", v / 1_000_000.0)
    } else if abs > 1_000.0 {
        format!("{:.2} k", v / 1_000.0)
    } else {
        format!("{value}")
    }
}

/// As `human_count`, but with binary prefixes (Ki/Mi/Gi) -- used for octet
/// counts, matching `toHumanReadable(value, true)`.
pub fn human_bytes(value: i64) -> String {
    let v = value as f64;
    let abs = v.abs();
    if abs > (1024 * 1024 * 1024) as f64 {
        format!("{:.2} GiB", v / (1024.0 * 1024.0 * 1024.0))
    } else if abs > (1024 * 1024) as f64 {
        format!("{:.2} MiB", v / (1024.0 * 1024.0))
    } else if abs > 1024.0 {
        format!("{:.2} KiB", v / 1024.0)
    } else {
        format!("{value} B")
    }
}

fn rate_per_sec(octets: i64, elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return "n/a".to_string();
    }
    human_bytes((octets as f64 / secs) as i64) + "/s"
}

/// One periodic status line for a single connection: client id, description,
/// and the delta counters/rate since the previous tick.
pub fn status_line(client_id: u64, description: &str, report: &StatsReport) -> String {
    let header = format!("[{client_id}] {description}").cyan();
    format!(
        "{header} sent {} pkts / {} ({}) recv {} pkts / {} ({})",
        report.delta.sent_packets,
        human_bytes(report.delta.sent_octets),
        rate_per_sec(report.delta.sent_octets, report.delta_duration),
        report.delta.received_packets,
        human_bytes(report.delta.received_octets),
        rate_per_sec(report.delta.received_octets, report.delta_duration),
    )
}

/// The final aggregate summary line printed once every worker has finished.
pub fn summary_line(total: &Counters) -> String {
    format!(
        "{} sent {} packets ({}), received {} packets ({}), {} errors, {} timeouts",
        "summary:".green().bold(),
        human_count(total.sent_packets),
        human_bytes(total.sent_octets),
        human_count(total.received_packets),
        human_bytes(total.received_octets),
        total.errors,
        total.timeouts,
    )
}

/// As `summary_line`, but as a JSON object (`--json`), for callers that parse
/// the final summary rather than read it.
pub fn summary_json(total: &Counters) -> String {
    serde_json::to_string(total).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_count_scales_by_decimal_prefix() {
        assert_eq!(human_count(42), "42");
        assert_eq!(human_count(5_000), "5.00 k");
        assert_eq!(human_count(2_500_000), "2.50 M");
    }

    #[test]
    fn human_bytes_scales_by_binary_prefix() {
        assert_eq!(human_bytes(100), "100 B");
        assert_eq!(human_bytes(2048), "2.00 KiB");
        assert_eq!(human_bytes(1024 * 1024 * 3), "3.00 MiB");
    }
}
