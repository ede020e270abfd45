//! Throughput computation, per the NDT accounting rules.

/// Convert a byte count and elapsed time into kbit/s.
///
/// Callers must guarantee `seconds > 0`.
pub fn rate_kbps(bytes: u64, seconds: f64) -> f64 {
    debug_assert!(seconds > 0.0);
    8.0 * bytes as f64 / 1000.0 / seconds
}
