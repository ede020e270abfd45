use std::collections::HashMap;

use serde::Serialize;

/// Measured results of one NDT session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// Hostname of the measured server.
    pub server: String,
    /// Download (S2C) throughput in kbit/s, if that test ran.
    pub download_kbps: Option<f64>,
    /// Upload (C2S) throughput in kbit/s, if that test ran.
    pub upload_kbps: Option<f64>,
    /// Server-reported performance counters (e.g. `MinRTT`) mined from the
    /// download test's result frames.
    pub reported_vars: HashMap<String, String>,
}
