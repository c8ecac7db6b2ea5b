use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::ProbeResult;

/// Dashboard summary over a window of results (newest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub total_requests: usize,
    /// Percentage of results with status 200.
    pub success_rate: f64,
    /// Rounded mean response time in milliseconds.
    pub avg_response_time: u64,
    pub failed_requests: usize,
    pub last_ping_time: Option<DateTime<Utc>>,
}

impl MonitorStats {
    pub fn from_results(results: &[ProbeResult]) -> Self {
        if results.is_empty() {
            return Self {
                total_requests: 0,
                success_rate: 0.0,
                avg_response_time: 0,
                failed_requests: 0,
                last_ping_time: None,
            };
        }

        let total = results.len();
        let successes = results.iter().filter(|r| r.is_success()).count();
        let total_ms: u128 = results.iter().map(|r| u128::from(r.response_time)).sum();
        let avg = (total_ms as f64 / total as f64).round() as u64;

        Self {
            total_requests: total,
            success_rate: successes as f64 / total as f64 * 100.0,
            avg_response_time: avg,
            failed_requests: total - successes,
            last_ping_time: results.iter().map(|r| r.timestamp).max(),
        }
    }
}
