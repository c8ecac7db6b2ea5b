//! The persisted probe result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::probes::RandomPayload;

/// One completed probe attempt, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub id: i64,
    pub request_payload: String,
    pub response_data: String,
    pub status_code: u16,
    /// Milliseconds from dispatch to response or failure.
    pub response_time: u64,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// Decode the request snapshot. `None` when it is not a payload we sent.
    pub fn parsed_request(&self) -> Option<RandomPayload> {
        serde_json::from_str(&self.request_payload).ok()
    }

    /// Decode the response snapshot. `None` when it is not valid JSON.
    pub fn parsed_response(&self) -> Option<Value> {
        serde_json::from_str(&self.response_data).ok()
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Caller-owned fields of a [`ProbeResult`]; the store assigns the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProbeResult {
    pub request_payload: String,
    pub response_data: String,
    pub status_code: u16,
    pub response_time: u64,
}
