//! Outbound probes: payload generation and the HTTP executor.

use std::time::Duration;

pub mod http;
pub mod payload;

pub use self::payload::{PayloadGenerator, RandomPayload};

/// Status recorded when no remote response was received.
pub const SENTINEL_STATUS: u16 = 0;

/// Result of a single probe attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The target answered. Any status code counts.
    Response {
        status: u16,
        body: String,
        elapsed: Duration,
    },
    /// Transport error or timeout; nothing came back.
    Failed { error: String, elapsed: Duration },
}

impl ProbeOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            ProbeOutcome::Response { elapsed, .. } | ProbeOutcome::Failed { elapsed, .. } => {
                *elapsed
            }
        }
    }

    /// Status to persist: the remote code, or [`SENTINEL_STATUS`].
    pub fn status_code(&self) -> u16 {
        match self {
            ProbeOutcome::Response { status, .. } => *status,
            ProbeOutcome::Failed { .. } => SENTINEL_STATUS,
        }
    }

    /// Serialized body to persist. Failures become `{"error": "..."}`.
    pub fn response_data(&self) -> String {
        match self {
            ProbeOutcome::Response { body, .. } => body.clone(),
            ProbeOutcome::Failed { error, .. } => {
                serde_json::json!({ "error": error }).to_string()
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeOutcome::Failed { .. })
    }
}

/// Trait for all active probes
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Make exactly one attempt. Errors are folded into
    /// [`ProbeOutcome::Failed`] and never returned.
    async fn execute(&self, payload: &RandomPayload) -> ProbeOutcome;
}
