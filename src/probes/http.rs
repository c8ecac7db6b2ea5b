use super::{Probe, ProbeOutcome, RandomPayload};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Default probe target: echoes the request back as JSON.
pub const DEFAULT_TARGET: &str = "https://httpbin.org/anything";

/// Upper bound on a single probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP probe POSTing a JSON payload and timing the reply.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    target: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pingwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            target: target.into(),
            timeout,
        })
    }

}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn execute(&self, payload: &RandomPayload) -> ProbeOutcome {
        let start = Instant::now();

        // The client timeout covers connect + body; the outer guard also
        // bounds anything the client does not (e.g. slow DNS).
        let attempt = async {
            let response = self.client.post(&self.target).json(payload).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await;
            Ok::<_, reqwest::Error>((status, body))
        };
        let result = tokio::time::timeout(self.timeout, attempt).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok((status, Ok(text)))) => {
                tracing::debug!(target_url = %self.target, status, elapsed_ms = elapsed.as_millis() as u64, "Probe answered");
                ProbeOutcome::Response {
                    status,
                    body: normalize_body(text),
                    elapsed,
                }
            }
            Ok(Ok((status, Err(e)))) => {
                // A response without its body is not an answer.
                tracing::warn!(target_url = %self.target, status, "Failed to read probe body: {}", e);
                ProbeOutcome::Failed {
                    error: describe(&e, self.timeout),
                    elapsed,
                }
            }
            Ok(Err(e)) => ProbeOutcome::Failed {
                error: describe(&e, self.timeout),
                elapsed,
            },
            Err(_) => ProbeOutcome::Failed {
                error: timed_out(self.timeout),
                elapsed,
            },
        }
    }
}

/// Canonical JSON when the body parses, otherwise the raw text as a JSON string.
fn normalize_body(text: String) -> String {
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value.to_string(),
        Err(_) => Value::String(text).to_string(),
    }
}

fn describe(e: &reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        timed_out(timeout)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

fn timed_out(timeout: Duration) -> String {
    format!("request timed out after {}ms", timeout.as_millis())
}
