//! Synthetic request bodies for the HTTP probe.
//!
//! Every probe sends a fresh payload so the echo endpoint never sees two
//! identical requests. The clock and random source are injectable so tests can
//! pin both.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::SecondsFormat;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Upper bound (exclusive) for `data.value1`.
pub const VALUE1_UPPER: u32 = 100;

/// Body POSTed to the probe target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomPayload {
    #[serde(rename = "timeStamp", alias = "timestamp")]
    pub time_stamp: String,
    pub random: f64,
    pub data: PayloadData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadData {
    pub value1: u32,
    pub value2: String,
}

/// Builds one [`RandomPayload`] per call.
pub struct PayloadGenerator {
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl PayloadGenerator {
    pub fn new(clock: Arc<dyn Clock>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            clock,
            rng: Mutex::new(rng),
        }
    }

    /// Deterministic generator for tests and reproducible runs.
    pub fn seeded(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::new(clock, Box::new(StdRng::seed_from_u64(seed)))
    }

    pub fn generate(&self) -> RandomPayload {
        let now = self.clock.now();
        let (random, value1) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let random: f64 = rng.gen();
            let value1 = rng.gen_range(0..VALUE1_UPPER);
            (random, value1)
        };

        RandomPayload {
            time_stamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            random,
            data: PayloadData {
                value1,
                value2: format!("test-{}", now.timestamp_millis()),
            },
        }
    }
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Box::new(StdRng::from_entropy()))
    }
}

impl std::fmt::Debug for PayloadGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadGenerator").finish_non_exhaustive()
    }
}
