// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::ports::{EngineClient, EngineStats};
use log::{debug, warn};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

/// Fixed-count, fixed-delay retry. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Result of a failed verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeExhausted {
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Polls the engine's own status endpoint until it answers.
pub struct HealthVerifier {
    engine: Arc<dyn EngineClient>,
    policy: RetryPolicy,
}

impl HealthVerifier {
    pub fn new(engine: Arc<dyn EngineClient>, policy: RetryPolicy) -> Self {
        Self { engine, policy }
    }

    pub async fn verify(&self) -> bool {
        self.poll().await.is_ok()
    }

    /// Probe up to `attempts` times, sleeping `delay` between probes. The
    /// first successful probe ends the pass. Probe errors are never
    /// propagated.
    pub async fn poll(&self) -> Result<EngineStats, ProbeExhausted> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.engine.status().await {
                Ok(stats) => {
                    debug!("engine status probe succeeded (attempt={attempt})");
                    return Ok(stats);
                }
                Err(e) => {
                    debug!(
                        "engine status probe {attempt} failed, {} attempt(s) left: {e}",
                        attempts - attempt
                    );
                    last_error = Some(e.to_string());
                }
            }
            if attempt < attempts {
                sleep(self.policy.delay).await;
            }
        }

        warn!(
            "engine status probe failed after {attempts} attempt(s): {}",
            last_error.as_deref().unwrap_or("unknown error")
        );
        Err(ProbeExhausted {
            attempts,
            last_error,
        })
    }
}
