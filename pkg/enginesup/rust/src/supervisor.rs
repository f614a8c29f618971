// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Turns "apply this configuration" into a verified running (or stopped)
//! engine.
//!
//! At most one `start` runs at a time per supervisor: the in-flight check and
//! the transition to [`Phase::Starting`] happen under the same lock, and the
//! flag is released by a drop guard so an unwinding or cancelled attempt
//! cannot wedge the supervisor. The lock is never held across an await.

use crate::checksum;
use crate::controller::ProcessController;
use crate::errors::StartError;
use crate::health::HealthVerifier;
use crate::known_errors::{self, KNOWN_ERROR_MARKER};
use crate::ports::{ConfigStore, EngineClient};
use crate::state::Phase;
use crate::system::SystemSnapshot;
use crate::tags;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Skip the restart when the same configuration is already running.
    pub dedup: bool,
    /// Engine binary path, reported by [`LifecycleSupervisor::engine_info`].
    pub engine_binary: String,
    /// Host snapshot captured at boot.
    pub system: Option<SystemSnapshot>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            dedup: true,
            engine_binary: crate::config::DEFAULT_ENGINE_BINARY.to_string(),
            system: None,
        }
    }
}

pub struct Collaborators {
    pub controller: ProcessController,
    pub verifier: HealthVerifier,
    pub engine: Arc<dyn EngineClient>,
    pub store: Arc<dyn ConfigStore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    /// False when another start was already running.
    pub accepted: bool,
    /// True only once the engine answered its status endpoint.
    pub success: bool,
    pub version: Option<String>,
    pub error: Option<String>,
    pub system: Option<SystemSnapshot>,
    #[serde(skip)]
    pub failure: Option<StartError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub online: bool,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub online: bool,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub version: Option<String>,
    pub path: String,
    pub system: Option<SystemSnapshot>,
}

#[derive(Debug, Default)]
struct LifecycleState {
    phase: Phase,
    start_in_flight: bool,
    config_checksum: Option<String>,
    inbound_tags: Vec<String>,
    engine_version: Option<String>,
}

impl LifecycleState {
    fn transition(&mut self, next: Phase) {
        if !self.phase.can_transition_to(next) {
            warn!("unexpected engine phase transition {} -> {next}", self.phase);
        }
        self.phase = next;
        if next == Phase::Offline {
            self.config_checksum = None;
        }
    }
}

enum Applied {
    Unchanged,
    Restarted,
}

pub struct LifecycleSupervisor {
    state: Mutex<LifecycleState>,
    controller: ProcessController,
    verifier: HealthVerifier,
    engine: Arc<dyn EngineClient>,
    store: Arc<dyn ConfigStore>,
    options: SupervisorOptions,
}

impl LifecycleSupervisor {
    pub fn new(collaborators: Collaborators, options: SupervisorOptions) -> Self {
        Self {
            state: Mutex::new(LifecycleState::default()),
            controller: collaborators.controller,
            verifier: collaborators.verifier,
            engine: collaborators.engine,
            store: collaborators.store,
            options,
        }
    }

    /// Read and cache the engine version. Failures are logged and leave the
    /// version unset.
    pub async fn initialize(&self) {
        match self.engine.version().await {
            Ok(version) => {
                info!("engine version {version}");
                self.lock_state().engine_version = Some(version);
            }
            Err(e) => warn!("could not read engine version: {e}"),
        }
    }

    pub async fn start(&self, config: Value, source_ip: &str) -> StartOutcome {
        let Some(prior) = self.try_begin() else {
            warn!("engine start requested by {source_ip} rejected: a start is already in progress");
            return StartOutcome {
                accepted: false,
                success: false,
                version: self.engine_version(),
                error: Some(StartError::ConcurrencyBusy.to_string()),
                system: None,
                failure: Some(StartError::ConcurrencyBusy),
            };
        };
        let _attempt = StartAttempt {
            state: &self.state,
            started: Instant::now(),
        };

        let checksum = checksum::compute(&config);
        let tags = tags::extract(&config);
        info!(
            "applying engine config (checksum={checksum}, source_ip={source_ip}, inbounds={})",
            tags.len()
        );
        self.lock_state().inbound_tags = tags;

        let result = self.apply(&config, &checksum, prior).await;
        let version = self.engine_version();

        match result {
            Ok(applied) => {
                self.finish(Phase::Online);
                match applied {
                    Applied::Unchanged => StartOutcome {
                        accepted: true,
                        success: true,
                        version,
                        error: None,
                        system: None,
                        failure: None,
                    },
                    Applied::Restarted => {
                        info!(
                            "engine started (version={}, checksum={checksum}, source_ip={source_ip})",
                            version.as_deref().unwrap_or("unknown")
                        );
                        StartOutcome {
                            accepted: true,
                            success: true,
                            version,
                            error: None,
                            system: self.options.system.clone(),
                            failure: None,
                        }
                    }
                }
            }
            Err(err) => {
                self.finish(Phase::Offline);
                log_start_failure(&err, &checksum, source_ip, version.as_deref());
                let verified_failure = matches!(err, StartError::HealthCheckTimeout { .. });
                StartOutcome {
                    accepted: true,
                    success: false,
                    version: if verified_failure { version } else { None },
                    error: Some(err.to_string()),
                    system: if verified_failure {
                        self.options.system.clone()
                    } else {
                        None
                    },
                    failure: Some(err),
                }
            }
        }
    }

    async fn apply(&self, config: &Value, checksum: &str, prior: Phase) -> Result<Applied, StartError> {
        let generated = Instant::now();

        if self.options.dedup && prior == Phase::Online {
            let previous = self.lock_state().config_checksum.clone();
            debug!(
                "dedup check (previous={}, new={checksum})",
                previous.as_deref().unwrap_or("none")
            );
            if previous.as_deref() == Some(checksum) {
                if self.verifier.verify().await {
                    info!("engine already online with checksum {checksum}, skipping restart");
                    return Ok(Applied::Unchanged);
                }
                warn!("engine online with checksum {checksum} but not answering, restarting");
            }
        }

        self.lock_state().config_checksum = Some(checksum.to_string());
        self.store
            .set(config)
            .await
            .map_err(|e| StartError::UnknownInternal(e.to_string()))?;
        debug!("engine config generated in {:?}", generated.elapsed());

        if let Err(e) = self.controller.restart().await {
            let raw = e.to_string();
            return Err(match known_errors::classify(&raw, self.controller.name()) {
                Some(known) => StartError::SpawnFailure { known, raw },
                None => StartError::ProcessControlFailure(e),
            });
        }

        self.verifier
            .poll()
            .await
            .map(|_| Applied::Restarted)
            .map_err(|exhausted| StartError::HealthCheckTimeout {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error,
            })
    }

    /// Kill the engine and forget the applied configuration. The state is
    /// reset even if some kill steps failed.
    pub async fn stop(&self) -> StopOutcome {
        self.controller.kill_all().await;

        self.lock_state().transition(Phase::Offline);

        match self.store.clear().await {
            Ok(()) => StopOutcome { success: true },
            Err(e) => {
                error!("could not clear engine config: {e}");
                StopOutcome { success: false }
            }
        }
    }

    pub fn status(&self) -> StatusReport {
        let state = self.lock_state();
        StatusReport {
            online: state.phase.is_online(),
            version: state.engine_version.clone(),
        }
    }

    pub fn health_check(&self) -> HealthReport {
        match self.state.lock() {
            Ok(state) => HealthReport {
                ok: true,
                online: state.phase.is_online(),
                version: state.engine_version.clone(),
            },
            Err(_) => {
                error!("engine state lock poisoned, reporting unhealthy");
                HealthReport {
                    ok: false,
                    online: false,
                    version: None,
                }
            }
        }
    }

    /// Inbound tags of the last applied configuration.
    pub fn applied_inbound_tags(&self) -> Vec<String> {
        self.lock_state().inbound_tags.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock_state().phase
    }

    pub fn config_checksum(&self) -> Option<String> {
        self.lock_state().config_checksum.clone()
    }

    pub fn engine_version(&self) -> Option<String> {
        self.lock_state().engine_version.clone()
    }

    pub fn engine_info(&self) -> EngineInfo {
        EngineInfo {
            version: self.engine_version(),
            path: self.options.engine_binary.clone(),
            system: self.options.system.clone(),
        }
    }

    /// Claim the start slot. Returns the phase the engine was in before.
    fn try_begin(&self) -> Option<Phase> {
        let mut state = self.lock_state();
        if state.start_in_flight {
            return None;
        }
        let prior = state.phase;
        state.start_in_flight = true;
        state.transition(Phase::Starting);
        Some(prior)
    }

    fn finish(&self, verdict: Phase) {
        self.lock_state().transition(verdict);
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the start slot however the attempt ends.
struct StartAttempt<'a> {
    state: &'a Mutex<LifecycleState>,
    started: Instant,
}

impl Drop for StartAttempt<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.phase == Phase::Starting {
            warn!("engine start ended without a verdict, marking engine offline");
            state.transition(Phase::Offline);
        }
        state.start_in_flight = false;
        info!("engine start took {:?}", self.started.elapsed());
    }
}

fn log_start_failure(err: &StartError, checksum: &str, source_ip: &str, version: Option<&str>) {
    match err {
        StartError::SpawnFailure { known, raw } => {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| "unknown".to_string());
            error!(
                "{KNOWN_ERROR_MARKER}: code={} message={:?} documentation_url={} timestamp={timestamp} raw_error={raw:?} checksum={checksum} source_ip={source_ip}",
                known.code, known.message, known.documentation_url
            );
        }
        _ => error!("{}", failure_summary(err, checksum, source_ip, version)),
    }
}

fn failure_summary(err: &StartError, checksum: &str, source_ip: &str, version: Option<&str>) -> String {
    let verified = matches!(err, StartError::HealthCheckTimeout { .. });
    let mut summary = format!(
        "engine start failed (kind={}, version={}, checksum={checksum}, source_ip={source_ip}, verified={verified}): {err}",
        err.kind(),
        version.unwrap_or("unknown")
    );
    if let StartError::HealthCheckTimeout {
        last_error: Some(last_error),
        ..
    } = err
    {
        summary.push_str(&format!(" (last error: {last_error})"));
    }
    summary
}
