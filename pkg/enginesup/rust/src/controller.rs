// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::ControlError;
use crate::ports::{ProcessInfo, ProcessKiller, ProcessManager};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(1000);

/// Thin wrapper over the process manager for the one program we own.
///
/// Nothing here retries: an RPC failure is handed straight back to the
/// caller. Waiting for the engine to come up is the health verifier's job.
pub struct ProcessController {
    manager: Arc<dyn ProcessManager>,
    killer: Arc<dyn ProcessKiller>,
    name: String,
    engine_port: u16,
    kill_grace: Duration,
}

impl ProcessController {
    pub fn new(
        manager: Arc<dyn ProcessManager>,
        killer: Arc<dyn ProcessKiller>,
        name: impl Into<String>,
        engine_port: u16,
    ) -> Self {
        Self {
            manager,
            killer,
            name: name.into(),
            engine_port,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn info(&self) -> Result<ProcessInfo, ControlError> {
        self.manager.process_info(&self.name).await
    }

    pub async fn stop(&self, wait: bool) -> Result<(), ControlError> {
        self.manager.stop_process(&self.name, wait).await
    }

    pub async fn start(&self, wait: bool) -> Result<(), ControlError> {
        self.manager.start_process(&self.name, wait).await
    }

    /// Stop the program if it is running, start it again, and return the
    /// fresh process info.
    pub async fn restart(&self) -> Result<ProcessInfo, ControlError> {
        let current = self.info().await?;
        if current.is_running() {
            debug!("[{}] running (state={}), stopping first", self.name, current.state_code);
            self.stop(true).await?;
        }
        self.start(true).await?;
        let info = self.info().await?;
        info!("[{}] restarted (state={})", self.name, info.state_code);
        Ok(info)
    }

    /// Make sure no engine process survives: ask the process manager first,
    /// then fall back to signals and finally to whoever holds the engine
    /// port. Every step is best-effort.
    pub async fn kill_all(&self) {
        if let Err(e) = self.stop(true).await {
            warn!("[{}] process manager stop failed: {e}", self.name);
        }

        match self.killer.signal_by_name(&self.name, false).await {
            Ok(n) => debug!("[{}] sent SIGTERM to {n} process(es)", self.name),
            Err(e) => warn!("[{}] SIGTERM by name failed: {e}", self.name),
        }

        sleep(self.kill_grace).await;

        match self.killer.signal_by_name(&self.name, true).await {
            Ok(n) => debug!("[{}] sent SIGKILL to {n} process(es)", self.name),
            Err(e) => warn!("[{}] SIGKILL by name failed: {e}", self.name),
        }

        match self.killer.kill_port_owner(self.engine_port).await {
            Ok(pids) if !pids.is_empty() => {
                info!("[{}] killed port {} owner(s): {pids:?}", self.name, self.engine_port)
            }
            Ok(_) => {}
            Err(e) => warn!(
                "[{}] could not kill owner of port {}: {e}",
                self.name, self.engine_port
            ),
        }

        info!("[{}] all engine processes killed", self.name);
    }
}
