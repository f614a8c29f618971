// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Capabilities the supervisor consumes. Each one has a production adapter in
//! this crate and hand-written fakes in the tests.

use crate::errors::{ControlError, EngineError, StoreError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Process-manager state code for a running program.
pub const STATE_RUNNING: i64 = 20;

/// Snapshot of one program as reported by the process manager. Never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub state_code: i64,
    pub raw: Value,
}

impl ProcessInfo {
    pub fn is_running(&self) -> bool {
        self.state_code == STATE_RUNNING
    }
}

/// Memory counters reported by the engine's status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub alloc_bytes: u64,
    pub total_alloc_bytes: u64,
    pub sys_bytes: u64,
    pub num_gc: u64,
}

#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn process_info(&self, name: &str) -> Result<ProcessInfo, ControlError>;

    async fn stop_process(&self, name: &str, wait: bool) -> Result<(), ControlError>;

    async fn start_process(&self, name: &str, wait: bool) -> Result<(), ControlError>;
}

/// OS-level fallback used when the process manager cannot be trusted to stop
/// the engine.
#[async_trait]
pub trait ProcessKiller: Send + Sync {
    /// Signal every process whose name is `name`. Returns how many were hit.
    async fn signal_by_name(&self, name: &str, force: bool) -> Result<usize, ControlError>;

    /// SIGKILL whatever listens on `port`. Returns the pids that were killed.
    async fn kill_port_owner(&self, port: u16) -> Result<Vec<u32>, ControlError>;
}

#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Query the running engine. Used as the health probe.
    async fn status(&self) -> Result<EngineStats, EngineError>;

    /// Version of the engine binary on disk.
    async fn version(&self) -> Result<String, EngineError>;
}

/// Side channel the engine reads its configuration from when it starts.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn set(&self, config: &Value) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}
