// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory stand-ins for the supervisor's collaborators.

use crate::controller::ProcessController;
use crate::errors::{ControlError, EngineError, StoreError};
use crate::health::{HealthVerifier, RetryPolicy};
use crate::ports::{
    ConfigStore, EngineClient, EngineStats, ProcessInfo, ProcessKiller, ProcessManager,
    STATE_RUNNING,
};
use crate::supervisor::{Collaborators, LifecycleSupervisor, SupervisorOptions};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

const STATE_STOPPED: i64 = 0;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process manager that flips its state code on start/stop and records every
/// call.
#[derive(Default)]
pub struct FakeProcessManager {
    state: AtomicI64,
    calls: Mutex<Vec<&'static str>>,
    start_calls: AtomicUsize,
    info_error: Mutex<Option<ControlError>>,
    stop_error: Mutex<Option<ControlError>>,
    start_error: Mutex<Option<ControlError>>,
    start_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeProcessManager {
    pub fn running() -> Self {
        let fake = Self::default();
        fake.state.store(STATE_RUNNING, Ordering::SeqCst);
        fake
    }

    pub fn stopped() -> Self {
        let fake = Self::default();
        fake.state.store(STATE_STOPPED, Ordering::SeqCst);
        fake
    }

    pub fn fail_info(&self, err: ControlError) {
        *lock(&self.info_error) = Some(err);
    }

    pub fn fail_stop(&self, err: ControlError) {
        *lock(&self.stop_error) = Some(err);
    }

    pub fn fail_start(&self, err: ControlError) {
        *lock(&self.start_error) = Some(err);
    }

    /// Make `start_process` wait until the returned handle is notified.
    pub fn gate_start(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.start_gate) = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_RUNNING
    }
}

#[async_trait]
impl ProcessManager for FakeProcessManager {
    async fn process_info(&self, name: &str) -> Result<ProcessInfo, ControlError> {
        lock(&self.calls).push("info");
        if let Some(err) = lock(&self.info_error).clone() {
            return Err(err);
        }
        let state_code = self.state.load(Ordering::SeqCst);
        Ok(ProcessInfo {
            state_code,
            raw: json!({"name": name, "state": state_code}),
        })
    }

    async fn stop_process(&self, _name: &str, _wait: bool) -> Result<(), ControlError> {
        lock(&self.calls).push("stop");
        if let Some(err) = lock(&self.stop_error).clone() {
            return Err(err);
        }
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        Ok(())
    }

    async fn start_process(&self, _name: &str, _wait: bool) -> Result<(), ControlError> {
        lock(&self.calls).push("start");
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.start_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = lock(&self.start_error).clone() {
            return Err(err);
        }
        self.state.store(STATE_RUNNING, Ordering::SeqCst);
        Ok(())
    }
}

/// Engine whose status probe starts answering after a number of failures.
pub struct FakeEngine {
    failures_before_healthy: Mutex<Option<u32>>,
    probes: AtomicU32,
    version: Option<String>,
}

impl FakeEngine {
    pub fn healthy_after(failures: u32) -> Self {
        Self {
            failures_before_healthy: Mutex::new(Some(failures)),
            probes: AtomicU32::new(0),
            version: Some("1.8.4".to_string()),
        }
    }

    pub fn never_healthy() -> Self {
        Self {
            failures_before_healthy: Mutex::new(None),
            probes: AtomicU32::new(0),
            version: Some("1.8.4".to_string()),
        }
    }

    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// Change behaviour from now on; probes already made count toward
    /// `failures`.
    pub fn set_healthy_after(&self, failures: Option<u32>) {
        *lock(&self.failures_before_healthy) = failures;
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn reset_probes(&self) {
        self.probes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn status(&self) -> Result<EngineStats, EngineError> {
        let made = self.probes.fetch_add(1, Ordering::SeqCst);
        match *lock(&self.failures_before_healthy) {
            Some(failures) if made >= failures => Ok(EngineStats {
                num_gc: u64::from(made),
                ..EngineStats::default()
            }),
            _ => Err(EngineError::Unreachable("connection refused".to_string())),
        }
    }

    async fn version(&self) -> Result<String, EngineError> {
        self.version
            .clone()
            .ok_or_else(|| EngineError::Exec("no such file or directory".to_string()))
    }
}

/// Records kill steps as `term:<name>`, `kill:<name>` and `port:<port>`.
#[derive(Default)]
pub struct FakeKiller {
    calls: Mutex<Vec<String>>,
    fail_graceful: Mutex<bool>,
    fail_port_lookup: Mutex<bool>,
}

impl FakeKiller {
    pub fn fail_graceful(&self) {
        *lock(&self.fail_graceful) = true;
    }

    pub fn fail_port_lookup(&self) {
        *lock(&self.fail_port_lookup) = true;
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ProcessKiller for FakeKiller {
    async fn signal_by_name(&self, name: &str, force: bool) -> Result<usize, ControlError> {
        let step = if force { "kill" } else { "term" };
        lock(&self.calls).push(format!("{step}:{name}"));
        if !force && *lock(&self.fail_graceful) {
            return Err(ControlError::Io("operation not permitted".to_string()));
        }
        Ok(1)
    }

    async fn kill_port_owner(&self, port: u16) -> Result<Vec<u32>, ControlError> {
        lock(&self.calls).push(format!("port:{port}"));
        if *lock(&self.fail_port_lookup) {
            return Err(ControlError::Io("permission denied".to_string()));
        }
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MemoryConfigStore {
    current: Mutex<Option<Value>>,
    set_calls: AtomicUsize,
    clear_calls: AtomicUsize,
    fail_writes: Mutex<bool>,
}

impl MemoryConfigStore {
    pub fn current(&self) -> Option<Value> {
        lock(&self.current).clone()
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self) {
        *lock(&self.fail_writes) = true;
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *lock(&self.fail_writes) {
            return Err(StoreError::Io {
                path: "memory".to_string(),
                source: std::io::Error::other("read-only store"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn set(&self, config: &Value) -> Result<(), StoreError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        *lock(&self.current) = Some(config.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        *lock(&self.current) = Some(json!({}));
        Ok(())
    }
}

/// A supervisor wired to fakes, with the fakes kept around for assertions.
pub struct Harness {
    pub manager: Arc<FakeProcessManager>,
    pub killer: Arc<FakeKiller>,
    pub engine: Arc<FakeEngine>,
    pub store: Arc<MemoryConfigStore>,
    pub supervisor: LifecycleSupervisor,
}

impl Harness {
    pub fn new(manager: FakeProcessManager, engine: FakeEngine) -> Self {
        Self::with_options(manager, engine, SupervisorOptions::default())
    }

    pub fn with_options(
        manager: FakeProcessManager,
        engine: FakeEngine,
        options: SupervisorOptions,
    ) -> Self {
        let manager = Arc::new(manager);
        let killer = Arc::new(FakeKiller::default());
        let engine = Arc::new(engine);
        let store = Arc::new(MemoryConfigStore::default());

        let controller = ProcessController::new(manager.clone(), killer.clone(), "xray", 61000);
        let verifier = HealthVerifier::new(engine.clone(), RetryPolicy::default());
        let supervisor = LifecycleSupervisor::new(
            Collaborators {
                controller,
                verifier,
                engine: engine.clone(),
                store: store.clone(),
            },
            options,
        );

        Self {
            manager,
            killer,
            engine,
            store,
            supervisor,
        }
    }
}
