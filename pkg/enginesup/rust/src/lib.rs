// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod banner;
pub mod checksum;
pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod health;
pub mod known_errors;
pub mod ports;
pub mod procfs;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod supervisord;
pub mod system;
pub mod tags;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use config::Settings;
pub use controller::ProcessController;
pub use errors::{ControlError, EngineError, StartError, StoreError};
pub use health::{HealthVerifier, RetryPolicy};
pub use ports::{ConfigStore, EngineClient, EngineStats, ProcessInfo, ProcessKiller, ProcessManager};
pub use state::Phase;
pub use supervisor::{
    Collaborators, EngineInfo, HealthReport, LifecycleSupervisor, StartOutcome, StatusReport,
    StopOutcome, SupervisorOptions,
};
pub use system::SystemSnapshot;
