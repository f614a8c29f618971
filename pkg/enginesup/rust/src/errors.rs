// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use thiserror::Error;

use crate::known_errors::KnownError;

/// Failures talking to the external process manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("process manager unreachable: {0}")]
    Transport(String),

    /// A fault raised by the process manager itself. The display form is the
    /// raw text matched against the known-error table.
    #[error("XML-RPC fault: {message}")]
    Fault { code: i64, message: String },

    #[error("unexpected process manager response: {0}")]
    Protocol(String),

    #[error("{0}")]
    Io(String),
}

/// Failures probing or inspecting the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine status endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("engine status endpoint answered {0}")]
    BadStatus(u16),

    #[error("could not decode engine status: {0}")]
    Decode(String),

    #[error("could not run engine binary: {0}")]
    Exec(String),

    #[error("no version found in engine output: {0:?}")]
    NoVersion(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("could not write engine config to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize engine config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a `start` did not end with a verified running engine.
#[derive(Error, Debug, Clone)]
pub enum StartError {
    #[error("engine start already in progress")]
    ConcurrencyBusy,

    #[error("{0}")]
    ProcessControlFailure(ControlError),

    #[error("{raw}")]
    SpawnFailure {
        known: &'static KnownError,
        raw: String,
    },

    #[error("engine did not answer its status endpoint after {attempts} attempt(s)")]
    HealthCheckTimeout {
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("{0}")]
    UnknownInternal(String),
}

impl StartError {
    /// Stable label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            StartError::ConcurrencyBusy => "concurrency_busy",
            StartError::ProcessControlFailure(_) => "process_control_failure",
            StartError::SpawnFailure { .. } => "spawn_failure",
            StartError::HealthCheckTimeout { .. } => "health_check_timeout",
            StartError::UnknownInternal(_) => "unknown_internal",
        }
    }
}
