// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Signatures of well-understood engine failures, used to point operators at
//! documentation. Matching never changes how a failure is reported to the
//! caller, only what gets logged.

/// Marker logged in front of every known-error diagnostic.
pub const KNOWN_ERROR_MARKER: &str = "Aura Node Known Error";

#[derive(Debug, PartialEq, Eq)]
pub struct KnownError {
    pub code: &'static str,
    pub message: &'static str,
    pub documentation_url: &'static str,
}

pub const ENGINE_FAILED_TO_START: KnownError = KnownError {
    code: "RN-001",
    message: "Xray core failed to start",
    documentation_url: "https://remna.st/docs/guides/common-errors#xml-rpc-fault-spawn-error-xray",
};

/// Supervisord fault name to known error. A fault only matches when it names
/// the engine's own program.
pub static KNOWN_ERRORS: &[(&str, &KnownError)] = &[("SPAWN_ERROR", &ENGINE_FAILED_TO_START)];

/// Look for `XML-RPC fault: <FAULT>: <process_name>` in `raw`.
pub fn classify(raw: &str, process_name: &str) -> Option<&'static KnownError> {
    KNOWN_ERRORS
        .iter()
        .find(|(fault, _)| {
            raw.split_once(&format!("XML-RPC fault: {fault}: "))
                .and_then(|(_, rest)| rest.split_whitespace().next())
                == Some(process_name)
        })
        .map(|(_, known)| *known)
}
