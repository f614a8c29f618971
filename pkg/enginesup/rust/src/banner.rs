// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Startup banner printed once the supervisor is ready.

use crate::supervisor::EngineInfo;
use crate::system::format_bytes;
use std::fmt::Write;

pub fn render(agent_version: &str, api_port: u16, engine_port: u16, info: &EngineInfo) -> String {
    let mut rows = vec![
        ("Supervisor", agent_version.to_string()),
        ("API port", api_port.to_string()),
        (
            "Engine",
            info.version.clone().unwrap_or_else(|| "N/A".to_string()),
        ),
        ("Engine path", info.path.clone()),
        ("Engine port", engine_port.to_string()),
    ];
    if let Some(system) = &info.system {
        rows.push((
            "CPU",
            format!("{} ({} cores)", system.cpu_model, system.cpu_cores),
        ));
        rows.push(("Memory", format_bytes(system.memory_total_bytes)));
    }

    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, value) in rows {
        let _ = writeln!(out, "  {label:<width$}  {value}");
    }
    out
}
