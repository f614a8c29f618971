// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.


use serde::Serialize;
use sysinfo::System;

const UNKNOWN: &str = "unknown";

/// Host facts captured once at boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemSnapshot {
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub memory_total_bytes: u64,
}

impl SystemSnapshot {
    pub fn capture() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let model = sys
            .cpus()
            .iter()
            .map(|cpu| cpu.brand().trim())
            .find(|brand| !brand.is_empty())
            .or_else(|| {
                sys.cpus()
                    .iter()
                    .map(|cpu| cpu.vendor_id().trim())
                    .find(|vendor| !vendor.is_empty())
            })
            .unwrap_or_default();

        Self::from_parts(model, sys.cpus().len(), sys.total_memory())
    }

    /// A blank model is reported as "unknown".
    pub fn from_parts(cpu_model: &str, cpu_cores: usize, memory_total_bytes: u64) -> Self {
        let cpu_model = cpu_model.trim();
        Self {
            cpu_model: if cpu_model.is_empty() {
                UNKNOWN.to_string()
            } else {
                cpu_model.to_string()
            },
            cpu_cores,
            memory_total_bytes,
        }
    }
}

/// Human-readable byte count, e.g. `7.7 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        unit = next;
        if value < 1024.0 || next == "TiB" {
            break;
        }
        value /= 1024.0;
    }
    if unit == "B" {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_reads_this_host() {
        let snapshot = SystemSnapshot::capture();

        assert!(snapshot.cpu_cores >= 1);
        assert!(snapshot.memory_total_bytes > 0);
        assert!(!snapshot.cpu_model.is_empty());
    }

    #[test]
    fn test_from_parts() {
        let snapshot = SystemSnapshot::from_parts(" Cortex-A72 ", 4, 8 * 1024 * 1024 * 1024);
        assert_eq!(snapshot.cpu_model, "Cortex-A72");
        assert_eq!(snapshot.cpu_cores, 4);
        assert_eq!(format_bytes(snapshot.memory_total_bytes), "8.0 GiB");
    }

    #[test]
    fn test_from_parts_blank_model() {
        let snapshot = SystemSnapshot::from_parts("", 2, 0);
        assert_eq!(snapshot.cpu_model, "unknown");
        assert_eq!(snapshot.cpu_cores, 2);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(8039416 * 1024), "7.7 GiB");
    }
}
