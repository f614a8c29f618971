// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde_json::Value;

/// Collect the `tag` of every entry under `inbounds`, in order.
///
/// Anything other than a sequence under `inbounds` yields no tags. Entries
/// without a string `tag` are skipped; duplicates are kept.
pub fn extract(config: &Value) -> Vec<String> {
    let Some(Value::Array(inbounds)) = config.get("inbounds") else {
        return Vec::new();
    };
    inbounds
        .iter()
        .filter_map(|inbound| inbound.get("tag").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}
