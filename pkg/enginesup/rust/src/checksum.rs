// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Content digest of an engine configuration.
//!
//! The digest is taken over a canonical encoding of the JSON tree: object
//! keys are visited in sorted order and string values are trimmed, so two
//! configurations that only differ in key order or in whitespace around
//! scalar values hash the same. Every node is type-tagged and
//! length-prefixed, which keeps `1` and `"1"` (or `["a","b"]` and `["ab"]`)
//! apart.

use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn compute(config: &Value) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher, config);
    format!("{:x}", hasher.finalize())
}

fn feed(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Value::Number(n) => {
            hasher.update(b"d");
            feed_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update(b"s");
            feed_str(hasher, s.trim());
        }
        Value::Array(items) => {
            hasher.update(b"a");
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                feed(hasher, item);
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"o");
            hasher.update((keys.len() as u64).to_be_bytes());
            for key in keys {
                feed_str(hasher, key);
                if let Some(v) = map.get(key) {
                    feed(hasher, v);
                }
            }
        }
    }
}

fn feed_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}
