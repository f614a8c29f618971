// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::StoreError;
use crate::ports::ConfigStore;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Writes the engine configuration to a JSON file the engine is launched
/// with. Writes go through a sibling temp file and a rename so the engine
/// never reads a half-written document.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, contents: Vec<u8>) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, contents).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        debug!("engine config written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn set(&self, config: &Value) -> Result<(), StoreError> {
        self.write(serde_json::to_vec_pretty(config)?).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.write(b"{}".to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read(path: &Path) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_set_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested/deeper/engine.json"));

        let config = json!({"inbounds": [{"tag": "vless-in", "port": 443}]});
        store.set(&config).await.unwrap();

        assert_eq!(read(store.path()), config);
        assert!(!dir.path().join("nested/deeper/engine.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_set_replaces_previous_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("engine.json"));

        store.set(&json!({"a": 1})).await.unwrap();
        store.set(&json!({"b": 2})).await.unwrap();

        assert_eq!(read(store.path()), json!({"b": 2}));
    }

    #[tokio::test]
    async fn test_clear_writes_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("engine.json"));

        store.set(&json!({"a": 1})).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(read(store.path()), json!({}));
    }

    #[tokio::test]
    async fn test_unwritable_location_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = FileConfigStore::new(blocker.join("engine.json"));

        let err = store.set(&json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(err.to_string().contains("engine.json"));
    }
}
