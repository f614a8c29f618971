// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Talks to the engine itself: the HTTP status endpoint used as the health
//! probe, and the binary on disk for its version.

use crate::errors::EngineError;
use crate::ports::{EngineClient, EngineStats};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::time::Duration;

/// Subset of Go's `runtime.MemStats` published under `memstats`.
#[derive(Debug, Default, Deserialize)]
struct MemStats {
    #[serde(rename = "Alloc", default)]
    alloc: u64,
    #[serde(rename = "TotalAlloc", default)]
    total_alloc: u64,
    #[serde(rename = "Sys", default)]
    sys: u64,
    #[serde(rename = "NumGC", default)]
    num_gc: u64,
}

#[derive(Debug, Deserialize)]
struct DebugVars {
    memstats: MemStats,
}

pub struct HttpEngineClient {
    http: reqwest::Client,
    status_url: String,
    binary: PathBuf,
}

impl HttpEngineClient {
    /// `probe_timeout` bounds each status request so a wedged engine cannot
    /// stall the retry loop.
    pub fn new(
        status_url: impl Into<String>,
        binary: impl Into<PathBuf>,
        probe_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            status_url: status_url.into(),
            binary: binary.into(),
        })
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn status(&self) -> Result<EngineStats, EngineError> {
        let response = self
            .http
            .get(&self.status_url)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::BadStatus(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;
        parse_stats(&body)
    }

    async fn version(&self) -> Result<String, EngineError> {
        let output = Command::new(&self.binary)
            .arg("version")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Exec(format!("{}: {e}", self.binary.display())))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("engine version output: {}", stdout.trim());
        coerce_version(&stdout)
    }
}

fn parse_stats(body: &str) -> Result<EngineStats, EngineError> {
    let vars: DebugVars =
        serde_json::from_str(body).map_err(|e| EngineError::Decode(e.to_string()))?;
    Ok(EngineStats {
        alloc_bytes: vars.memstats.alloc,
        total_alloc_bytes: vars.memstats.total_alloc,
        sys_bytes: vars.memstats.sys,
        num_gc: vars.memstats.num_gc,
    })
}

/// Pull the first version-looking token out of free-form output and pad it to
/// `major.minor.patch`. `"Xray 1.8.4 (Xray, Penetrates Everything.)"` gives
/// `"1.8.4"`, `"v25.1"` gives `"25.1.0"`.
pub fn coerce_version(output: &str) -> Result<String, EngineError> {
    for token in output.split(|c: char| !(c.is_ascii_alphanumeric() || c == '.')) {
        let token = token.strip_prefix(['v', 'V']).unwrap_or(token);
        let mut parts = token
            .split('.')
            .take(3)
            .map_while(|part| part.parse::<u64>().ok())
            .collect::<Vec<_>>();
        if parts.is_empty() || !token.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        parts.resize(3, 0);
        return Ok(parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join("."));
    }
    Err(EngineError::NoVersion(output.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_coerce_version() {
        assert_eq!(
            coerce_version("Xray 1.8.4 (Xray, Penetrates Everything.) 3f9ea3f (go1.21.1 linux/amd64)")
                .unwrap(),
            "1.8.4"
        );
        assert_eq!(coerce_version("v25.1").unwrap(), "25.1.0");
        assert_eq!(coerce_version("version 7\n").unwrap(), "7.0.0");
        assert_eq!(coerce_version("1.2.3.4").unwrap(), "1.2.3");
    }

    #[test]
    fn test_coerce_version_none() {
        assert!(matches!(
            coerce_version("command not found"),
            Err(EngineError::NoVersion(_))
        ));
        assert!(matches!(coerce_version(""), Err(EngineError::NoVersion(_))));
    }

    #[test]
    fn test_parse_stats() {
        let body = r#"{"cmdline":["xray"],"memstats":{"Alloc":1024,"TotalAlloc":4096,"Sys":8192,"NumGC":3,"PauseNs":[0]},"stats":{}}"#;
        assert_eq!(
            parse_stats(body).unwrap(),
            EngineStats {
                alloc_bytes: 1024,
                total_alloc_bytes: 4096,
                sys_bytes: 8192,
                num_gc: 3,
            }
        );
    }

    #[test]
    fn test_parse_stats_rejects_garbage() {
        assert!(matches!(parse_stats("<html>"), Err(EngineError::Decode(_))));
        assert!(matches!(parse_stats("{}"), Err(EngineError::Decode(_))));
    }

    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/debug/vars", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        url
    }

    #[tokio::test]
    async fn test_status_over_http() {
        let body = r#"{"memstats":{"Alloc":1,"TotalAlloc":2,"Sys":3,"NumGC":4}}"#;
        let response: &'static str = Box::leak(
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .into_boxed_str(),
        );
        let url = serve_once(response).await;
        let client = HttpEngineClient::new(url, "/nonexistent", Duration::from_secs(2)).unwrap();

        let stats = client.status().await.unwrap();
        assert_eq!(stats.num_gc, 4);
        assert_eq!(stats.sys_bytes, 3);
    }

    #[tokio::test]
    async fn test_status_non_success_code() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let client = HttpEngineClient::new(url, "/nonexistent", Duration::from_secs(2)).unwrap();

        assert!(matches!(
            client.status().await,
            Err(EngineError::BadStatus(503))
        ));
    }

    #[tokio::test]
    async fn test_status_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/debug/vars", listener.local_addr().unwrap());
        drop(listener);
        let client = HttpEngineClient::new(url, "/nonexistent", Duration::from_secs(2)).unwrap();

        assert!(matches!(
            client.status().await,
            Err(EngineError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_version_runs_binary() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("xray");
        std::fs::write(
            &binary,
            "#!/bin/sh\necho \"Xray 1.8.24 (Xray, Penetrates Everything.) Custom (go1.22.5 linux/amd64)\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client =
            HttpEngineClient::new("http://127.0.0.1:1/", &binary, Duration::from_secs(1)).unwrap();
        assert_eq!(client.version().await.unwrap(), "1.8.24");
    }

    #[tokio::test]
    async fn test_version_missing_binary() {
        let client = HttpEngineClient::new(
            "http://127.0.0.1:1/",
            "/nonexistent/xray",
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(matches!(
            client.version().await,
            Err(EngineError::Exec(_))
        ));
    }
}
