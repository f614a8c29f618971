// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! A fake node: a supervisord XML-RPC endpoint and an engine `/debug/vars`
//! endpoint on loopback, sharing one process state. The engine endpoint only
//! answers while supervisord reports the program as running.

use dd_enginesup::controller::ProcessController;
use dd_enginesup::engine::HttpEngineClient;
use dd_enginesup::health::{HealthVerifier, RetryPolicy};
use dd_enginesup::store::FileConfigStore;
use dd_enginesup::supervisord::SupervisordClient;
use dd_enginesup::testing::FakeKiller;
use dd_enginesup::{Collaborators, LifecycleSupervisor, SupervisorOptions};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const PROCESS_NAME: &str = "xray";
pub const PROBE_DELAY: Duration = Duration::from_millis(50);
pub const PROBE_ATTEMPTS: u32 = 5;

#[derive(Default)]
struct NodeState {
    running: bool,
    spawn_fails: bool,
    /// Engine probes that fail after each start before it answers.
    warmup_probes: u32,
    probes_since_start: u32,
    rpc_calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeNode {
    state: Arc<Mutex<NodeState>>,
}

impl FakeNode {
    pub fn set_running(&self, running: bool) {
        self.state.lock().unwrap().running = running;
    }

    pub fn set_spawn_fails(&self, fails: bool) {
        self.state.lock().unwrap().spawn_fails = fails;
    }

    pub fn set_warmup_probes(&self, probes: u32) {
        self.state.lock().unwrap().warmup_probes = probes;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    pub fn rpc_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().rpc_calls.clone()
    }

    pub fn start_calls(&self) -> usize {
        self.rpc_calls()
            .iter()
            .filter(|m| *m == "supervisor.startProcess")
            .count()
    }

    /// Serve supervisord and the engine status endpoint until the test ends.
    pub async fn serve(&self) -> (SocketAddr, SocketAddr) {
        let rpc = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let status = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addrs = (rpc.local_addr().unwrap(), status.local_addr().unwrap());

        let node = self.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = rpc.accept().await {
                let node = node.clone();
                tokio::spawn(async move { node.handle_rpc(socket).await });
            }
        });
        let node = self.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = status.accept().await {
                let node = node.clone();
                tokio::spawn(async move { node.handle_status(socket).await });
            }
        });
        addrs
    }

    async fn handle_rpc(&self, socket: TcpStream) {
        let (mut reader, body) = read_request(socket).await;
        let method = between(&body, "<methodName>", "</methodName>").to_string();

        let response = {
            let mut state = self.state.lock().unwrap();
            state.rpc_calls.push(method.clone());
            match method.as_str() {
                "supervisor.getProcessInfo" => {
                    let code = if state.running { 20 } else { 0 };
                    success(&format!(
                        "<struct><member><name>name</name><value><string>{PROCESS_NAME}</string></value></member>\
                         <member><name>state</name><value><int>{code}</int></value></member></struct>"
                    ))
                }
                "supervisor.stopProcess" => {
                    if state.running {
                        state.running = false;
                        success("<boolean>1</boolean>")
                    } else {
                        fault(70, &format!("NOT_RUNNING: {PROCESS_NAME}"))
                    }
                }
                "supervisor.startProcess" if state.spawn_fails => {
                    fault(50, &format!("SPAWN_ERROR: {PROCESS_NAME}"))
                }
                "supervisor.startProcess" => {
                    state.running = true;
                    state.probes_since_start = 0;
                    success("<boolean>1</boolean>")
                }
                other => fault(1, &format!("UNKNOWN_METHOD: {other}")),
            }
        };
        write_response(reader.get_mut(), "200 OK", "text/xml", &response).await;
    }

    async fn handle_status(&self, socket: TcpStream) {
        let (mut reader, _) = read_request(socket).await;
        let healthy = {
            let mut state = self.state.lock().unwrap();
            state.probes_since_start += 1;
            state.running && state.probes_since_start > state.warmup_probes
        };
        if healthy {
            let body = r#"{"memstats":{"Alloc":2048,"TotalAlloc":4096,"Sys":65536,"NumGC":1}}"#;
            write_response(reader.get_mut(), "200 OK", "application/json", body).await;
        } else {
            write_response(reader.get_mut(), "503 Service Unavailable", "text/plain", "").await;
        }
    }
}

async fn read_request(socket: TcpStream) -> (BufReader<TcpStream>, String) {
    let mut reader = BufReader::new(socket);
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0u8; content_length];
    let _ = reader.read_exact(&mut body).await;
    (reader, String::from_utf8_lossy(&body).into_owned())
}

async fn write_response(socket: &mut TcpStream, status: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn between<'a>(haystack: &'a str, open: &str, close: &str) -> &'a str {
    haystack
        .split_once(open)
        .and_then(|(_, rest)| rest.split_once(close))
        .map(|(inner, _)| inner)
        .unwrap_or_default()
}

fn success(value: &str) -> String {
    format!(
        "<?xml version='1.0'?><methodResponse><params><param><value>{value}</value></param></params></methodResponse>"
    )
}

fn fault(code: i64, message: &str) -> String {
    format!(
        "<?xml version='1.0'?><methodResponse><fault><value><struct>\
         <member><name>faultCode</name><value><int>{code}</int></value></member>\
         <member><name>faultString</name><value><string>{message}</string></value></member>\
         </struct></value></fault></methodResponse>"
    )
}

/// A supervisor using the real wire clients against `node`, with a fake
/// killer so no real process is signalled.
pub struct WiredSupervisor {
    pub supervisor: LifecycleSupervisor,
    pub killer: Arc<FakeKiller>,
}

pub async fn wire(node: &FakeNode, config_path: &Path, dedup: bool) -> WiredSupervisor {
    let (rpc, status) = node.serve().await;

    let manager = Arc::new(
        SupervisordClient::new(format!("http://{rpc}/RPC2"), Duration::from_secs(2)).unwrap(),
    );
    let engine = Arc::new(
        HttpEngineClient::new(
            format!("http://{status}/debug/vars"),
            "/nonexistent/xray",
            Duration::from_millis(500),
        )
        .unwrap(),
    );
    let killer = Arc::new(FakeKiller::default());

    let controller = ProcessController::new(manager, killer.clone(), PROCESS_NAME, status.port())
        .with_kill_grace(Duration::from_millis(10));
    let verifier = HealthVerifier::new(
        engine.clone(),
        RetryPolicy {
            attempts: PROBE_ATTEMPTS,
            delay: PROBE_DELAY,
        },
    );
    let supervisor = LifecycleSupervisor::new(
        Collaborators {
            controller,
            verifier,
            engine,
            store: Arc::new(FileConfigStore::new(config_path)),
        },
        SupervisorOptions {
            dedup,
            ..SupervisorOptions::default()
        },
    );

    WiredSupervisor { supervisor, killer }
}
