// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dd_enginesup::banner;
use dd_enginesup::controller::ProcessController;
use dd_enginesup::engine::HttpEngineClient;
use dd_enginesup::health::{HealthVerifier, RetryPolicy};
use dd_enginesup::ports::{EngineClient, ProcessManager};
use dd_enginesup::procfs::ProcfsKiller;
use dd_enginesup::store::FileConfigStore;
use dd_enginesup::supervisord::SupervisordClient;
use dd_enginesup::{
    Collaborators, LifecycleSupervisor, Settings, StatusReport, SupervisorOptions, SystemSnapshot,
};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dd-enginesup")]
#[command(about = "Applies configuration to the proxy engine and keeps it running", long_about = None)]
struct Args {
    /// YAML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an engine configuration, restart the engine and wait for it to answer
    Start {
        /// JSON engine configuration
        #[arg(long)]
        config_file: PathBuf,

        /// Address the request is attributed to in logs
        #[arg(long, default_value = "127.0.0.1")]
        source_ip: String,
    },
    /// Stop the engine and clear its configuration
    Stop,
    /// Probe the engine once
    Status,
    /// Show the engine version, path and host details
    Info,
}

struct Runtime {
    supervisor: LifecycleSupervisor,
    manager: Arc<dyn ProcessManager>,
    engine: Arc<dyn EngineClient>,
}

fn build(settings: &Settings) -> Result<Runtime> {
    let mut manager = SupervisordClient::new(&settings.supervisor_url, settings.rpc_timeout())?;
    if let Some(username) = &settings.supervisor_username {
        manager = manager.with_credentials(
            username.clone(),
            settings.supervisor_password.clone().unwrap_or_default(),
        );
    }
    let manager: Arc<dyn ProcessManager> = Arc::new(manager);
    let engine: Arc<dyn EngineClient> = Arc::new(HttpEngineClient::new(
        settings.status_url(),
        &settings.engine_binary,
        settings.probe_timeout(),
    )?);

    let controller = ProcessController::new(
        manager.clone(),
        Arc::new(ProcfsKiller::new()),
        settings.process_name.clone(),
        settings.engine_port,
    )
    .with_kill_grace(settings.kill_grace());
    let verifier = HealthVerifier::new(
        engine.clone(),
        RetryPolicy {
            attempts: settings.health_attempts,
            delay: settings.health_delay(),
        },
    );

    let supervisor = LifecycleSupervisor::new(
        Collaborators {
            controller,
            verifier,
            engine: engine.clone(),
            store: Arc::new(FileConfigStore::new(settings.config_path.clone())),
        },
        SupervisorOptions {
            dedup: settings.config_equal_checking,
            engine_binary: settings.engine_binary.clone(),
            system: Some(SystemSnapshot::capture()),
        },
    );

    Ok(Runtime {
        supervisor,
        manager,
        engine,
    })
}

#[allow(clippy::print_stdout)]
fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args, settings: Settings) -> Result<ExitCode> {
    let runtime = build(&settings)?;
    runtime.supervisor.initialize().await;

    match args.command {
        Command::Start {
            config_file,
            source_ip,
        } => {
            let contents = tokio::fs::read_to_string(&config_file)
                .await
                .with_context(|| format!("reading {}", config_file.display()))?;
            let config: Value = serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", config_file.display()))?;

            let outcome = runtime.supervisor.start(config, &source_ip).await;
            print_json(&outcome)?;
            Ok(if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Stop => {
            let outcome = runtime.supervisor.stop().await;
            print_json(&outcome)?;
            Ok(if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Status => {
            match runtime.manager.process_info(&settings.process_name).await {
                Ok(process) => info!(
                    "process manager reports {} in state {}",
                    settings.process_name, process.state_code
                ),
                Err(e) => warn!("could not query the process manager: {e}"),
            }
            let online = match runtime.engine.status().await {
                Ok(_) => true,
                Err(e) => {
                    info!("engine status probe failed: {e}");
                    false
                }
            };
            print_json(&StatusReport {
                online,
                version: runtime.supervisor.engine_version(),
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Info => {
            let engine_info = runtime.supervisor.engine_info();
            info!(
                "\n{}",
                banner::render(
                    env!("CARGO_PKG_VERSION"),
                    settings.api_port,
                    settings.engine_port,
                    &engine_info,
                )
            );
            print_json(&engine_info)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    simple_logger::SimpleLogger::new()
        .with_level(settings.log_level_filter()?)
        .init()?;
    info!(
        "dd-enginesup starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    run(args, settings).await
}
