use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use droidclaw::agent_engine::state::TaskRequest;
use droidclaw::config::load_config;
use droidclaw::device::adb::AdbDevice;
use droidclaw::device::console::ConsoleChannel;
use droidclaw::executor::dispatcher::Collaborators;
use droidclaw::executor::files::WorkspaceFiles;
use droidclaw::{build_engine, init_tracing, DeviceParts};

/// How long queued memories may take to reach the index on exit.
const MEMORY_FLUSH_TIMEOUT: Duration = Duration::from_secs(20);

/// Operate an Android device over adb to carry out a task.
#[derive(Debug, Parser)]
#[command(name = "droidclaw", version)]
struct Cli {
    /// Path to config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device serial, as listed by `adb devices`.
    #[arg(long)]
    serial: Option<String>,

    /// Give up after this many steps.
    #[arg(long)]
    max_steps: Option<u32>,

    /// What the agent should do.
    #[arg(required = true, num_args = 1..)]
    task: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cli.serial.is_some() {
        config.device.serial = cli.serial;
    }
    if cli.max_steps.is_some() {
        config.agent.max_steps = cli.max_steps;
    }

    let device = Arc::new(AdbDevice::from_config(&config.device));
    let workspace = config.sandbox.resolved_workspace();
    if let Err(e) = tokio::fs::create_dir_all(&workspace).await {
        tracing::warn!(dir = %workspace.display(), error = %e, "cannot create workspace");
    }
    let parts = DeviceParts {
        eyes: device.clone(),
        collaborators: Collaborators {
            finger: device.clone(),
            apps: device.clone(),
            files: Arc::new(WorkspaceFiles::new(workspace)),
            user: Arc::new(ConsoleChannel::new()),
        },
        screen_size: Some(device.screen_size().await),
    };

    let cancel = CancellationToken::new();
    let (mut engine, memory_task) = match build_engine(&config, parts, cancel.clone()).await {
        Ok(built) => built,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let memory_writer = memory_task.map(|task| {
        let mut errors = task.errors;
        tokio::spawn(async move {
            while let Some(e) = errors.recv().await {
                tracing::warn!(error = %e, "background memory error");
            }
        });
        task.handle
    });

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            ctrl_c.cancel();
        }
    });

    let outcome = engine.run_task(&TaskRequest::new(cli.task.join(" "))).await;

    // Closes the writer's queue so it can finish.
    drop(engine);
    if let Some(handle) = memory_writer {
        match tokio::time::timeout(MEMORY_FLUSH_TIMEOUT, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "memory writer failed"),
            Err(_) => tracing::warn!("memory writes still pending at exit; dropped"),
        }
    }

    let status = if outcome.success { "succeeded" } else { "failed" };
    println!("Task {status} after {} steps: {}", outcome.steps, outcome.summary);
    for file in &outcome.attachments {
        println!("  attachment: {file}");
    }
    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
