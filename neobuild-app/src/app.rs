use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use neobuild_bridge::{BridgeError, BuildFuture, OperationKind, ProjectBuilder};
use neobuild_host::{BuildEvent, BuildEventType, HostConfig, ProcessBuildManager};
use tokio::sync::oneshot;

use crate::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "neobuild", version, about = "Build configured targets and wait for the result")]
pub struct Cli {
    /// Configuration file (defaults to ./neobuild.toml, then the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Operation to run: build, clean or rebuild
    #[arg(short, long)]
    pub operation: Option<OperationKind>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// List configured targets and exit
    #[arg(long)]
    pub list: bool,

    /// Targets to build (all configured targets when empty)
    pub targets: Vec<String>,
}

pub fn launch() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("neobuild: {e:#}");
            2
        }
    };
    std::process::exit(code);
}

/// Run the command line, returning whether the build succeeded
pub fn run(cli: Cli) -> Result<bool> {
    let path = match cli.config {
        Some(path) => path,
        None => HostConfig::find_default()?,
    };
    let config = HostConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    let _log_guard = init_logging(&config.log.level, config.log.directory.as_deref());

    if cli.list {
        for (name, target) in &config.targets {
            println!("{name}\t{}", target.build.display());
        }
        return Ok(true);
    }

    let targets: Vec<String> = if cli.targets.is_empty() {
        config.targets.keys().cloned().collect()
    } else {
        cli.targets
    };
    if let Some(unknown) = targets.iter().find(|t| !config.targets.contains_key(*t)) {
        bail!(
            "unknown target `{unknown}` (configured: {})",
            config.targets.keys().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    let operation = cli.operation.unwrap_or(config.operation);
    let timeout = cli
        .timeout
        .or(config.completion_timeout_secs)
        .map(Duration::from_secs);

    let (event_tx, event_rx) = crossbeam_channel::unbounded::<BuildEvent>();
    let host = Arc::new(ProcessBuildManager::from_config(&config).with_event_sender(event_tx));

    let printer = std::thread::Builder::new()
        .name("BuildOutput".to_string())
        .spawn(move || {
            for event in event_rx.iter() {
                print_event(&event);
            }
        })
        .context("failed to spawn output thread")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let builder = ProjectBuilder::new(host.clone()).with_operation(operation);
    let future = builder.build_async(&targets);

    let pump_host = host.clone();
    // Dropped when the build thread exits, normally or by panicking.
    let (pump_alive, pump_exited) = oneshot::channel::<()>();
    let pump = std::thread::Builder::new()
        .name("BuildHost".to_string())
        .spawn(move || {
            let _pump_alive = pump_alive;
            pump_host.pump();
        })
        .context("failed to spawn build thread")?;

    let succeeded = runtime.block_on(wait_for_build(&host, &future, pump_exited, timeout));

    if pump.join().is_err() {
        tracing::error!("Build thread panicked");
    }
    drop(builder);
    drop(host);
    let _ = printer.join();

    if succeeded {
        tracing::info!("{} finished successfully", operation);
    } else {
        tracing::error!("{} did not succeed", operation);
    }
    Ok(succeeded)
}

/// Await the build, cancelling it on Ctrl-C or timeout
async fn wait_for_build(
    host: &ProcessBuildManager,
    future: &BuildFuture,
    mut pump_exited: oneshot::Receiver<()>,
    timeout: Option<Duration>,
) -> bool {
    let waiting = async {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, settle(future, &mut pump_exited))
                .await
                .map_err(|_| BridgeError::TimedOut(timeout)),
            None => Ok(settle(future, &mut pump_exited).await),
        }
    };

    let finished = tokio::select! {
        result = waiting => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match finished {
        Some(Ok(succeeded)) => succeeded,
        Some(Err(e)) => {
            tracing::error!("{}", e);
            host.cancel();
            settle(future, &mut pump_exited).await;
            false
        }
        None => {
            tracing::warn!("Interrupted, cancelling build");
            host.cancel();
            settle(future, &mut pump_exited).await
        }
    }
}

/// Wait for the result, or give up once the build thread is gone
async fn settle(future: &BuildFuture, pump_exited: &mut oneshot::Receiver<()>) -> bool {
    if pump_exited.is_terminated() {
        return future.try_result().unwrap_or(false);
    }
    tokio::select! {
        succeeded = future.wait() => succeeded,
        _ = pump_exited => future.try_result().unwrap_or_else(|| {
            tracing::error!("Build thread exited without reporting a result");
            false
        }),
    }
}

fn print_event(event: &BuildEvent) {
    let prefix = event
        .target
        .as_deref()
        .map(|t| format!("[{t}] "))
        .unwrap_or_default();
    match event.event_type {
        BuildEventType::Output | BuildEventType::Warning | BuildEventType::Error => {
            println!("{prefix}{}", event.message);
        }
        BuildEventType::Progress => match event.progress {
            Some(progress) => println!("{prefix}{} ({progress:.0}%)", event.message),
            None => println!("{prefix}{}", event.message),
        },
        BuildEventType::Started
        | BuildEventType::Completed
        | BuildEventType::Failed
        | BuildEventType::Cancelled => {
            println!("==> {}", event.message);
        }
    }
}
