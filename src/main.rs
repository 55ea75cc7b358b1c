//! vlab - run one vSphere VM operation end to end.
//!
//! Loads the endpoint config, opens a scoped session, issues the operation,
//! waits for its task and always logs out before exiting.
//!
//! Exit status: 0 success, 1 task failed, 2 VM not found, 3 gave up waiting,
//! 4 unusable config, 5 could not connect, 6 any other API error.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use futures::FutureExt;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vlab_vsphere::{
    OperationOutcome, PollOutcome, Session, SharedSink, TaskWatcher, TracingSink, VmwareError,
    VmwareService, VsphereConfig,
};

const EXIT_TASK_FAILED: u8 = 1;
const EXIT_VM_NOT_FOUND: u8 = 2;
const EXIT_TIMED_OUT: u8 = 3;
const EXIT_CONFIG: u8 = 4;
const EXIT_CONNECT: u8 = 5;
const EXIT_API: u8 = 6;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match VsphereConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))
    {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let tls = cli.tls.map(Into::into).unwrap_or(config.tls);

    let sink: SharedSink = Arc::new(TracingSink);
    let watcher = TaskWatcher::new(sink.clone()).with_poll_interval(cli.poll_interval());
    let mut service = VmwareService::new(Session::new(config, sink), watcher);

    let timeout = cli.timeout();
    let result = service
        .scoped(tls, move |ops| {
            async move {
                match cli.command {
                    Command::PowerOn { vm } => ops.power_on_vm(&vm, timeout).await,
                    Command::PowerOff { vm } => ops.power_off_vm(&vm, timeout).await,
                    Command::Snapshot { vm, name, description, memory } => {
                        ops.create_vm_snapshot(&vm, &name, description.as_deref(), memory, timeout)
                            .await
                    }
                }
            }
            .boxed()
        })
        .await;

    match result {
        Ok(outcome) => ExitCode::from(report(&outcome)),
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(error_status(&e))
        }
    }
}

fn report(outcome: &OperationOutcome) -> u8 {
    match outcome {
        OperationOutcome::VmNotFound => {
            tracing::error!("VM not found");
            EXIT_VM_NOT_FOUND
        }
        OperationOutcome::Unchanged => {
            tracing::info!("VM already in the requested state");
            0
        }
        OperationOutcome::Finished(PollOutcome::Succeeded) => {
            tracing::info!("Task succeeded");
            0
        }
        OperationOutcome::Finished(PollOutcome::Failed(failure)) => {
            tracing::error!(reason = %failure.reason, "Task failed");
            EXIT_TASK_FAILED
        }
        OperationOutcome::Finished(PollOutcome::TimedOut) => {
            tracing::warn!("Gave up waiting; the task may still complete on the server");
            EXIT_TIMED_OUT
        }
    }
}

fn error_status(err: &VmwareError) -> u8 {
    if err.is_connect_error() {
        EXIT_CONNECT
    } else {
        EXIT_API
    }
}

fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .init();
}
