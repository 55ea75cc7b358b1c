//! Command-line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use vlab_vsphere::task::DEFAULT_TASK_TIMEOUT;
use vlab_vsphere::TlsVerification;

#[derive(Debug, Parser)]
#[command(name = "vlab", version, about = "Run one vSphere VM operation and wait for its task")]
pub struct Cli {
    /// Endpoint config file (.json, .yaml or .yml)
    #[arg(short, long, env = "VLAB_CONFIG", default_value = "vsphere.yaml")]
    pub config: PathBuf,

    /// Override the config's TLS choice
    #[arg(long, value_enum)]
    pub tls: Option<TlsArg>,

    /// Seconds to wait for the task before giving up (the task keeps running)
    #[arg(long, default_value_t = DEFAULT_TASK_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Seconds between task status checks
    #[arg(long, default_value_t = 1)]
    pub poll_interval: u64,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Power a VM on
    PowerOn { vm: String },
    /// Hard power a VM off
    PowerOff { vm: String },
    /// Take a snapshot of a VM
    Snapshot {
        vm: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Include the VM's memory state
        #[arg(long)]
        memory: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TlsArg {
    Verify,
    Skip,
}

impl From<TlsArg> for TlsVerification {
    fn from(arg: TlsArg) -> Self {
        match arg {
            TlsArg::Verify => TlsVerification::Verify,
            TlsArg::Skip => TlsVerification::SkipPeerVerification,
        }
    }
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }
}
