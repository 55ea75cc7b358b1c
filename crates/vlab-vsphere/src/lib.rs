//! # vlab – vSphere session lifecycle and task watching
//!
//! Connects to vCenter / ESXi through the vSphere REST API, issues
//! task-returning VM operations, and waits for those tasks with a deadline.
//!
//! ## Modules
//!
//! - **config**: Endpoint / credential configuration (JSON or YAML)
//! - **error**: Crate-specific error types
//! - **observe**: Injected event sink (tracing, in-memory, null)
//! - **types**: Wire types (session info, VMs, snapshots, tasks)
//! - **vsphere**: REST HTTP client with session-based auth
//! - **session**: Connection lifecycle: connect / disconnect / scoped
//! - **task**: Task handles and the polling `TaskWatcher`
//! - **vm**: VM lookup and power operations
//! - **snapshot**: Snapshot creation
//! - **service**: Aggregate facade over a session and a watcher

pub mod config;
pub mod error;
pub mod observe;
pub mod types;
pub mod vsphere;
pub mod session;
pub mod task;
pub mod vm;
pub mod snapshot;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::{TlsVerification, VsphereConfig};
pub use error::{VmwareError, VmwareErrorKind, VmwareResult};
pub use observe::{EventSink, LifecycleEvent, MemorySink, NullSink, SharedSink, TracingSink};
pub use service::{OperationOutcome, Operations, VmwareService};
pub use session::{Connection, Connector, Session};
pub use task::{PollOutcome, TaskFailure, TaskHandle, TaskState, TaskWatcher};
