//! Shared wire types for the vSphere REST API.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session info as returned by `GET /api/session`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub last_accessed_time: Option<String>,
}

/// Root content of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContent {
    pub session: SessionInfo,
    pub connected_at: chrono::DateTime<chrono::Utc>,
}

impl ServiceContent {
    pub fn new(session: SessionInfo) -> Self {
        Self { session, connected_at: chrono::Utc::now() }
    }

    pub fn user(&self) -> Option<&str> {
        self.session.user.as_deref()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmPowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Concise VM summary (from the list endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
    /// vSphere managed-object ID (e.g. "vm-42")
    pub vm: String,
    pub name: String,
    #[serde(default)]
    pub power_state: VmPowerState,
    #[serde(default)]
    pub cpu_count: Option<u32>,
    #[serde(default, rename = "memory_size_MiB")]
    pub memory_size_mib: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateSnapshotSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Snapshot the VM's memory state
    #[serde(default)]
    pub memory: bool,
    /// Quiesce the guest file system
    #[serde(default)]
    pub quiesce: bool,
}

impl CreateSnapshotSpec {
    /// No memory, no quiesce.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, memory: false, quiesce: false }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Task status as reported by `/api/cis/tasks/{task}`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Blocked,
    Succeeded,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub description: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub progress: Option<serde_json::Value>,
    #[serde(default)]
    pub cancelable: Option<bool>,
}
