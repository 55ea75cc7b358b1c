//! VM snapshot creation via the vSphere REST API.

use crate::error::VmwareResult;
use crate::task::RemoteTask;
use crate::types::*;
use crate::vsphere::VsphereClient;

/// Snapshot operations on a VM.
pub struct SnapshotManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    /// Issue a snapshot task. The returned handle completes when the
    /// snapshot exists.
    pub async fn create_snapshot(
        &self,
        vm_id: &str,
        spec: &CreateSnapshotSpec,
    ) -> VmwareResult<RemoteTask<'a>> {
        let path = format!("/api/vcenter/vm/{vm_id}/snapshots?vmw-tasks=true");
        let task_id: String = self.client.post(&path, Some(spec)).await?;
        tracing::debug!(vm = vm_id, snapshot = %spec.name, task = %task_id, "Snapshot task issued");
        Ok(RemoteTask::new(self.client, task_id))
    }

    /// Snapshot with an optional description, no quiesce.
    pub async fn create_named_snapshot(
        &self,
        vm_id: &str,
        name: &str,
        description: Option<&str>,
        memory: bool,
    ) -> VmwareResult<RemoteTask<'a>> {
        let spec = CreateSnapshotSpec {
            name: name.to_string(),
            description: description.map(str::to_string),
            memory,
            quiesce: false,
        };
        self.create_snapshot(vm_id, &spec).await
    }
}
