//! VM power operations via the vSphere REST API.
//!
//! Power changes are issued with `vmw-tasks=true` so they come back as task
//! ids for a [`TaskWatcher`](crate::task::TaskWatcher) to follow.

use crate::error::VmwareResult;
use crate::task::RemoteTask;
use crate::types::*;
use crate::vsphere::VsphereClient;

/// Result of asking for a power state change.
#[derive(Debug)]
pub enum PowerChange<'a> {
    /// The VM was already in the requested state; nothing was issued.
    AlreadyInState,
    /// The endpoint applied the change synchronously and returned no task.
    Completed,
    Started(RemoteTask<'a>),
}

/// VM lookups and power operations backed by `VsphereClient`.
pub struct VmManager<'a> {
    client: &'a VsphereClient,
}

impl<'a> VmManager<'a> {
    pub fn new(client: &'a VsphereClient) -> Self {
        Self { client }
    }

    /// Single filtered lookup by exact name. `Ok(None)` when no VM matches.
    pub async fn find_vm_by_name(&self, name: &str) -> VmwareResult<Option<VmSummary>> {
        let vms: Vec<VmSummary> = self
            .client
            .get_with_params("/api/vcenter/vm", &[("names", name)])
            .await?;
        Ok(vms.into_iter().find(|vm| vm.name == name))
    }

    /// Get current power state.
    pub async fn get_power_state(&self, vm_id: &str) -> VmwareResult<VmPowerState> {
        #[derive(serde::Deserialize)]
        struct PowerInfo {
            state: VmPowerState,
        }
        let path = format!("/api/vcenter/vm/{vm_id}/power");
        let info: PowerInfo = self.client.get(&path).await?;
        Ok(info.state)
    }

    /// Power on unless already on.
    pub async fn power_on(&self, vm_id: &str) -> VmwareResult<PowerChange<'a>> {
        self.change_power(vm_id, VmPowerState::PoweredOn, "start").await
    }

    /// Hard power off unless already off.
    pub async fn power_off(&self, vm_id: &str) -> VmwareResult<PowerChange<'a>> {
        self.change_power(vm_id, VmPowerState::PoweredOff, "stop").await
    }

    async fn change_power(
        &self,
        vm_id: &str,
        target: VmPowerState,
        action: &str,
    ) -> VmwareResult<PowerChange<'a>> {
        if self.get_power_state(vm_id).await? == target {
            return Ok(PowerChange::AlreadyInState);
        }
        let path = power_action_path(vm_id, action);
        let task_id: Option<String> = self.client.post::<(), _>(&path, None).await?;
        match task_id {
            Some(task_id) => {
                tracing::debug!(vm = vm_id, action, task = %task_id, "Power task issued");
                Ok(PowerChange::Started(RemoteTask::new(self.client, task_id)))
            }
            None => {
                tracing::debug!(vm = vm_id, action, "Power change applied without a task");
                Ok(PowerChange::Completed)
            }
        }
    }
}

fn power_action_path(vm_id: &str, action: &str) -> String {
    format!("/api/vcenter/vm/{vm_id}/power?action={action}&vmw-tasks=true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskHandle;
    use crate::testing::{logged_in, mount_no_vm, mount_vm};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn power_post(vm_id: &str, action: &str) -> wiremock::MockBuilder {
        Mock::given(method("POST"))
            .and(path(format!("/api/vcenter/vm/{vm_id}/power")))
            .and(query_param("action", action))
            .and(query_param("vmw-tasks", "true"))
    }

    #[tokio::test]
    async fn unknown_name_is_none() {
        let server = MockServer::start().await;
        mount_no_vm(&server, "ghost-vm").await;
        let client = logged_in(&server);

        let vm = VmManager::new(&client).find_vm_by_name("ghost-vm").await.unwrap();
        assert!(vm.is_none());
    }

    #[tokio::test]
    async fn finds_vm_by_exact_name() {
        let server = MockServer::start().await;
        mount_vm(&server, "test-vm", "vm-42", "POWERED_OFF").await;
        let client = logged_in(&server);

        let vm = VmManager::new(&client).find_vm_by_name("test-vm").await.unwrap().unwrap();
        assert_eq!(vm.vm, "vm-42");
        assert_eq!(vm.power_state, VmPowerState::PoweredOff);
    }

    #[tokio::test]
    async fn power_on_skipped_when_already_on() {
        let server = MockServer::start().await;
        mount_vm(&server, "test-vm", "vm-42", "POWERED_ON").await;
        power_post("vm-42", "start")
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("task-1")))
            .expect(0)
            .mount(&server)
            .await;
        let client = logged_in(&server);

        let change = VmManager::new(&client).power_on("vm-42").await.unwrap();
        assert!(matches!(change, PowerChange::AlreadyInState));
    }

    #[tokio::test]
    async fn power_on_returns_issued_task() {
        let server = MockServer::start().await;
        mount_vm(&server, "test-vm", "vm-42", "POWERED_OFF").await;
        power_post("vm-42", "start")
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("task-1")))
            .expect(1)
            .mount(&server)
            .await;
        let client = logged_in(&server);

        match VmManager::new(&client).power_on("vm-42").await.unwrap() {
            PowerChange::Started(task) => assert_eq!(task.id(), "task-1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_power_reply_means_completed() {
        let server = MockServer::start().await;
        mount_vm(&server, "test-vm", "vm-42", "POWERED_ON").await;
        power_post("vm-42", "stop")
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let client = logged_in(&server);

        let change = VmManager::new(&client).power_off("vm-42").await.unwrap();
        assert!(matches!(change, PowerChange::Completed));
    }

    #[test]
    fn power_path_requests_task() {
        assert_eq!(
            power_action_path("vm-42", "start"),
            "/api/vcenter/vm/vm-42/power?action=start&vmw-tasks=true"
        );
    }
}
