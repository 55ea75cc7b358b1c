//! Aggregate service façade.
//!
//! `VmwareService` owns a [`Session`] and a [`TaskWatcher`]. Each operation
//! issues a task and waits for it, returning an [`OperationOutcome`] that
//! keeps "VM not found" apart from transport errors.

use crate::config::TlsVerification;
use crate::error::VmwareResult;
use crate::observe::SharedSink;
use crate::session::{Connector, Session};
use crate::snapshot::SnapshotManager;
use crate::task::{PollOutcome, TaskWatcher};
use crate::types::VmSummary;
use crate::vm::{PowerChange, VmManager};
use crate::vsphere::{HttpConnector, VsphereClient};

use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;

/// How a task-issuing operation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// No VM with that name exists.
    VmNotFound,
    /// Already in the requested state; no task was issued.
    Unchanged,
    Finished(PollOutcome),
}

impl OperationOutcome {
    /// `Unchanged` and `Finished(Succeeded)` count as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Unchanged | Self::Finished(PollOutcome::Succeeded))
    }
}

/// Operations over one live connection.
pub struct Operations<'a> {
    client: &'a VsphereClient,
    watcher: TaskWatcher,
}

impl<'a> Operations<'a> {
    pub fn new(client: &'a VsphereClient, watcher: TaskWatcher) -> Self {
        Self { client, watcher }
    }

    pub async fn find_vm(&self, name: &str) -> VmwareResult<Option<VmSummary>> {
        VmManager::new(self.client).find_vm_by_name(name).await
    }

    pub async fn power_on_vm(&self, name: &str, timeout: Duration) -> VmwareResult<OperationOutcome> {
        let Some(vm) = self.find_vm(name).await? else {
            return Ok(OperationOutcome::VmNotFound);
        };
        let change = VmManager::new(self.client).power_on(&vm.vm).await?;
        self.follow(change, timeout).await
    }

    pub async fn power_off_vm(&self, name: &str, timeout: Duration) -> VmwareResult<OperationOutcome> {
        let Some(vm) = self.find_vm(name).await? else {
            return Ok(OperationOutcome::VmNotFound);
        };
        let change = VmManager::new(self.client).power_off(&vm.vm).await?;
        self.follow(change, timeout).await
    }

    pub async fn create_vm_snapshot(
        &self,
        vm_name: &str,
        snapshot_name: &str,
        description: Option<&str>,
        memory: bool,
        timeout: Duration,
    ) -> VmwareResult<OperationOutcome> {
        let Some(vm) = self.find_vm(vm_name).await? else {
            return Ok(OperationOutcome::VmNotFound);
        };
        let task = SnapshotManager::new(self.client)
            .create_named_snapshot(&vm.vm, snapshot_name, description, memory)
            .await?;
        let outcome = self.watcher.wait(&task, timeout).await?;
        Ok(OperationOutcome::Finished(outcome))
    }

    async fn follow(&self, change: PowerChange<'_>, timeout: Duration) -> VmwareResult<OperationOutcome> {
        match change {
            PowerChange::AlreadyInState => Ok(OperationOutcome::Unchanged),
            PowerChange::Completed => Ok(OperationOutcome::Finished(PollOutcome::Succeeded)),
            PowerChange::Started(task) => {
                let outcome = self.watcher.wait(&task, timeout).await?;
                Ok(OperationOutcome::Finished(outcome))
            }
        }
    }
}

/// Top-level service over one vSphere endpoint.
pub struct VmwareService<C: Connector<Conn = VsphereClient> = HttpConnector> {
    session: Session<C>,
    watcher: TaskWatcher,
}

impl<C: Connector<Conn = VsphereClient>> VmwareService<C> {
    pub fn new(session: Session<C>, watcher: TaskWatcher) -> Self {
        Self { session, watcher }
    }

    /// Build the session and watcher around one shared sink.
    pub fn with_sink(session: impl FnOnce(SharedSink) -> Session<C>, sink: SharedSink) -> Self {
        let watcher = TaskWatcher::new(sink.clone());
        Self { session: session(sink), watcher }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn watcher(&self) -> &TaskWatcher {
        &self.watcher
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub async fn connect(&mut self, tls: TlsVerification) -> VmwareResult<()> {
        self.session.connect(tls).await
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await
    }

    /// Operations on the current connection, or `NotConnected`.
    pub fn operations(&self) -> VmwareResult<Operations<'_>> {
        let client = self.session.require_connection()?;
        Ok(Operations::new(client, self.watcher.clone()))
    }

    pub async fn power_on_vm(&self, name: &str, timeout: Duration) -> VmwareResult<OperationOutcome> {
        self.operations()?.power_on_vm(name, timeout).await
    }

    pub async fn power_off_vm(&self, name: &str, timeout: Duration) -> VmwareResult<OperationOutcome> {
        self.operations()?.power_off_vm(name, timeout).await
    }

    pub async fn create_vm_snapshot(
        &self,
        vm_name: &str,
        snapshot_name: &str,
        description: Option<&str>,
        memory: bool,
        timeout: Duration,
    ) -> VmwareResult<OperationOutcome> {
        self.operations()?
            .create_vm_snapshot(vm_name, snapshot_name, description, memory, timeout)
            .await
    }

    /// Connect, run `op` against the live connection, always disconnect.
    pub async fn scoped<T, F>(&mut self, tls: TlsVerification, op: F) -> VmwareResult<T>
    where
        T: 'static,
        F: for<'s> FnOnce(Operations<'s>) -> BoxFuture<'s, VmwareResult<T>>,
    {
        let watcher = self.watcher.clone();
        self.session
            .scoped(tls, move |session| match session.require_connection() {
                Ok(client) => op(Operations::new(client, watcher)),
                Err(e) => async move { Err(e) }.boxed(),
            })
            .await
    }
}
