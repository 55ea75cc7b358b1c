//! Mock vSphere endpoint helpers for HTTP-level tests.

use crate::config::VsphereConfig;
use crate::error::VmwareResult;
use crate::session::Connector;
use crate::vsphere::VsphereClient;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const SESSION_ID: &str = "sid-test";

/// Client already holding [`SESSION_ID`].
pub(crate) fn logged_in(server: &MockServer) -> VsphereClient {
    VsphereClient::plain_http(&server.uri()).with_session_id(SESSION_ID)
}

/// `GET /api/vcenter/vm?names=` returns nothing for `name`.
pub(crate) async fn mount_no_vm(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm"))
        .and(query_param("names", name))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

/// One VM called `name` with id `vm_id`, currently in `power_state`.
pub(crate) async fn mount_vm(server: &MockServer, name: &str, vm_id: &str, power_state: &str) {
    Mock::given(method("GET"))
        .and(path("/api/vcenter/vm"))
        .and(query_param("names", name))
        .and(header("vmware-api-session-id", SESSION_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "vm": vm_id,
            "name": name,
            "power_state": power_state,
            "cpu_count": 2,
            "memory_size_MiB": 4096
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/vcenter/vm/{vm_id}/power")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": power_state })))
        .mount(server)
        .await;
}

/// `GET /api/cis/tasks/{task}` reports `status`.
pub(crate) async fn mount_task(server: &MockServer, task: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/cis/tasks/{task}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": status })))
        .mount(server)
        .await;
}

/// Session create, info and delete, each expected exactly once.
pub(crate) async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!(SESSION_ID)))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": "VSPHERE.LOCAL\\Administrator"
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/session"))
        .and(header("vmware-api-session-id", SESSION_ID))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}

/// Logs in over plain HTTP to a mock endpoint.
pub(crate) struct LocalConnector {
    pub base_url: String,
}

#[async_trait]
impl Connector for LocalConnector {
    type Conn = VsphereClient;

    async fn open(&self, config: &VsphereConfig) -> VmwareResult<VsphereClient> {
        let mut client = VsphereClient::plain_http(&self.base_url);
        client.login(&config.username, config.password()).await?;
        Ok(client)
    }
}
