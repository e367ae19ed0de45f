//! Shared fixtures for the wiremock-backed tests.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::core::domain::model::{ProxmoxAuth, ProxmoxConnection};
use crate::core::domain::value_object::{
    ProxmoxCsrfToken, ProxmoxHost, ProxmoxPassword, ProxmoxPort, ProxmoxRealm, ProxmoxTicket,
    ProxmoxUrl, ProxmoxUsername,
};
use crate::core::infrastructure::api_client::{ApiClient, ClientConfig};
use crate::{NodeName, ProxmoxClient, VmId, VmRef};

pub(crate) fn test_connection(server_url: &str) -> ProxmoxConnection {
    ProxmoxConnection::new(
        ProxmoxHost::new_unchecked(server_url.trim_start_matches("http://").to_string()),
        ProxmoxPort::new_unchecked(8006),
        Some(ProxmoxUsername::new_unchecked("testuser")),
        Some(ProxmoxPassword::new_unchecked("testpass-testpass")),
        Some(ProxmoxRealm::new_unchecked("pam")),
        false,
        true,
        ProxmoxUrl::new_unchecked(&(server_url.to_string() + "/")),
    )
}

pub(crate) async fn authenticated_client(server: &MockServer) -> ProxmoxClient {
    let api_client = ApiClient::new(test_connection(&server.uri()), ClientConfig::default()).unwrap();
    api_client
        .set_auth(ProxmoxAuth::new(
            ProxmoxTicket::new_unchecked("PVE:testuser@pam:4EEC61E2::sig"),
            Some(ProxmoxCsrfToken::new_unchecked("4EEC61E2:token")),
        ))
        .await;
    ProxmoxClient { api_client }
}

pub(crate) fn vmr(vm_id: u32) -> VmRef {
    VmRef::new(VmId::new_unchecked(vm_id), NodeName::new_unchecked("pve1"))
}

pub(crate) async fn mount_version(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api2/json/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"version": "8.1.4", "release": "8.1", "repoid": "d258a813"}
        })))
        .mount(server)
        .await;
}

pub(crate) async fn mount_status_unlocked(server: &MockServer, vm_id: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/qemu/{vm_id}/status/current").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"status": "running", "name": "test"}
        })))
        .mount(server)
        .await;
}

pub(crate) async fn mount_config(server: &MockServer, vm_id: u32, config: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/qemu/{vm_id}/config").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": config
        })))
        .mount(server)
        .await;
}

pub(crate) async fn mount_empty_cluster_resources(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": []
        })))
        .mount(server)
        .await;
}

pub(crate) async fn mount_empty_pending(server: &MockServer, vm_id: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/qemu/{vm_id}/pending").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": []
        })))
        .mount(server)
        .await;
}

/// Mounts a task status endpoint that reports immediate success.
pub(crate) async fn mount_task_ok(server: &MockServer, upid: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api2/json/nodes/pve1/tasks/{upid}/status").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"status": "stopped", "exitstatus": "OK"}
        })))
        .mount(server)
        .await;
}
