//! UPID task polling.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::core::infrastructure::api_client::ApiClient;
use crate::core::domain::error::{ProxmoxError, ProxmoxResult};

/// Poll cadence for `tasks/{upid}/status`.
pub(crate) const TASK_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
    #[serde(default)]
    exitstatus: Option<String>,
}

/// Polls a task until it leaves the `running` state and returns its
/// `exitstatus`. Anything other than `OK` is a [`ProxmoxError::TaskFailed`].
pub(crate) async fn wait_for_completion(
    api: &ApiClient,
    node: &str,
    upid: &str,
) -> ProxmoxResult<String> {
    loop {
        let status: TaskStatus = api
            .get(&format!("nodes/{node}/tasks/{upid}/status"))
            .await?;
        if status.status != "running" {
            let exit_status = status.exitstatus.unwrap_or_default();
            debug!(upid, %exit_status, "task finished");
            if exit_status == "OK" {
                return Ok(exit_status);
            }
            return Err(ProxmoxError::TaskFailed {
                upid: upid.to_string(),
                exit_status,
            });
        }
        debug!(upid, "task still running");
        sleep(TASK_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::infrastructure::api_client::{ApiClient, ClientConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UPID: &str = "UPID:pve1:000A:000B:000C:qmconfig:100:root@pam:";

    async fn client_for(server: &MockServer) -> ApiClient {
        let client = ApiClient::new(
            super::super::api_client::tests::test_connection(&server.uri()),
            ClientConfig::default(),
        )
        .unwrap();
        client
            .set_auth(super::super::api_client::tests::test_auth())
            .await;
        client
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_terminal() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        let status_path = format!("/api2/json/nodes/pve1/tasks/{UPID}/status");
        Mock::given(method("GET"))
            .and(path(status_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"status": "running"}
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(status_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"status": "stopped", "exitstatus": "OK"}
            })))
            .mount(&server)
            .await;

        let start = tokio::time::Instant::now();
        let exit = wait_for_completion(&client, "pve1", UPID).await.unwrap();
        assert_eq!(exit, "OK");
        assert!(start.elapsed() >= Duration::from_secs(10), "two poll sleeps");
    }

    #[tokio::test]
    async fn test_non_ok_exitstatus_is_task_failed() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("/api2/json/nodes/pve1/tasks/{UPID}/status").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"status": "stopped", "exitstatus": "command failed"}
            })))
            .mount(&server)
            .await;

        let err = wait_for_completion(&client, "pve1", UPID).await.unwrap_err();
        match err {
            ProxmoxError::TaskFailed { exit_status, .. } => {
                assert_eq!(exit_status, "command failed")
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }
    }
}
