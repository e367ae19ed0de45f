use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::auth::application::{
    request::login_request::LoginRequest, response::login_response::LoginResponse,
};
use crate::core::domain::error::{ProxmoxError, ProxmoxResult};
use crate::core::domain::model::{ProxmoxAuth, ProxmoxConnection};
use crate::core::domain::value_object::{ProxmoxCsrfToken, ProxmoxTicket};

/// Exchanges credentials for a ticket + CSRF token pair via
/// `POST /access/ticket`.
pub(crate) struct LoginService;

impl LoginService {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn execute(&self, connection: &ProxmoxConnection) -> ProxmoxResult<ProxmoxAuth> {
        let (username, password, realm) = connection.credentials()?;
        let request = LoginRequest {
            username: username.as_str().to_string(),
            password: password.as_str().to_string(),
            realm: realm.as_str().to_string(),
        };

        let http_client = Client::builder()
            .danger_accept_invalid_certs(connection.accepts_invalid_certs())
            .build()
            .map_err(|e| ProxmoxError::Transport(e.to_string()))?;

        let url = connection.url().with_path("api2/json/access/ticket");
        debug!(%url, "requesting ticket");
        let response = http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProxmoxError::Transport(format!("login request failed: {e}")))?;

        match response.status() {
            StatusCode::OK => {
                let login: LoginResponse = response.json().await.map_err(|e| {
                    ProxmoxError::Transport(format!("failed to parse login response: {e}"))
                })?;
                let ticket = ProxmoxTicket::new(login.data.ticket)?;
                let csrf_token = ProxmoxCsrfToken::new(login.data.csrf_token)?;
                Ok(ProxmoxAuth::new(ticket, Some(csrf_token)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProxmoxError::Authentication(
                "invalid credentials".to_string(),
            )),
            StatusCode::NOT_FOUND => Err(ProxmoxError::NotFound(
                "login endpoint not found".to_string(),
            )),
            status => Err(ProxmoxError::Transport(format!(
                "unexpected login response status {status}"
            ))),
        }
    }
}

impl Default for LoginService {
    fn default() -> Self {
        Self::new()
    }
}
