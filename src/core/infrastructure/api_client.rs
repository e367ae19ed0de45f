//! Authenticated JSON transport against the PVE REST API.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::application::service::login_service::LoginService;
use crate::core::domain::error::{ProxmoxError, ProxmoxResult};
use crate::core::domain::model::{ProxmoxAuth, ProxmoxConnection};
use crate::core::domain::value_object::ProxmoxApiToken;

/// Client-side rate limit, applied before every request.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Tunables of the transport layer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a ticket is trusted before a re-login; PVE issues them for
    /// two hours.
    pub ticket_lifetime: Duration,
    pub rate_limit: Option<RateLimitConfig>,
    /// Per-request deadline; cancellation is cooperative at request
    /// boundaries.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ticket_lifetime: Duration::from_secs(7200),
            rate_limit: None,
            request_timeout: None,
        }
    }
}

/// Either a ticket session (refreshable) or a static API token.
#[derive(Debug, Clone)]
enum AuthState {
    Ticket(ProxmoxAuth),
    Token(ProxmoxApiToken),
}

/// Every response body is wrapped in a `data` envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Internal HTTP client that injects authentication into each request.
///
/// Ticket sessions get one automatic re-login + retry on `401`; API tokens
/// are static and surface `401` directly. The permission cache is
/// process-wide, read-through and purged only on logout.
#[derive(Debug)]
pub struct ApiClient {
    http_client: Client,
    connection: Arc<ProxmoxConnection>,
    auth: Arc<RwLock<Option<AuthState>>>,
    config: Arc<ClientConfig>,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    permission_cache: Arc<RwLock<HashMap<String, SystemTime>>>,
}

impl ApiClient {
    /// Creates a new `ApiClient`. The client starts unauthenticated.
    pub fn new(connection: ProxmoxConnection, config: ClientConfig) -> ProxmoxResult<Self> {
        let mut builder =
            Client::builder().danger_accept_invalid_certs(connection.accepts_invalid_certs());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ProxmoxError::Transport(e.to_string()))?;

        let rate_limiter = config.rate_limit.map(|rl| {
            let quota = Quota::per_second(NonZeroU32::new(rl.requests_per_second).unwrap())
                .allow_burst(NonZeroU32::new(rl.burst_size).unwrap());
            Arc::new(DefaultDirectRateLimiter::direct(quota))
        });

        Ok(Self {
            http_client,
            connection: Arc::new(connection),
            auth: Arc::new(RwLock::new(None)),
            config: Arc::new(config),
            rate_limiter,
            permission_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn connection(&self) -> &ProxmoxConnection {
        &self.connection
    }

    /// Installs a ticket session (after login or for tests).
    pub async fn set_auth(&self, auth: ProxmoxAuth) {
        *self.auth.write().await = Some(AuthState::Ticket(auth));
    }

    /// Installs a static API token.
    pub async fn set_token(&self, token: ProxmoxApiToken) {
        *self.auth.write().await = Some(AuthState::Token(token));
    }

    pub async fn ticket_auth(&self) -> Option<ProxmoxAuth> {
        match self.auth.read().await.as_ref() {
            Some(AuthState::Ticket(auth)) => Some(auth.clone()),
            _ => None,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        match self.auth.read().await.as_ref() {
            Some(AuthState::Ticket(auth)) => {
                !auth.ticket().is_expired(self.config.ticket_lifetime)
            }
            Some(AuthState::Token(_)) => true,
            None => false,
        }
    }

    /// Drops the session and purges the permission cache.
    pub async fn logout(&self) {
        *self.auth.write().await = None;
        self.permission_cache.write().await.clear();
    }

    /// Records that the session was observed to hold a permission path.
    pub(crate) async fn insert_cached_permission(&self, path: String) {
        self.permission_cache
            .write()
            .await
            .insert(path, SystemTime::now());
    }

    pub(crate) async fn has_cached_permission(&self, path: &str) -> bool {
        self.permission_cache.read().await.contains_key(path)
    }

    /// Performs an authenticated GET, unwrapping the `data` envelope.
    pub async fn get<T>(&self, path: &str) -> ProxmoxResult<T>
    where
        T: DeserializeOwned,
    {
        self.execute_request(Method::GET, path, None::<&()>).await
    }

    /// Performs an authenticated POST with a JSON body.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> ProxmoxResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.execute_request(Method::POST, path, Some(body)).await
    }

    /// Performs an authenticated PUT with a JSON body.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> ProxmoxResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.execute_request(Method::PUT, path, Some(body)).await
    }

    /// Performs an authenticated DELETE.
    pub async fn delete<T>(&self, path: &str) -> ProxmoxResult<T>
    where
        T: DeserializeOwned,
    {
        self.execute_request(Method::DELETE, path, None::<&()>)
            .await
    }

    async fn execute_request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ProxmoxResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.ensure_authenticated().await?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = self.send(method.clone(), path, body).await?;

        // Expired tickets earn one refresh + retry; tokens do not refresh.
        if response.status() == StatusCode::UNAUTHORIZED && self.is_ticket_session().await {
            debug!(path, "got 401, refreshing ticket once");
            self.refresh_auth().await?;
            let retried = self.send(method, path, body).await?;
            return Self::parse(retried).await;
        }

        Self::parse(response).await
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ProxmoxResult<reqwest::Response>
    where
        B: Serialize,
    {
        let url = self
            .connection
            .url()
            .with_path(&format!("api2/json/{}", path.trim_start_matches('/')));

        let mut req_builder = self.http_client.request(method, &url);
        {
            let auth_guard = self.auth.read().await;
            match auth_guard.as_ref() {
                Some(AuthState::Ticket(auth)) => {
                    req_builder = req_builder.header("Cookie", auth.ticket().as_cookie_header());
                    if let Some(csrf) = auth.csrf_token() {
                        req_builder = req_builder.header("CSRFPreventionToken", csrf.as_str());
                    }
                }
                Some(AuthState::Token(token)) => {
                    req_builder =
                        req_builder.header("Authorization", token.as_authorization_header());
                }
                None => {}
            }
        }
        if let Some(body) = body {
            req_builder = req_builder.json(body);
        }

        req_builder
            .send()
            .await
            .map_err(|e| ProxmoxError::Transport(format!("HTTP request failed: {e}")))
    }

    async fn parse<T>(response: reqwest::Response) -> ProxmoxResult<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            let envelope: Envelope<T> = response.json().await.map_err(|e| {
                ProxmoxError::Transport(format!("failed to parse response: {e}"))
            })?;
            return Ok(envelope.data);
        }

        let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProxmoxError::Authentication(format!("{status}: {body}"))
            }
            StatusCode::NOT_FOUND => ProxmoxError::NotFound(body),
            StatusCode::CONFLICT => ProxmoxError::Conflict(body),
            _ => ProxmoxError::Transport(format!("API error ({status}): {body}")),
        })
    }

    async fn is_ticket_session(&self) -> bool {
        matches!(self.auth.read().await.as_ref(), Some(AuthState::Ticket(_)))
    }

    /// Ensures a usable session: tokens always are, tickets re-login when
    /// missing or expired.
    async fn ensure_authenticated(&self) -> ProxmoxResult<()> {
        let need_refresh = match self.auth.read().await.as_ref() {
            Some(AuthState::Token(_)) => false,
            Some(AuthState::Ticket(auth)) => {
                auth.ticket().is_expired(self.config.ticket_lifetime)
            }
            None => true,
        };
        if need_refresh {
            self.refresh_auth().await?;
        }
        Ok(())
    }

    async fn refresh_auth(&self) -> ProxmoxResult<()> {
        let service = LoginService::new();
        let auth = service.execute(&self.connection).await?;
        *self.auth.write().await = Some(AuthState::Ticket(auth));
        Ok(())
    }
}
