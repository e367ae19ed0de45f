use serde::Serialize;

/// Body of `POST /access/ticket`.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest {
    pub username: String,
    pub password: String,
    pub realm: String,
}
