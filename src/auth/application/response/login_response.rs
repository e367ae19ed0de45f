use serde::Deserialize;

/// Body of a successful `POST /access/ticket`.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub data: LoginData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginData {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
}
