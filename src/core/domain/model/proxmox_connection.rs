use crate::core::domain::error::{ProxmoxError, ProxmoxResult};
use crate::core::domain::value_object::{
    ProxmoxHost, ProxmoxPassword, ProxmoxPort, ProxmoxRealm, ProxmoxUrl, ProxmoxUsername,
};

/// Where and how to reach the PVE API. Credentials are optional because API
/// tokens do not need a login flow.
#[derive(Debug, Clone)]
pub struct ProxmoxConnection {
    host: ProxmoxHost,
    port: ProxmoxPort,
    username: Option<ProxmoxUsername>,
    password: Option<ProxmoxPassword>,
    realm: Option<ProxmoxRealm>,
    secure: bool,
    accept_invalid_certs: bool,
    url: ProxmoxUrl,
}

impl ProxmoxConnection {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        host: ProxmoxHost,
        port: ProxmoxPort,
        username: Option<ProxmoxUsername>,
        password: Option<ProxmoxPassword>,
        realm: Option<ProxmoxRealm>,
        secure: bool,
        accept_invalid_certs: bool,
        url: ProxmoxUrl,
    ) -> Self {
        Self {
            host,
            port,
            username,
            password,
            realm,
            secure,
            accept_invalid_certs,
            url,
        }
    }

    pub fn host(&self) -> &ProxmoxHost {
        &self.host
    }

    pub fn port(&self) -> ProxmoxPort {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    pub fn url(&self) -> &ProxmoxUrl {
        &self.url
    }

    /// The `user@realm` + password pair for the ticket login flow.
    pub(crate) fn credentials(
        &self,
    ) -> ProxmoxResult<(&ProxmoxUsername, &ProxmoxPassword, &ProxmoxRealm)> {
        match (&self.username, &self.password, &self.realm) {
            (Some(u), Some(p), Some(r)) => Ok((u, p, r)),
            _ => Err(ProxmoxError::Authentication(
                "no credentials configured; use an API token or set username/password".to_string(),
            )),
        }
    }
}
