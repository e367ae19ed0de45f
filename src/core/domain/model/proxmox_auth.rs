use crate::core::domain::value_object::{ProxmoxCsrfToken, ProxmoxTicket};

/// A live ticket session: the `PVEAuthCookie` ticket plus the CSRF token
/// required on mutating requests.
#[derive(Debug, Clone)]
pub struct ProxmoxAuth {
    ticket: ProxmoxTicket,
    csrf_token: Option<ProxmoxCsrfToken>,
}

impl ProxmoxAuth {
    pub fn new(ticket: ProxmoxTicket, csrf_token: Option<ProxmoxCsrfToken>) -> Self {
        Self { ticket, csrf_token }
    }

    pub fn ticket(&self) -> &ProxmoxTicket {
        &self.ticket
    }

    pub fn csrf_token(&self) -> Option<&ProxmoxCsrfToken> {
        self.csrf_token.as_ref()
    }
}
