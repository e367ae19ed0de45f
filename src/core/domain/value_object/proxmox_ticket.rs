use crate::core::domain::error::{ProxmoxResult, ValidationError};
use std::time::{Duration, SystemTime};

pub(crate) fn validate_ticket(ticket: &str) -> Result<(), ValidationError> {
    if ticket.is_empty() {
        return Err(ValidationError::field("ticket", "ticket may not be empty"));
    }
    // PVE:<user>@<realm>:<hex8>::<signature>
    let parts: Vec<&str> = ticket.split(':').collect();
    if parts.len() < 4 || parts[0] != "PVE" {
        return Err(ValidationError::Format(
            "ticket must have the form PVE:user@realm:timestamp::signature".to_string(),
        ));
    }
    if !parts[1].contains('@') {
        return Err(ValidationError::Format(
            "ticket is missing the user@realm part".to_string(),
        ));
    }
    if parts[2].len() != 8 || !parts[2].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::Format(
            "ticket timestamp must be 8 hex digits".to_string(),
        ));
    }
    Ok(())
}

/// A session ticket issued by `access/ticket`, valid for two hours.
#[derive(Debug, Clone)]
pub struct ProxmoxTicket {
    value: String,
    issued_at: SystemTime,
}

impl ProxmoxTicket {
    pub fn new(ticket: impl Into<String>) -> ProxmoxResult<Self> {
        let value = ticket.into();
        validate_ticket(&value)?;
        Ok(Self {
            value,
            issued_at: SystemTime::now(),
        })
    }

    pub(crate) fn new_unchecked(ticket: impl Into<String>) -> Self {
        Self {
            value: ticket.into(),
            issued_at: SystemTime::now(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Value for the `Cookie` request header.
    pub(crate) fn as_cookie_header(&self) -> String {
        format!("PVEAuthCookie={}", self.value)
    }

    pub(crate) fn is_expired(&self, lifetime: Duration) -> bool {
        self.issued_at
            .elapsed()
            .map(|elapsed| elapsed > lifetime)
            .unwrap_or(true)
    }
}
