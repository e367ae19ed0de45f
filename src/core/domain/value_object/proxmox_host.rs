use crate::core::domain::error::{ProxmoxResult, ValidationError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RX_HOST: Regex = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?$").unwrap();
}

pub(crate) fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() {
        return Err(ValidationError::field("host", "host is required"));
    }
    if host.len() > 253 || !RX_HOST.is_match(host) {
        return Err(ValidationError::field(
            "host",
            "must be an IP address or hostname",
        ));
    }
    Ok(())
}

/// IP address or hostname of the PVE server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxHost(String);

impl ProxmoxHost {
    pub fn new(host: impl Into<String>) -> ProxmoxResult<Self> {
        let host = host.into();
        validate_host(&host)?;
        Ok(Self(host))
    }

    pub(crate) fn new_unchecked(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
