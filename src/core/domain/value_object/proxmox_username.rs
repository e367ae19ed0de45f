use crate::core::domain::error::{ProxmoxResult, ValidationError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RX_USERNAME: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

pub(crate) fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::field("username", "username is required"));
    }
    if username.len() > 64 || !RX_USERNAME.is_match(username) {
        return Err(ValidationError::field(
            "username",
            "may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(())
}

/// Account name without the realm suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxUsername(String);

impl ProxmoxUsername {
    pub fn new(username: impl Into<String>) -> ProxmoxResult<Self> {
        let username = username.into();
        validate_username(&username)?;
        Ok(Self(username))
    }

    pub(crate) fn new_unchecked(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
