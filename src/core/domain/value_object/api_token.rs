use crate::core::domain::error::{ProxmoxResult, ValidationError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // user@realm!tokenid=uuid
    static ref RX_API_TOKEN: Regex =
        Regex::new(r"^[^\s@!=]+@[^\s@!=]+![^\s@!=]+=[0-9a-fA-F-]{36}$").unwrap();
}

pub(crate) fn validate_api_token(token: &str) -> Result<(), ValidationError> {
    if !RX_API_TOKEN.is_match(token) {
        return Err(ValidationError::Format(
            "API token must have the form user@realm!tokenid=uuid".to_string(),
        ));
    }
    Ok(())
}

/// A PVE API token, the stateless alternative to ticket sessions. Sent as
/// `Authorization: PVEAPIToken=<value>` on every request; no CSRF token is
/// needed.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxmoxApiToken(String);

impl ProxmoxApiToken {
    pub fn new(token: impl Into<String>) -> ProxmoxResult<Self> {
        let token = token.into();
        validate_api_token(&token)?;
        Ok(Self(token))
    }

    pub(crate) fn new_unchecked(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub(crate) fn as_authorization_header(&self) -> String {
        format!("PVEAPIToken={}", self.0)
    }
}

// The secret half must not leak through logs.
impl std::fmt::Debug for ProxmoxApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.split_once('=') {
            Some((id, _)) => write!(f, "ProxmoxApiToken({id}=***)"),
            None => f.write_str("ProxmoxApiToken(***)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "deploy@pve!ci=12345678-9abc-def0-1234-56789abcdef0";

    #[test]
    fn test_valid_token() {
        assert!(ProxmoxApiToken::new(TOKEN).is_ok());
    }

    #[test]
    fn test_invalid_tokens() {
        for t in [
            "",
            "deploy@pve!ci=notauuid",
            "deploy!ci=12345678-9abc-def0-1234-56789abcdef0",
            "deploy@pve=12345678-9abc-def0-1234-56789abcdef0",
        ] {
            assert!(ProxmoxApiToken::new(t).is_err(), "{t:?} should be rejected");
        }
    }

    #[test]
    fn test_header_and_redaction() {
        let token = ProxmoxApiToken::new_unchecked(TOKEN);
        assert_eq!(
            token.as_authorization_header(),
            format!("PVEAPIToken={TOKEN}")
        );
        assert_eq!(format!("{token:?}"), "ProxmoxApiToken(deploy@pve!ci=***)");
    }
}
