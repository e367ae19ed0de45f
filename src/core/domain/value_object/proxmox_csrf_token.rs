use crate::core::domain::error::{ProxmoxResult, ValidationError};

pub(crate) fn validate_csrf_token(token: &str) -> Result<(), ValidationError> {
    // <hex8>:<signature>
    let Some((timestamp, signature)) = token.split_once(':') else {
        return Err(ValidationError::Format(
            "CSRF token must have the form timestamp:signature".to_string(),
        ));
    };
    if timestamp.len() != 8 || !timestamp.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::Format(
            "CSRF token timestamp must be 8 hex digits".to_string(),
        ));
    }
    if signature.is_empty() {
        return Err(ValidationError::Format(
            "CSRF token signature may not be empty".to_string(),
        ));
    }
    Ok(())
}

/// CSRF prevention token paired with a session ticket; required on every
/// mutating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxCsrfToken(String);

impl ProxmoxCsrfToken {
    pub fn new(token: impl Into<String>) -> ProxmoxResult<Self> {
        let token = token.into();
        validate_csrf_token(&token)?;
        Ok(Self(token))
    }

    pub(crate) fn new_unchecked(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        assert!(ProxmoxCsrfToken::new("4EEC61E2:abc123").is_ok());
        assert!(ProxmoxCsrfToken::new("").is_err());
        assert!(ProxmoxCsrfToken::new("4EEC61E2").is_err());
        assert!(ProxmoxCsrfToken::new("nothex:sig").is_err());
        assert!(ProxmoxCsrfToken::new("4EEC61E2:").is_err());
    }
}
