use crate::core::domain::error::{ProxmoxResult, ValidationError};

const ALLOWED_REALMS: [&str; 4] = ["pam", "pve", "ldap", "ad"];

pub(crate) fn validate_realm(realm: &str) -> Result<(), ValidationError> {
    if realm.is_empty() {
        return Err(ValidationError::field("realm", "realm is required"));
    }
    if !ALLOWED_REALMS.contains(&realm) {
        return Err(ValidationError::Constraint(format!(
            "invalid realm '{realm}', allowed realms are: {}",
            ALLOWED_REALMS.join(", ")
        )));
    }
    Ok(())
}

/// Authentication realm (`pam`, `pve`, `ldap`, `ad`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxRealm(String);

impl ProxmoxRealm {
    pub fn new(realm: impl Into<String>) -> ProxmoxResult<Self> {
        let realm = realm.into();
        validate_realm(&realm)?;
        Ok(Self(realm))
    }

    pub(crate) fn new_unchecked(realm: impl Into<String>) -> Self {
        Self(realm.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realms() {
        for realm in ALLOWED_REALMS {
            assert!(ProxmoxRealm::new(realm).is_ok(), "{realm} should be valid");
        }
        assert!(ProxmoxRealm::new("").is_err());
        assert!(ProxmoxRealm::new("PAM").is_err());
        assert!(ProxmoxRealm::new("krb5").is_err());
    }
}
