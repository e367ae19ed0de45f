use crate::core::domain::error::{ProxmoxResult, ValidationError};

const MIN_LENGTH: usize = 12;
const MIN_ENTROPY_SCORE: u8 = 3;

pub(crate) fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_LENGTH {
        return Err(ValidationError::field(
            "password",
            format!("must be at least {MIN_LENGTH} characters"),
        ));
    }
    let entropy = zxcvbn::zxcvbn(password, &[])
        .map_err(|_| ValidationError::field("password", "password is required"))?;
    if entropy.score() < MIN_ENTROPY_SCORE {
        return Err(ValidationError::field(
            "password",
            format!(
                "entropy score {} is below the minimum of {MIN_ENTROPY_SCORE}",
                entropy.score()
            ),
        ));
    }
    Ok(())
}

/// Login password. Strength is gated on construction; API tokens are the
/// recommended alternative for unattended use.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxmoxPassword(String);

impl ProxmoxPassword {
    pub fn new(password: impl Into<String>) -> ProxmoxResult<Self> {
        let password = password.into();
        validate_password(&password)?;
        Ok(Self(password))
    }

    pub(crate) fn new_unchecked(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep credentials out of debug output.
impl std::fmt::Debug for ProxmoxPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProxmoxPassword(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_password_accepted() {
        assert!(ProxmoxPassword::new("Tr0ub4dor&3-horse-staple").is_ok());
    }

    #[test]
    fn test_weak_passwords_rejected() {
        for pw in ["", "short1!", "password12345", "aaaaaaaaaaaaaa"] {
            assert!(ProxmoxPassword::new(pw).is_err(), "{pw:?} should be rejected");
        }
    }

    #[test]
    fn test_debug_redacts() {
        let pw = ProxmoxPassword::new_unchecked("hunter2hunter2");
        assert_eq!(format!("{pw:?}"), "ProxmoxPassword(***)");
    }
}
