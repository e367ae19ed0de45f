use crate::core::domain::error::{ProxmoxResult, ValidationError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RX_POOL: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap();
}

const POOL_MAX_LEN: usize = 1024;

pub(crate) fn validate_pool_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::field("pool", "may not be empty"));
    }
    if name.len() > POOL_MAX_LEN {
        return Err(ValidationError::field(
            "pool",
            format!("may not be longer than {POOL_MAX_LEN} characters"),
        ));
    }
    if !RX_POOL.is_match(name) {
        return Err(ValidationError::field(
            "pool",
            "may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

/// Name of a resource pool a guest can be a member of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolName(String);

impl PoolName {
    pub fn new(name: impl Into<String>) -> ProxmoxResult<Self> {
        let name = name.into();
        validate_pool_name(&name)?;
        Ok(Self(name))
    }

    pub(crate) fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PoolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
