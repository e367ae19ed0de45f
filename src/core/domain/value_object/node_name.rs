use crate::core::domain::error::{ProxmoxResult, ValidationError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Cluster node names follow hostname rules.
    static ref RX_NODE: Regex = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").unwrap();
}

pub(crate) fn validate_node_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::field("node", "may not be empty"));
    }
    if name.len() > 63 || !RX_NODE.is_match(name) {
        return Err(ValidationError::field(
            "node",
            "must be a valid hostname label",
        ));
    }
    Ok(())
}

/// Name of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> ProxmoxResult<Self> {
        let name = name.into();
        validate_node_name(&name)?;
        Ok(Self(name))
    }

    pub(crate) fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
