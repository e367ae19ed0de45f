use crate::core::domain::error::{ProxmoxResult, ValidationError};

pub(crate) fn validate_network_interface_id(id: u8) -> Result<(), ValidationError> {
    if id > 31 {
        return Err(ValidationError::field(
            "network interface id",
            "must be in the range 0-31",
        ));
    }
    Ok(())
}

/// Index of a virtual NIC (`net0` … `net31`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetworkInterfaceId(u8);

impl NetworkInterfaceId {
    pub fn new(id: u8) -> ProxmoxResult<Self> {
        validate_network_interface_id(id)?;
        Ok(Self(id))
    }

    pub(crate) fn new_unchecked(id: u8) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// The config key for this interface, e.g. `net3`.
    pub(crate) fn config_key(&self) -> String {
        format!("net{}", self.0)
    }
}

impl std::fmt::Display for NetworkInterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert!(NetworkInterfaceId::new(0).is_ok());
        assert!(NetworkInterfaceId::new(31).is_ok());
        assert!(NetworkInterfaceId::new(32).is_err());
    }

    #[test]
    fn test_config_key() {
        assert_eq!(NetworkInterfaceId::new(7).unwrap().config_key(), "net7");
    }
}
