use crate::core::domain::error::{ProxmoxResult, ValidationError};

pub(crate) fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::field("port", "port may not be zero"));
    }
    Ok(())
}

/// API port of the PVE server (8006 unless proxied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxmoxPort(u16);

impl ProxmoxPort {
    pub const DEFAULT: u16 = 8006;

    pub fn new(port: u16) -> ProxmoxResult<Self> {
        validate_port(port)?;
        Ok(Self(port))
    }

    pub(crate) fn new_unchecked(port: u16) -> Self {
        Self(port)
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports() {
        assert!(ProxmoxPort::new(8006).is_ok());
        assert!(ProxmoxPort::new(443).is_ok());
        assert!(ProxmoxPort::new(0).is_err());
    }
}
