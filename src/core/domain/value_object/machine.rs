use crate::core::domain::error::{ProxmoxResult, ValidationError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Base models with an optional pinned version, e.g. `q35`, `pc-i440fx-8.1`.
    static ref RX_MACHINE: Regex =
        Regex::new(r"^(pc|q35|pc-i440fx)(-\d+(\.\d+)*)?$").unwrap();
}

pub(crate) fn validate_machine(machine: &str) -> Result<(), ValidationError> {
    if !RX_MACHINE.is_match(machine) {
        return Err(ValidationError::field(
            "machine",
            "must be one of pc, q35, pc-i440fx, optionally with a version suffix",
        ));
    }
    Ok(())
}

/// QEMU machine model, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Machine(String);

impl Machine {
    pub fn new(machine: impl Into<String>) -> ProxmoxResult<Self> {
        let machine = machine.into();
        validate_machine(&machine)?;
        Ok(Self(machine))
    }

    pub(crate) fn new_unchecked(machine: impl Into<String>) -> Self {
        Self(machine.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The model without a pinned version.
    pub fn base(&self) -> &str {
        RX_MACHINE
            .captures(&self.0)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_models() {
        for m in ["pc", "q35", "pc-i440fx"] {
            assert!(Machine::new(m).is_ok(), "{m} should be valid");
        }
    }

    #[test]
    fn test_versioned_models() {
        for m in ["q35-7.2", "pc-i440fx-8.1", "pc-2"] {
            assert!(Machine::new(m).is_ok(), "{m} should be valid");
        }
    }

    #[test]
    fn test_invalid_models() {
        for m in ["", "microvm", "q35-", "q35-x", "virt"] {
            assert!(Machine::new(m).is_err(), "{m:?} should be rejected");
        }
    }

    #[test]
    fn test_base() {
        assert_eq!(Machine::new_unchecked("pc-i440fx-8.1").base(), "pc-i440fx");
        assert_eq!(Machine::new_unchecked("q35").base(), "q35");
    }
}
