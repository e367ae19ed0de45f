use crate::core::domain::error::{ProxmoxResult, ValidationError};

/// Upper bound imposed by the PVE API schema.
const VM_ID_MAX: u32 = 999_999_999;

pub(crate) fn validate_vm_id(id: u32) -> Result<(), ValidationError> {
    if id == 0 || id > VM_ID_MAX {
        return Err(ValidationError::field(
            "vmid",
            format!("must be in the range 1-{VM_ID_MAX}"),
        ));
    }
    Ok(())
}

/// A cluster-unique QEMU guest identifier.
///
/// PVE accepts ids in `1..=999_999_999`; ids below 100 are reserved by
/// convention for internal use, which [`crate::ProxmoxClient::max_vm_id`]
/// honors by flooring at 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VmId(u32);

impl VmId {
    pub fn new(id: u32) -> ProxmoxResult<Self> {
        validate_vm_id(id)?;
        Ok(Self(id))
    }

    pub(crate) fn new_unchecked(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in [1, 100, 999_999_999] {
            assert!(VmId::new(id).is_ok(), "id {id} should be valid");
        }
    }

    #[test]
    fn test_invalid_ids() {
        for id in [0, 1_000_000_000] {
            assert!(VmId::new(id).is_err(), "id {id} should be rejected");
        }
    }
}
