use crate::core::domain::codec::{value_to_u64, DeleteList, Params};
use crate::core::domain::error::ValidationError;

const MIN_SIZE_MIB: u32 = 16;

/// Guest memory configuration (`memory`, `balloon`, `shares` options).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QemuMemory {
    /// Memory ceiling in MiB.
    pub size_mib: Option<u32>,
    /// Balloon floor in MiB; `Some(0)` disables ballooning.
    pub balloon_mib: Option<u32>,
    /// Auto-balloon weight; only meaningful while ballooning is active.
    /// `Some(0)` removes the override.
    pub shares: Option<u16>,
}

impl QemuMemory {
    pub fn with_size(size_mib: u32) -> Self {
        Self {
            size_mib: Some(size_mib),
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self, current: Option<&QemuMemory>) -> Result<(), ValidationError> {
        let size = self.size_mib.or(current.and_then(|c| c.size_mib));
        match size {
            None => {
                return Err(ValidationError::field(
                    "memory.size",
                    "required during creation",
                ))
            }
            Some(size) if size < MIN_SIZE_MIB => {
                return Err(ValidationError::field(
                    "memory.size",
                    format!("must be at least {MIN_SIZE_MIB} MiB"),
                ))
            }
            Some(size) => {
                let balloon = self.balloon_mib.or(current.and_then(|c| c.balloon_mib));
                if let Some(balloon) = balloon {
                    if balloon > size {
                        return Err(ValidationError::field(
                            "memory.balloon",
                            "may not exceed memory size",
                        ));
                    }
                }
                if matches!(self.shares, Some(s) if s > 0)
                    && balloon.map(|b| b == 0).unwrap_or(true)
                {
                    return Err(ValidationError::Constraint(
                        "memory shares require an active balloon device".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn map_to_api(
        &self,
        current: Option<&QemuMemory>,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) {
        if let Some(size) = self.size_mib {
            if current.and_then(|c| c.size_mib) != Some(size) {
                params.insert("memory".to_string(), size.into());
            }
        }
        if let Some(balloon) = self.balloon_mib {
            if current.and_then(|c| c.balloon_mib) != Some(balloon) {
                params.insert("balloon".to_string(), balloon.into());
            }
        }
        match self.shares {
            Some(0) => {
                if current.map(|c| c.shares.is_some()).unwrap_or(false) {
                    deletes.push("shares");
                }
            }
            Some(shares) => {
                if current.and_then(|c| c.shares) != Some(shares) {
                    params.insert("shares".to_string(), shares.into());
                }
            }
            None => {}
        }
    }

    /// A size change is live only when the guest hotplugs memory and the new
    /// size is not smaller; balloon and shares always apply live.
    pub(crate) fn requires_reboot(&self, current: &QemuMemory, hotplug_memory: bool) -> bool {
        match (self.size_mib, current.size_mib) {
            (Some(new), Some(old)) if new != old => !(hotplug_memory && new >= old),
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub(crate) fn map_to_struct(params: &Params) -> Option<QemuMemory> {
        let mut memory = QemuMemory::default();
        let mut any = false;

        if let Some(v) = params.get("memory").and_then(value_to_u64) {
            memory.size_mib = Some(v as u32);
            any = true;
        }
        if let Some(v) = params.get("balloon").and_then(value_to_u64) {
            memory.balloon_mib = Some(v as u32);
            any = true;
        }
        if let Some(v) = params.get("shares").and_then(value_to_u64) {
            memory.shares = Some(v as u16);
            any = true;
        }

        any.then_some(memory)
    }
}
