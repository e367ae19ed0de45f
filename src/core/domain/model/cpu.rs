use crate::core::domain::codec::{value_to_bool, value_to_string, value_to_u64, DeleteList, Params};
use crate::core::domain::error::ValidationError;

/// One named CPU feature flag, explicitly enabled (`+flag`) or disabled
/// (`-flag`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CpuFlag {
    pub name: String,
    pub enabled: bool,
}

impl CpuFlag {
    pub fn on(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }

    pub fn off(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
        }
    }

    fn to_api(&self) -> String {
        format!("{}{}", if self.enabled { '+' } else { '-' }, self.name)
    }

    fn parse(raw: &str) -> Result<Self, ValidationError> {
        if let Some(name) = raw.strip_prefix('+') {
            if !name.is_empty() {
                return Ok(Self::on(name));
            }
        } else if let Some(name) = raw.strip_prefix('-') {
            if !name.is_empty() {
                return Ok(Self::off(name));
            }
        }
        Err(ValidationError::field(
            "cpu.flags",
            format!("flag '{raw}' must start with '+' or '-'"),
        ))
    }
}

/// Compute topology and model (`cpu`, `sockets`, `cores`, `vcpus`, `numa`,
/// `cpulimit`, `cpuunits`, `affinity` options).
///
/// Only `cores` and `sockets` can change while the guest runs, and only when
/// the hotplug set includes `cpu`; everything else needs a reboot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QemuCpu {
    /// Emulated model (`host`, `kvm64`, `x86-64-v2-AES`, …).
    pub model: Option<String>,
    pub sockets: Option<u8>,
    pub cores: Option<u8>,
    /// Hotplugged vcpu count; `Some(0)` removes the override.
    pub vcpus: Option<u16>,
    pub numa: Option<bool>,
    /// Feature flag set; sorted and de-duplicated on encode.
    pub flags: Vec<CpuFlag>,
    /// CPU time cap in whole cores; `Some(0)` removes the cap.
    pub limit: Option<u16>,
    /// Scheduler weight; `Some(0)` resets to the default.
    pub units: Option<u32>,
    /// Host core pin list, e.g. `0-3,8`; `Some("")` removes the pin.
    pub affinity: Option<String>,
}

impl QemuCpu {
    pub(crate) fn validate(&self, current: Option<&QemuCpu>) -> Result<(), ValidationError> {
        if current.is_none() && self.cores.is_none() {
            return Err(ValidationError::field(
                "cpu.cores",
                "required during creation",
            ));
        }
        if self.cores == Some(0) {
            return Err(ValidationError::field("cpu.cores", "must be at least 1"));
        }
        if self.sockets == Some(0) {
            return Err(ValidationError::field("cpu.sockets", "must be at least 1"));
        }
        if matches!(&self.model, Some(m) if m.is_empty()) {
            return Err(ValidationError::field("cpu.model", "may not be empty"));
        }
        if !self.flags.is_empty() && self.model.is_none() && current.and_then(|c| c.model.as_ref()).is_none() {
            return Err(ValidationError::field(
                "cpu.flags",
                "flags require a cpu model",
            ));
        }
        // Cap the hotplugged count at the configured topology.
        let cores = self.cores.or(current.and_then(|c| c.cores));
        let sockets = self.sockets.or(current.and_then(|c| c.sockets)).unwrap_or(1);
        if let (Some(vcpus), Some(cores)) = (self.vcpus, cores) {
            if vcpus as u32 > cores as u32 * sockets as u32 {
                return Err(ValidationError::field(
                    "cpu.vcpus",
                    "may not exceed cores * sockets",
                ));
            }
        }
        Ok(())
    }

    /// The `cpu` option value: model with the flag set appended.
    fn model_to_api(&self) -> Option<String> {
        let model = self.model.as_deref()?;
        if self.flags.is_empty() {
            return Some(model.to_string());
        }
        let mut flags: Vec<String> = self.flags.iter().map(CpuFlag::to_api).collect();
        flags.sort_unstable();
        flags.dedup();
        Some(format!("{model},flags={}", flags.join(";")))
    }

    pub(crate) fn map_to_api(
        &self,
        current: Option<&QemuCpu>,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) {
        let cur = |f: fn(&QemuCpu) -> Option<u64>| current.and_then(f);

        if let Some(value) = self.model_to_api() {
            let current_value = current.and_then(QemuCpu::model_to_api);
            if current_value.as_deref() != Some(value.as_str()) {
                params.insert("cpu".to_string(), value.into());
            }
        }
        if let Some(sockets) = self.sockets {
            if cur(|c| c.sockets.map(u64::from)) != Some(sockets as u64) {
                params.insert("sockets".to_string(), sockets.into());
            }
        }
        if let Some(cores) = self.cores {
            if cur(|c| c.cores.map(u64::from)) != Some(cores as u64) {
                params.insert("cores".to_string(), cores.into());
            }
        }
        match self.vcpus {
            Some(0) => {
                if current.map(|c| c.vcpus.is_some()).unwrap_or(false) {
                    deletes.push("vcpus");
                }
            }
            Some(vcpus) => {
                if cur(|c| c.vcpus.map(u64::from)) != Some(vcpus as u64) {
                    params.insert("vcpus".to_string(), vcpus.into());
                }
            }
            None => {}
        }
        if let Some(numa) = self.numa {
            if current.and_then(|c| c.numa) != Some(numa) {
                params.insert("numa".to_string(), u8::from(numa).into());
            }
        }
        match self.limit {
            Some(0) => {
                if current.map(|c| c.limit.is_some()).unwrap_or(false) {
                    deletes.push("cpulimit");
                }
            }
            Some(limit) => {
                if cur(|c| c.limit.map(u64::from)) != Some(limit as u64) {
                    params.insert("cpulimit".to_string(), limit.into());
                }
            }
            None => {}
        }
        match self.units {
            Some(0) => {
                if current.map(|c| c.units.is_some()).unwrap_or(false) {
                    deletes.push("cpuunits");
                }
            }
            Some(units) => {
                if cur(|c| c.units.map(u64::from)) != Some(units as u64) {
                    params.insert("cpuunits".to_string(), units.into());
                }
            }
            None => {}
        }
        match self.affinity.as_deref() {
            Some("") => {
                if current.map(|c| c.affinity.is_some()).unwrap_or(false) {
                    deletes.push("affinity");
                }
            }
            Some(affinity) => {
                if current.and_then(|c| c.affinity.as_deref()) != Some(affinity) {
                    params.insert("affinity".to_string(), affinity.into());
                }
            }
            None => {}
        }
    }

    /// Whether applying `self` on top of `current` forces a reboot.
    pub(crate) fn requires_reboot(&self, current: &QemuCpu, hotplug_cpu: bool) -> bool {
        let model_changed = self.model.is_some() && self.model != current.model;
        let flags_changed = self.model_to_api().is_some()
            && self.model_to_api() != current.model_to_api();
        let cold_field_changed = (self.vcpus.is_some() && self.vcpus != current.vcpus)
            || (self.numa.is_some() && self.numa != current.numa)
            || (self.limit.is_some() && self.limit != current.limit)
            || (self.units.is_some() && self.units != current.units)
            || (self.affinity.is_some() && self.affinity != current.affinity);
        let topology_changed = (self.cores.is_some() && self.cores != current.cores)
            || (self.sockets.is_some() && self.sockets != current.sockets);

        model_changed || flags_changed || cold_field_changed || (topology_changed && !hotplug_cpu)
    }

    pub(crate) fn map_to_struct(params: &Params) -> Option<QemuCpu> {
        let mut cpu = QemuCpu::default();
        let mut any = false;

        if let Some(raw) = params.get("cpu").map(value_to_string) {
            let mut tokens = raw.split(',');
            if let Some(first) = tokens.next() {
                // both `host` and `cputype=host` appear in the wild
                let model = first.strip_prefix("cputype=").unwrap_or(first);
                if !model.is_empty() {
                    cpu.model = Some(model.to_string());
                }
            }
            for token in tokens {
                if let Some(flags) = token.strip_prefix("flags=") {
                    cpu.flags = flags
                        .split(';')
                        .filter(|f| !f.is_empty())
                        .filter_map(|f| CpuFlag::parse(f).ok())
                        .collect();
                }
            }
            any = true;
        }
        if let Some(v) = params.get("sockets").and_then(value_to_u64) {
            cpu.sockets = Some(v as u8);
            any = true;
        }
        if let Some(v) = params.get("cores").and_then(value_to_u64) {
            cpu.cores = Some(v as u8);
            any = true;
        }
        if let Some(v) = params.get("vcpus").and_then(value_to_u64) {
            cpu.vcpus = Some(v as u16);
            any = true;
        }
        if let Some(v) = params.get("numa") {
            cpu.numa = Some(value_to_bool(v));
            any = true;
        }
        if let Some(v) = params.get("cpulimit").and_then(value_to_u64) {
            cpu.limit = Some(v as u16);
            any = true;
        }
        if let Some(v) = params.get("cpuunits").and_then(value_to_u64) {
            cpu.units = Some(v as u32);
            any = true;
        }
        if let Some(v) = params.get("affinity").map(value_to_string) {
            cpu.affinity = Some(v);
            any = true;
        }

        any.then_some(cpu)
    }
}
