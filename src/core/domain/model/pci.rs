use std::collections::BTreeMap;

use crate::core::domain::codec::{parse_device, sub_bool, DeleteList, DeviceString, Params};
use crate::core::domain::error::{ProxmoxResult, ValidationError};

pub(crate) fn validate_pci_id(id: u8) -> Result<(), ValidationError> {
    if id > 15 {
        return Err(ValidationError::field(
            "hostpci id",
            "must be in the range 0-15",
        ));
    }
    Ok(())
}

/// Index of a PCI passthrough slot (`hostpci0` …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PciId(u8);

impl PciId {
    pub fn new(id: u8) -> ProxmoxResult<Self> {
        validate_pci_id(id)?;
        Ok(Self(id))
    }

    pub(crate) fn new_unchecked(id: u8) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub(crate) fn config_key(&self) -> String {
        format!("hostpci{}", self.0)
    }
}

/// One PCI passthrough mapping. Any change here requires a cold restart of
/// the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPci {
    /// Host address (`0000:01:00.0`) or mapping id.
    pub host: String,
    pub pcie: bool,
    /// Option ROM visibility; PVE default is on.
    pub rombar: bool,
    pub x_vga: bool,
    /// Mediated device type (e.g. vGPU profiles).
    pub mdev: Option<String>,
    pub trailer: BTreeMap<String, String>,
}

impl HostPci {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            pcie: false,
            rombar: true,
            x_vga: false,
            mdev: None,
            trailer: BTreeMap::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::field("hostpci.host", "may not be empty"));
        }
        Ok(())
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.pair("host", &self.host)
            .flag("pcie", self.pcie)
            .flag_off("rombar", self.rombar)
            .flag("x-vga", self.x_vga)
            .opt("mdev", self.mdev.as_deref())
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Self {
        let mut map = parse_device(raw, "host");
        let host = map.remove("host").unwrap_or_default();
        let pcie = map.remove("pcie").map(|v| sub_bool(&v)).unwrap_or(false);
        let rombar = map.remove("rombar").map(|v| sub_bool(&v)).unwrap_or(true);
        let x_vga = map.remove("x-vga").map(|v| sub_bool(&v)).unwrap_or(false);
        let mdev = map.remove("mdev");
        Self {
            host,
            pcie,
            rombar,
            x_vga,
            mdev,
            trailer: map,
        }
    }
}

/// PCI passthrough devices by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QemuPciDevices(pub BTreeMap<PciId, HostPci>);

impl QemuPciDevices {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        for pci in self.0.values() {
            pci.validate()?;
        }
        Ok(())
    }

    /// Returns whether anything changed; PCI changes always force a reboot.
    pub(crate) fn map_to_api(
        &self,
        current: Option<&QemuPciDevices>,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) -> bool {
        let mut changed = false;
        for (id, pci) in &self.0 {
            let unchanged = current
                .and_then(|c| c.0.get(id))
                .map(|c| c == pci)
                .unwrap_or(false);
            if !unchanged {
                params.insert(id.config_key(), pci.to_api().into());
                changed = true;
            }
        }
        if let Some(current) = current {
            for id in current.0.keys() {
                if !self.0.contains_key(id) {
                    deletes.push(id.config_key());
                    changed = true;
                }
            }
        }
        changed
    }
}
