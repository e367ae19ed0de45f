use std::collections::BTreeMap;

use crate::core::domain::codec::{parse_device, sub_bool, DeviceString};

/// QEMU guest agent settings (`agent` option).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QemuGuestAgent {
    pub enabled: bool,
    pub fstrim_cloned_disks: Option<bool>,
    pub agent_type: Option<String>,
    pub trailer: BTreeMap<String, String>,
}

impl QemuGuestAgent {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.raw(if self.enabled { "1" } else { "0" })
            .opt(
                "fstrim_cloned_disks",
                self.fstrim_cloned_disks.map(u8::from),
            )
            .opt("type", self.agent_type.as_deref())
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Self {
        let mut map = parse_device(raw, "enabled");
        let enabled = map.remove("enabled").map(|v| sub_bool(&v)).unwrap_or(false);
        let fstrim_cloned_disks = map.remove("fstrim_cloned_disks").map(|v| sub_bool(&v));
        let agent_type = map.remove("type");
        Self {
            enabled,
            fstrim_cloned_disks,
            agent_type,
            trailer: map,
        }
    }
}
