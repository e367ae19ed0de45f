use std::collections::BTreeMap;

use crate::core::domain::codec::{parse_device, sub_bool, DeleteList, DeviceString, Params};
use crate::core::domain::error::{ProxmoxResult, ValidationError};

pub(crate) fn validate_usb_id(id: u8) -> Result<(), ValidationError> {
    if id > 13 {
        return Err(ValidationError::field("usb id", "must be in the range 0-13"));
    }
    Ok(())
}

/// Index of a USB passthrough slot (`usb0` …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsbId(u8);

impl UsbId {
    pub fn new(id: u8) -> ProxmoxResult<Self> {
        validate_usb_id(id)?;
        Ok(Self(id))
    }

    pub(crate) fn new_unchecked(id: u8) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub(crate) fn config_key(&self) -> String {
        format!("usb{}", self.0)
    }
}

/// One USB device mapping: `host=<vendor:product|bus-port|spice>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuUsb {
    pub host: String,
    pub usb3: bool,
    pub trailer: BTreeMap<String, String>,
}

impl QemuUsb {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            usb3: false,
            trailer: BTreeMap::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::field("usb.host", "may not be empty"));
        }
        Ok(())
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.pair("host", &self.host)
            .flag("usb3", self.usb3)
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Self {
        let mut map = parse_device(raw, "host");
        let host = map.remove("host").unwrap_or_default();
        let usb3 = map.remove("usb3").map(|v| sub_bool(&v)).unwrap_or(false);
        Self {
            host,
            usb3,
            trailer: map,
        }
    }
}

/// USB passthrough devices by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QemuUsbs(pub BTreeMap<UsbId, QemuUsb>);

impl QemuUsbs {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        for usb in self.0.values() {
            usb.validate()?;
        }
        Ok(())
    }

    pub(crate) fn map_to_api(
        &self,
        current: Option<&QemuUsbs>,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) {
        for (id, usb) in &self.0 {
            let unchanged = current
                .and_then(|c| c.0.get(id))
                .map(|c| c == usb)
                .unwrap_or(false);
            if !unchanged {
                params.insert(id.config_key(), usb.to_api().into());
            }
        }
        if let Some(current) = current {
            for id in current.0.keys() {
                if !self.0.contains_key(id) {
                    deletes.push(id.config_key());
                }
            }
        }
    }
}
