use std::collections::BTreeMap;

use crate::core::domain::codec::{DeleteList, Params};
use crate::core::domain::error::{ProxmoxResult, ValidationError};

pub(crate) fn validate_serial_id(id: u8) -> Result<(), ValidationError> {
    if id > 3 {
        return Err(ValidationError::field(
            "serial id",
            "must be in the range 0-3",
        ));
    }
    Ok(())
}

/// Index of a serial port (`serial0` … `serial3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerialId(u8);

impl SerialId {
    pub fn new(id: u8) -> ProxmoxResult<Self> {
        validate_serial_id(id)?;
        Ok(Self(id))
    }

    pub(crate) fn new_unchecked(id: u8) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub(crate) fn config_key(&self) -> String {
        format!("serial{}", self.0)
    }
}

/// One serial port: either a unix socket created by PVE or a host device
/// passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialInterface {
    Socket,
    Device(String),
}

impl SerialInterface {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if let SerialInterface::Device(path) = self {
            if !path.starts_with("/dev/") {
                return Err(ValidationError::field(
                    "serial",
                    "host device path must start with /dev/",
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn to_api(&self) -> String {
        match self {
            SerialInterface::Socket => "socket".to_string(),
            SerialInterface::Device(path) => path.clone(),
        }
    }

    pub(crate) fn from_api(raw: &str) -> Self {
        if raw == "socket" {
            SerialInterface::Socket
        } else {
            SerialInterface::Device(raw.to_string())
        }
    }
}

/// The guest's serial ports, keyed by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialInterfaces(pub BTreeMap<SerialId, SerialInterface>);

impl SerialInterfaces {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        for port in self.0.values() {
            port.validate()?;
        }
        Ok(())
    }

    /// Slot-by-slot diff against the current state: changed or new ports are
    /// written, vanished ports are deleted.
    pub(crate) fn map_to_api(
        &self,
        current: Option<&SerialInterfaces>,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) {
        for (id, port) in &self.0 {
            let unchanged = current
                .and_then(|c| c.0.get(id))
                .map(|c| c == port)
                .unwrap_or(false);
            if !unchanged {
                params.insert(id.config_key(), port.to_api().into());
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
