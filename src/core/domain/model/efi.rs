use std::collections::BTreeMap;

use crate::core::domain::codec::{parse_device, split_pair, sub_bool, DeviceString};
use crate::core::domain::error::ValidationError;
use crate::core::domain::value_object::DiskSize;

/// OVMF variable store format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfiType {
    Small, // 2m
    Large, // 4m
}

impl EfiType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            EfiType::Small => "2m",
            EfiType::Large => "4m",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "2m" => Ok(EfiType::Small),
            "4m" => Ok(EfiType::Large),
            _ => Err(ValidationError::field(
                "efidisk0.efitype",
                format!("unknown efi type '{raw}'"),
            )),
        }
    }
}

/// The OVMF variable store (`efidisk0`). Written with the literal size-one
/// placeholder `<storage>:1`; the node picks the real size. Any change
/// requires a reboot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EfiDisk {
    pub storage: String,
    pub efitype: Option<EfiType>,
    pub pre_enrolled_keys: Option<bool>,
    /// Backing volume, present once materialized. Server-assigned.
    pub volume: Option<String>,
    /// Server-reported size; never sent back.
    pub size: Option<DiskSize>,
    pub trailer: BTreeMap<String, String>,
}

impl EfiDisk {
    pub fn new(storage: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            efitype: None,
            pre_enrolled_keys: None,
            volume: None,
            size: None,
            trailer: BTreeMap::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.storage.is_empty() {
            return Err(ValidationError::field("efidisk0.storage", "may not be empty"));
        }
        Ok(())
    }

    /// True when the managed attributes differ; server-assigned fields do
    /// not participate.
    pub(crate) fn differs(&self, current: &EfiDisk) -> bool {
        self.storage != current.storage
            || self.efitype != current.efitype
            || self.pre_enrolled_keys != current.pre_enrolled_keys
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.raw(format!("{}:1", self.storage))
            .opt("efitype", self.efitype.map(|t| t.as_str()))
            .opt("pre-enrolled-keys", self.pre_enrolled_keys.map(u8::from))
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Result<Self, ValidationError> {
        let mut map = parse_device(raw, "volume");
        let volume = map.remove("volume").unwrap_or_default();
        let (storage, _file) = split_pair(&volume, ':');
        let efitype = map.remove("efitype").map(|v| EfiType::parse(&v)).transpose()?;
        let pre_enrolled_keys = map.remove("pre-enrolled-keys").map(|v| sub_bool(&v));
        let size = map.remove("size").map(|v| DiskSize::parse(&v)).transpose()?;
        Ok(Self {
            storage: storage.to_string(),
            efitype,
            pre_enrolled_keys,
            volume: Some(volume.clone()),
            size,
            trailer: map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_encoding() {
        let efi = EfiDisk {
            storage: "local-lvm".to_string(),
            efitype: Some(EfiType::Large),
            pre_enrolled_keys: Some(false),
            volume: None,
            size: None,
            trailer: BTreeMap::new(),
        };
        assert_eq!(efi.to_api(), "local-lvm:1,efitype=4m,pre-enrolled-keys=0");
    }

    #[test]
    fn test_decode_materialized() {
        let efi =
            EfiDisk::from_api("local:100/vm-100-disk-1.qcow2,efitype=4m,size=528K").unwrap();
        assert_eq!(efi.storage, "local");
        assert_eq!(efi.efitype, Some(EfiType::Large));
        assert_eq!(efi.volume.as_deref(), Some("local:100/vm-100-disk-1.qcow2"));
        assert_eq!(efi.size, Some(DiskSize::parse("528K").unwrap()));
    }

    #[test]
    fn test_differs_ignores_server_fields() {
        let mut desired = EfiDisk::new("local");
        desired.efitype = Some(EfiType::Large);
        let mut current = desired.clone();
        current.volume = Some("local:100/vm-100-disk-1.qcow2".to_string());
        current.size = Some(DiskSize::parse("528K").unwrap());
        assert!(!desired.differs(&current));

        current.storage = "ceph-rbd".to_string();
        assert!(desired.differs(&current));
    }
}
