use std::collections::BTreeMap;

use crate::core::domain::codec::{parse_device, split_pair, DeviceString};
use crate::core::domain::error::ValidationError;

/// TPM specification version of the emulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmVersion {
    V1_2,
    V2_0,
}

impl TpmVersion {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            TpmVersion::V1_2 => "v1.2",
            TpmVersion::V2_0 => "v2.0",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "v1.2" => Ok(TpmVersion::V1_2),
            "v2.0" => Ok(TpmVersion::V2_0),
            _ => Err(ValidationError::field(
                "tpmstate0.version",
                format!("unknown tpm version '{raw}'"),
            )),
        }
    }
}

/// How an existing TPM state must be touched before the main config PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmChange {
    /// Nothing to do ahead of the PUT.
    None,
    /// The version changed; the state must be deleted first and is recreated
    /// by the PUT.
    Recreate,
    /// Only the storage changed; the backing volume is moved.
    Move { target_storage: String },
}

/// The TPM state volume (`tpmstate0`). Like the EFI vars it is created via
/// the `<storage>:1` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmState {
    pub storage: String,
    pub version: TpmVersion,
    /// Backing volume, present once materialized. Server-assigned.
    pub volume: Option<String>,
    pub trailer: BTreeMap<String, String>,
}

impl TpmState {
    pub fn new(storage: impl Into<String>, version: TpmVersion) -> Self {
        Self {
            storage: storage.into(),
            version,
            volume: None,
            trailer: BTreeMap::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.storage.is_empty() {
            return Err(ValidationError::field(
                "tpmstate0.storage",
                "may not be empty",
            ));
        }
        Ok(())
    }

    /// A version change forces delete-then-recreate; a storage change alone
    /// is an online volume move.
    pub(crate) fn mark_changes(&self, current: &TpmState) -> TpmChange {
        if self.version != current.version {
            TpmChange::Recreate
        } else if self.storage != current.storage {
            TpmChange::Move {
                target_storage: self.storage.clone(),
            }
        } else {
            TpmChange::None
        }
    }

    pub(crate) fn differs(&self, current: &TpmState) -> bool {
        self.storage != current.storage || self.version != current.version
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.raw(format!("{}:1", self.storage))
            .pair("version", self.version.as_str())
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Result<Self, ValidationError> {
        let mut map = parse_device(raw, "volume");
        let volume = map.remove("volume").unwrap_or_default();
        let (storage, _file) = split_pair(&volume, ':');
        let version = TpmVersion::parse(&map.remove("version").unwrap_or_default())?;
        map.remove("size"); // server-reported, never sent back
        Ok(Self {
            storage: storage.to_string(),
            version,
            volume: Some(volume.clone()),
            trailer: map,
        })
    }
}
