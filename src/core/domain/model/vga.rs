use std::collections::BTreeMap;

use crate::core::domain::codec::{parse_device, DeviceString};

/// Display adapter settings (`vga` option).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QemuVga {
    /// Adapter model (`std`, `qxl`, `virtio`, `serial0`, …).
    pub kind: String,
    /// Display memory in MiB.
    pub memory: Option<u16>,
    pub trailer: BTreeMap<String, String>,
}

impl QemuVga {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            memory: None,
            trailer: BTreeMap::new(),
        }
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.raw(&self.kind)
            .opt("memory", self.memory)
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Self {
        let mut map = parse_device(raw, "type");
        // `vga: type=qxl` and `vga: qxl` are the same thing
        let kind = map.remove("type").unwrap_or_default();
        let memory = map.remove("memory").and_then(|v| v.parse().ok());
        Self {
            kind,
            memory,
            trailer: map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let vga = QemuVga {
            kind: "qxl".to_string(),
            memory: Some(32),
            trailer: BTreeMap::new(),
        };
        let encoded = vga.to_api();
        assert_eq!(encoded, "qxl,memory=32");
        assert_eq!(QemuVga::from_api(&encoded), vga);
    }

    #[test]
    fn test_bare_and_keyed_forms_decode_alike() {
        assert_eq!(QemuVga::from_api("std"), QemuVga::from_api("type=std"));
    }
}
