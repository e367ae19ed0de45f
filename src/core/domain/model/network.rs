use std::collections::BTreeMap;

use rand::Rng;

use crate::core::domain::codec::{split_pair, sub_bool, DeleteList, DeviceString, Params};
use crate::core::domain::error::ValidationError;
use crate::core::domain::value_object::NetworkInterfaceId;

/// MAC assignment strategy for one NIC.
///
/// `Generated` keeps the address the guest already has, or draws a random
/// locally-administered one on first write. `Repeatable` derives the address
/// from `(vmid, nic id)` so repeated provisioning runs agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAddress {
    Generated,
    Repeatable,
    Fixed([u8; 6]),
}

/// OUI used for repeatable addresses.
const REPEATABLE_OUI: [u8; 3] = [0x00, 0x18, 0x59];

impl MacAddress {
    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "" => Ok(MacAddress::Generated),
            "repeatable" => Ok(MacAddress::Repeatable),
            _ => parse_mac(raw).map(MacAddress::Fixed).ok_or_else(|| {
                ValidationError::field("macaddr", format!("'{raw}' is not a MAC address"))
            }),
        }
    }

    /// Resolves the strategy to six concrete bytes.
    pub(crate) fn resolve(&self, vm_id: u32, nic_id: NetworkInterfaceId, current: Option<[u8; 6]>) -> [u8; 6] {
        match self {
            MacAddress::Fixed(mac) => *mac,
            MacAddress::Repeatable => {
                let pairing = (u64::from(vm_id) << 5) | u64::from(nic_id.value());
                [
                    REPEATABLE_OUI[0],
                    REPEATABLE_OUI[1],
                    REPEATABLE_OUI[2],
                    (pairing >> 16) as u8,
                    (pairing >> 8) as u8,
                    pairing as u8,
                ]
            }
            MacAddress::Generated => current.unwrap_or_else(|| {
                let mut mac: [u8; 6] = rand::thread_rng().gen();
                // locally administered, unicast
                mac[0] = (mac[0] | 2) & 0xfe;
                mac
            }),
        }
    }
}

pub(crate) fn parse_mac(raw: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = raw.split(':');
    for byte in &mut mac {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    parts.next().is_none().then_some(mac)
}

pub(crate) fn format_mac(mac: [u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// One virtual NIC (`netN` option).
#[derive(Debug, Clone, PartialEq)]
pub struct QemuNetworkInterface {
    /// Device model (`virtio`, `e1000`, `rtl8139`, `vmxnet3`, …).
    pub model: String,
    pub mac: MacAddress,
    /// Attached bridge; the `nat` pseudo-bridge is never written.
    pub bridge: Option<String>,
    /// VLAN tag.
    pub tag: Option<u16>,
    pub firewall: bool,
    pub link_down: bool,
    /// Rate limit in MB/s.
    pub rate: Option<f64>,
    pub mtu: Option<u16>,
    /// VirtIO multiqueue count.
    pub queues: Option<u8>,
    pub trailer: BTreeMap<String, String>,
}

impl QemuNetworkInterface {
    pub fn new(model: impl Into<String>, bridge: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            mac: MacAddress::Generated,
            bridge: Some(bridge.into()),
            tag: None,
            firewall: false,
            link_down: false,
            rate: None,
            mtu: None,
            queues: None,
            trailer: BTreeMap::new(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.model.is_empty() {
            return Err(ValidationError::field("net.model", "may not be empty"));
        }
        if let Some(tag) = self.tag {
            if !(1..=4094).contains(&tag) {
                return Err(ValidationError::field(
                    "net.tag",
                    "vlan tag must be in the range 1-4094",
                ));
            }
        }
        if matches!(self.queues, Some(q) if q > 64) {
            return Err(ValidationError::field("net.queues", "at most 64 queues"));
        }
        Ok(())
    }

    /// Encodes with a concrete MAC; the `model=MAC` token always comes
    /// first.
    pub(crate) fn to_api(&self, mac: [u8; 6]) -> String {
        let mut ds = DeviceString::new();
        ds.raw(format!("{}={}", self.model, format_mac(mac)));
        if let Some(bridge) = self.bridge.as_deref() {
            if bridge != "nat" {
                ds.pair("bridge", bridge);
            }
        }
        ds.opt("tag", self.tag)
            .flag("firewall", self.firewall)
            .flag("link_down", self.link_down)
            .opt("rate", self.rate)
            .opt("mtu", self.mtu)
            .opt("queues", self.queues)
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Result<Self, ValidationError> {
        let mut tokens = raw.split(',');
        let first = tokens.next().unwrap_or_default();
        let (model, mac_raw) = split_pair(first, '=');
        let mac = MacAddress::parse(mac_raw)?;

        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for token in tokens {
            let (k, v) = split_pair(token, '=');
            map.insert(k.to_string(), v.to_string());
        }

        let bridge = map.remove("bridge");
        let tag = map.remove("tag").and_then(|v| v.parse().ok());
        let firewall = map.remove("firewall").map(|v| sub_bool(&v)).unwrap_or(false);
        let link_down = map.remove("link_down").map(|v| sub_bool(&v)).unwrap_or(false);
        let rate = map.remove("rate").and_then(|v| v.parse().ok());
        let mtu = map.remove("mtu").and_then(|v| v.parse().ok());
        let queues = map.remove("queues").and_then(|v| v.parse().ok());

        Ok(Self {
            model: model.to_string(),
            mac,
            bridge,
            tag,
            firewall,
            link_down,
            rate,
            mtu,
            queues,
            trailer: map,
        })
    }

    fn fixed_mac(&self) -> Option<[u8; 6]> {
        match self.mac {
            MacAddress::Fixed(mac) => Some(mac),
            _ => None,
        }
    }
}

/// The guest's NICs, keyed by interface id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QemuNetworkInterfaces(pub BTreeMap<NetworkInterfaceId, QemuNetworkInterface>);

impl QemuNetworkInterfaces {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        for nic in self.0.values() {
            nic.validate()?;
        }
        Ok(())
    }

    /// Slot-by-slot diff. A desired NIC whose resolved encoding matches the
    /// current one is skipped; vanished NICs are deleted. Generated MACs are
    /// pinned to the current address so re-applying a config never reshuffles
    /// them.
    pub(crate) fn map_to_api(
        &self,
        current: Option<&QemuNetworkInterfaces>,
        vm_id: u32,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) {
        for (id, nic) in &self.0 {
            let current_nic = current.and_then(|c| c.0.get(id));
            let mac = nic
                .mac
                .resolve(vm_id, *id, current_nic.and_then(QemuNetworkInterface::fixed_mac));
            let encoded = nic.to_api(mac);
            let current_encoded =
                current_nic.and_then(|c| c.fixed_mac().map(|mac| c.to_api(mac)));
            if current_encoded.as_deref() != Some(encoded.as_str()) {
                params.insert(id.config_key(), encoded.into());
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
