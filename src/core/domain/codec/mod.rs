//! The flat PVE parameter micro-format.
//!
//! Device-bearing options encode as a single string value of the form
//! `token0,key1=v1,key2=v2,…` where `token0` may be a bare value (a volume,
//! `model=MAC`, `host=…`). The helpers here are shared by every device
//! family; the per-family field lists live next to the entities.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde_json::Value;

/// Parameter map as sent to / received from the API. A `BTreeMap` keeps the
/// encode order deterministic, which the round-trip tests rely on.
pub type Params = BTreeMap<String, Value>;

/// Splits a `key<sep>value` pair. When the separator is absent the whole
/// input is the key and the value is empty.
pub(crate) fn split_pair(conf: &str, sep: char) -> (&str, &str) {
    match conf.split_once(sep) {
        Some((k, v)) => (k, v),
        None => (conf, ""),
    }
}

/// Parses a device string into its key/value pairs. A token without `=`
/// (conventionally the first) is stored under `bare_key`.
pub(crate) fn parse_device(value: &str, bare_key: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for token in value.split(',') {
        if token.is_empty() {
            continue;
        }
        if token.contains('=') {
            let (k, v) = split_pair(token, '=');
            map.insert(k.to_string(), v.to_string());
        } else {
            map.insert(bare_key.to_string(), token.to_string());
        }
    }
    map
}

/// Builder for one device string. Field order is the caller's; the trailer
/// of unknown keys is appended last so round-trips are stable.
#[derive(Debug, Default)]
pub(crate) struct DeviceString {
    parts: Vec<String>,
}

impl DeviceString {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a bare token (volume, `model=MAC`, `host=…`).
    pub(crate) fn raw(&mut self, token: impl Into<String>) -> &mut Self {
        self.parts.push(token.into());
        self
    }

    /// Appends `key=value` unconditionally.
    pub(crate) fn pair(&mut self, key: &str, value: impl Display) -> &mut Self {
        self.parts.push(format!("{key}={value}"));
        self
    }

    /// Appends `key=value` when the option is set.
    pub(crate) fn opt(&mut self, key: &str, value: Option<impl Display>) -> &mut Self {
        if let Some(v) = value {
            self.pair(key, v);
        }
        self
    }

    /// Appends `key=1` when the flag is raised; a lowered flag is the PVE
    /// default and is omitted.
    pub(crate) fn flag(&mut self, key: &str, value: bool) -> &mut Self {
        if value {
            self.pair(key, 1);
        }
        self
    }

    /// Appends `key=0` when the flag is lowered; used for options that PVE
    /// defaults to on (`backup`, `rombar`).
    pub(crate) fn flag_off(&mut self, key: &str, value: bool) -> &mut Self {
        if !value {
            self.pair(key, 0);
        }
        self
    }

    /// Appends the preserved unknown keys of a decoded device.
    pub(crate) fn trailer(&mut self, trailer: &BTreeMap<String, String>) -> &mut Self {
        for (k, v) in trailer {
            self.pair(k, v);
        }
        self
    }

    pub(crate) fn finish(&self) -> String {
        self.parts.join(",")
    }
}

/// Accumulates config field names to be removed; emitted as the single
/// comma-separated `delete` parameter alongside a PUT.
#[derive(Debug, Default)]
pub struct DeleteList {
    items: Vec<String>,
}

impl DeleteList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.items.contains(&name) {
            self.items.push(name);
        }
    }

    pub fn extend(&mut self, other: DeleteList) {
        for item in other.items {
            self.push(item);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Joins the accumulated names for the `delete` parameter.
    pub fn to_param(&self) -> String {
        self.items.join(",")
    }

    /// Inserts the `delete` key into `params` when any name was collected.
    pub fn apply(&self, params: &mut Params) {
        if !self.is_empty() {
            params.insert("delete".to_string(), Value::from(self.to_param()));
        }
    }
}

/// Three-state diff for an optional string option: absent means untouched,
/// present-and-empty means delete (when the server has the field), present
/// means write-if-different. Returns whether anything was emitted.
pub(crate) fn diff_opt_str(
    key: &str,
    desired: Option<&str>,
    current: Option<&str>,
    params: &mut Params,
    deletes: &mut DeleteList,
) -> bool {
    match desired {
        None => false,
        Some("") => {
            if current.is_some() {
                deletes.push(key);
                true
            } else {
                false
            }
        }
        Some(value) => {
            if current != Some(value) {
                params.insert(key.to_string(), Value::from(value));
                true
            } else {
                false
            }
        }
    }
}

/// Diff for an optional boolean option; booleans have no empty state, so a
/// present value is written as `0`/`1` whenever it differs.
pub(crate) fn diff_opt_bool(
    key: &str,
    desired: Option<bool>,
    current: Option<bool>,
    params: &mut Params,
) -> bool {
    match desired {
        Some(value) if current != Some(value) => {
            params.insert(key.to_string(), Value::from(api_bool(value)));
            true
        }
        _ => false,
    }
}

/// Booleans travel as `0`/`1` on the wire.
pub(crate) fn api_bool(value: bool) -> u8 {
    u8::from(value)
}

/// Reads a scalar out of a JSON response value. The API is inconsistent
/// about numbers vs. numeric strings, so both are accepted.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s == "1",
        _ => false,
    }
}

pub(crate) fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Lenient sub-value boolean: `1` is true, anything else false.
pub(crate) fn sub_bool(value: &str) -> bool {
    value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_with_bare_token() {
        let map = parse_device("local-lvm:vm-100-disk-0,size=32G,ssd=1", "volume");
        assert_eq!(map["volume"], "local-lvm:vm-100-disk-0");
        assert_eq!(map["size"], "32G");
        assert_eq!(map["ssd"], "1");
    }

    #[test]
    fn test_parse_device_pairs_only() {
        let map = parse_device("source=/dev/urandom,max_bytes=1024", "source");
        assert_eq!(map["source"], "/dev/urandom");
        assert_eq!(map["max_bytes"], "1024");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_split_pair_without_separator() {
        assert_eq!(split_pair("socket", '='), ("socket", ""));
    }

    #[test]
    fn test_device_string_order_and_flags() {
        let mut ds = DeviceString::new();
        ds.raw("virtio=AA:BB:CC:DD:EE:FF")
            .pair("bridge", "vmbr0")
            .flag("firewall", true)
            .flag("link_down", false)
            .opt("mtu", Some(1400u16))
            .opt("rate", None::<u64>);
        assert_eq!(
            ds.finish(),
            "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0,firewall=1,mtu=1400"
        );
    }

    #[test]
    fn test_device_string_flag_off() {
        let mut ds = DeviceString::new();
        ds.raw("local:10").flag_off("backup", false);
        assert_eq!(ds.finish(), "local:10,backup=0");

        let mut ds = DeviceString::new();
        ds.raw("local:10").flag_off("backup", true);
        assert_eq!(ds.finish(), "local:10");
    }

    #[test]
    fn test_delete_list_dedup_and_apply() {
        let mut deletes = DeleteList::new();
        deletes.push("ide2");
        deletes.push("tpmstate0");
        deletes.push("ide2");
        assert_eq!(deletes.to_param(), "ide2,tpmstate0");

        let mut params = Params::new();
        deletes.apply(&mut params);
        assert_eq!(params["delete"], Value::from("ide2,tpmstate0"));
    }

    #[test]
    fn test_value_coercions() {
        assert!(value_to_bool(&Value::from(1)));
        assert!(value_to_bool(&Value::from("1")));
        assert!(!value_to_bool(&Value::from(0)));
        assert_eq!(value_to_u64(&Value::from("2048")), Some(2048));
        assert_eq!(value_to_string(&Value::from(4096)), "4096");
    }
}
