use std::collections::BTreeMap;

use lazy_static::lazy_static;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;
use tracing::warn;

use crate::core::domain::codec::{
    diff_opt_str, parse_device, value_to_bool, value_to_string, DeleteList, DeviceString, Params,
};
use crate::core::domain::error::ValidationError;
use crate::core::domain::model::version::Version;
use crate::core::domain::value_object::NetworkInterfaceId;

lazy_static! {
    static ref RX_IPCONFIG: Regex = Regex::new(r"^ipconfig(\d+)$").unwrap();
}

/// Per-NIC cloud-init address assignment (`ipconfigN` option).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudInitIpConfig {
    /// IPv4 CIDR or `dhcp`.
    pub ip4: Option<String>,
    pub gw4: Option<String>,
    /// IPv6 CIDR, `dhcp` or `auto`.
    pub ip6: Option<String>,
    pub gw6: Option<String>,
    pub trailer: BTreeMap<String, String>,
}

impl CloudInitIpConfig {
    pub fn dhcp() -> Self {
        Self {
            ip4: Some("dhcp".to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.opt("ip", self.ip4.as_deref())
            .opt("gw", self.gw4.as_deref())
            .opt("ip6", self.ip6.as_deref())
            .opt("gw6", self.gw6.as_deref())
            .trailer(&self.trailer);
        ds.finish()
    }

    pub(crate) fn from_api(raw: &str) -> Self {
        let mut map = parse_device(raw, "ip");
        Self {
            ip4: map.remove("ip"),
            gw4: map.remove("gw"),
            ip6: map.remove("ip6"),
            gw6: map.remove("gw6"),
            trailer: map,
        }
    }
}

/// Cloud-init settings pushed into the generated config drive. Changing any
/// of these rebuilds the drive on the next reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudInit {
    /// `ciuser`; `Some("")` removes the override.
    pub user: Option<String>,
    /// `cipassword`. The API only ever returns a mask, so a set password is
    /// always written.
    pub password: Option<String>,
    /// `cicustom` snippet references.
    pub custom: Option<String>,
    /// `nameserver`, space-separated addresses.
    pub dns_servers: Option<String>,
    /// `searchdomain`.
    pub search_domain: Option<String>,
    /// `sshkeys`, stored verbatim and percent-encoded on the wire.
    pub ssh_keys: Option<String>,
    /// `ciupgrade` (package upgrade on first boot); only encoded on PVE 8+.
    pub upgrade: Option<bool>,
    pub ip_configs: BTreeMap<NetworkInterfaceId, CloudInitIpConfig>,
}

impl CloudInit {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if let Some(custom) = &self.custom {
            if custom.contains(char::is_whitespace) {
                return Err(ValidationError::field(
                    "cicustom",
                    "snippet references may not contain whitespace",
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn map_to_api(
        &self,
        current: Option<&CloudInit>,
        version: Version,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) {
        diff_opt_str(
            "ciuser",
            self.user.as_deref(),
            current.and_then(|c| c.user.as_deref()),
            params,
            deletes,
        );
        // The mask never equals the desired value; write unconditionally.
        match self.password.as_deref() {
            Some("") => {
                if current.map(|c| c.password.is_some()).unwrap_or(false) {
                    deletes.push("cipassword");
                }
            }
            Some(password) => {
                params.insert("cipassword".to_string(), password.into());
            }
            None => {}
        }
        diff_opt_str(
            "cicustom",
            self.custom.as_deref(),
            current.and_then(|c| c.custom.as_deref()),
            params,
            deletes,
        );
        diff_opt_str(
            "nameserver",
            self.dns_servers.as_deref(),
            current.and_then(|c| c.dns_servers.as_deref()),
            params,
            deletes,
        );
        diff_opt_str(
            "searchdomain",
            self.search_domain.as_deref(),
            current.and_then(|c| c.search_domain.as_deref()),
            params,
            deletes,
        );
        match self.ssh_keys.as_deref() {
            Some("") => {
                if current.map(|c| c.ssh_keys.is_some()).unwrap_or(false) {
                    deletes.push("sshkeys");
                }
            }
            Some(keys) => {
                if current.and_then(|c| c.ssh_keys.as_deref()) != Some(keys) {
                    let encoded = utf8_percent_encode(keys, NON_ALPHANUMERIC).to_string();
                    params.insert("sshkeys".to_string(), encoded.into());
                }
            }
            None => {}
        }
        if let Some(upgrade) = self.upgrade {
            if version.supports_ci_upgrade() {
                if current.and_then(|c| c.upgrade) != Some(upgrade) {
                    params.insert("ciupgrade".to_string(), u8::from(upgrade).into());
                }
            } else {
                warn!(%version, "ciupgrade is not supported before PVE 8, skipping");
            }
        }

        for (id, ip_config) in &self.ip_configs {
            let key = format!("ipconfig{id}");
            let encoded = ip_config.to_api();
            let current_encoded = current
                .and_then(|c| c.ip_configs.get(id))
                .map(CloudInitIpConfig::to_api);
            if encoded.is_empty() {
                if current_encoded.is_some() {
                    deletes.push(key);
                }
            } else if current_encoded.as_deref() != Some(encoded.as_str()) {
                params.insert(key, encoded.into());
            }
        }
        if let Some(current) = current {
            for id in current.ip_configs.keys() {
                if !self.ip_configs.contains_key(id) {
                    deletes.push(format!("ipconfig{id}"));
                }
            }
        }
    }

    pub(crate) fn map_to_struct(params: &Params) -> Option<CloudInit> {
        let mut ci = CloudInit::default();
        let mut any = false;

        if let Some(v) = params.get("ciuser").map(value_to_string) {
            ci.user = Some(v);
            any = true;
        }
        if let Some(v) = params.get("cipassword").map(value_to_string) {
            ci.password = Some(v);
            any = true;
        }
        if let Some(v) = params.get("cicustom").map(value_to_string) {
            ci.custom = Some(v);
            any = true;
        }
        if let Some(v) = params.get("nameserver").map(value_to_string) {
            ci.dns_servers = Some(v);
            any = true;
        }
        if let Some(v) = params.get("searchdomain").map(value_to_string) {
            ci.search_domain = Some(v);
            any = true;
        }
        if let Some(v) = params.get("sshkeys").map(value_to_string) {
            let decoded = percent_decode_str(&v)
                .decode_utf8()
                .map(|c| c.into_owned())
                .unwrap_or(v);
            ci.ssh_keys = Some(decoded);
            any = true;
        }
        if let Some(v) = params.get("ciupgrade") {
            ci.upgrade = Some(value_to_bool(v));
            any = true;
        }
        for (key, value) in params {
            if let Some(caps) = RX_IPCONFIG.captures(key) {
                let id: u8 = match caps[1].parse() {
                    Ok(id) if id <= 31 => id,
                    _ => continue,
                };
                ci.ip_configs.insert(
                    NetworkInterfaceId::new_unchecked(id),
                    CloudInitIpConfig::from_api(&value_to_string(value)),
                );
                any = true;
            }
        }

        any.then_some(ci)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v8() -> Version {
        Version::new(8, 1, 4)
    }

    #[test]
    fn test_ipconfig_round_trip() {
        let ip = CloudInitIpConfig {
            ip4: Some("192.168.1.10/24".to_string()),
            gw4: Some("192.168.1.1".to_string()),
            ip6: None,
            gw6: None,
            trailer: BTreeMap::new(),
        };
        let encoded = ip.to_api();
        assert_eq!(encoded, "ip=192.168.1.10/24,gw=192.168.1.1");
        assert_eq!(CloudInitIpConfig::from_api(&encoded), ip);
    }

    #[test]
    fn test_ssh_keys_percent_encoded() {
        let ci = CloudInit {
            ssh_keys: Some("ssh-ed25519 AAAA test@host".to_string()),
            ..Default::default()
        };
        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        ci.map_to_api(None, v8(), &mut params, &mut deletes);
        let wire = params["sshkeys"].as_str().unwrap();
        assert!(!wire.contains(' '), "spaces must be escaped: {wire}");
        assert!(wire.contains("%20"));

        let mut decoded = Params::new();
        decoded.insert("sshkeys".to_string(), wire.into());
        let back = CloudInit::map_to_struct(&decoded).unwrap();
        assert_eq!(back.ssh_keys, ci.ssh_keys);
    }

    #[test]
    fn test_password_always_written() {
        let current = CloudInit {
            password: Some("**********".to_string()),
            ..Default::default()
        };
        let desired = CloudInit {
            password: Some("s3cret".to_string()),
            ..Default::default()
        };
        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        desired.map_to_api(Some(&current), v8(), &mut params, &mut deletes);
        assert_eq!(params["cipassword"], "s3cret");
    }

    #[test]
    fn test_empty_user_deletes() {
        let current = CloudInit {
            user: Some("ubuntu".to_string()),
            ..Default::default()
        };
        let desired = CloudInit {
            user: Some(String::new()),
            ..Default::default()
        };
        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        desired.map_to_api(Some(&current), v8(), &mut params, &mut deletes);
        assert!(params.is_empty());
        assert_eq!(deletes.to_param(), "ciuser");
    }

    #[test]
    fn test_upgrade_gated_on_version() {
        let ci = CloudInit {
            upgrade: Some(true),
            ..Default::default()
        };
        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        ci.map_to_api(None, Version::new(7, 4, 0), &mut params, &mut deletes);
        assert!(!params.contains_key("ciupgrade"));

        ci.map_to_api(None, v8(), &mut params, &mut deletes);
        assert_eq!(params["ciupgrade"], 1);
    }

    #[test]
    fn test_vanished_ipconfig_deleted() {
        let mut current = CloudInit::default();
        current
            .ip_configs
            .insert(NetworkInterfaceId::new_unchecked(0), CloudInitIpConfig::dhcp());
        let desired = CloudInit::default();
        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        desired.map_to_api(Some(&current), v8(), &mut params, &mut deletes);
        assert_eq!(deletes.to_param(), "ipconfig0");
    }

    #[test]
    fn test_idempotent_against_self() {
        let mut ci = CloudInit {
            user: Some("ubuntu".to_string()),
            dns_servers: Some("1.1.1.1".to_string()),
            upgrade: Some(true),
            ..Default::default()
        };
        ci.ip_configs
            .insert(NetworkInterfaceId::new_unchecked(0), CloudInitIpConfig::dhcp());

        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        ci.map_to_api(Some(&ci.clone()), v8(), &mut params, &mut deletes);
        assert!(params.is_empty());
        assert!(deletes.is_empty());
    }
}
