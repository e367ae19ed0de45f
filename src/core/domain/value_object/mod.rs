mod api_token;
mod disk_size;
mod machine;
mod network_interface_id;
mod node_name;
mod pool_name;
mod proxmox_csrf_token;
mod proxmox_host;
mod proxmox_password;
mod proxmox_port;
mod proxmox_realm;
mod proxmox_ticket;
mod proxmox_uri;
mod proxmox_username;
mod tag;
mod vm_id;

pub use api_token::ProxmoxApiToken;
pub use disk_size::DiskSize;
pub use machine::Machine;
pub use network_interface_id::NetworkInterfaceId;
pub use node_name::NodeName;
pub use pool_name::PoolName;
pub use proxmox_csrf_token::ProxmoxCsrfToken;
pub use proxmox_host::ProxmoxHost;
pub use proxmox_password::ProxmoxPassword;
pub use proxmox_port::ProxmoxPort;
pub use proxmox_realm::ProxmoxRealm;
pub use proxmox_ticket::ProxmoxTicket;
pub use proxmox_uri::ProxmoxUrl;
pub use proxmox_username::ProxmoxUsername;
pub use tag::Tag;
pub use vm_id::VmId;

pub(crate) use disk_size::validate_disk_size;
