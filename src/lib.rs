//! A typed Rust client for the Proxmox VE API, centered on a differential
//! QEMU configuration reconciler.
//!
//! The crate drives the guest lifecycle end to end: create, reconfigure,
//! clone and migrate. Reconfiguration is expressed as a desired
//! [`VmConfig`]; the reconciler fetches the live state, diffs the two and
//! issues the minimal sequence of API mutations, honoring PVE's rules about
//! which changes apply live and which require a reboot.
//!
//! # Example
//!
//! ```no_run
//! use pve_qemu_client::{ProxmoxClient, ProxmoxResult, VmConfig, VmRef};
//! use pve_qemu_client::{NodeName, QemuCpu, QemuMemory, VmId};
//!
//! #[tokio::main]
//! async fn main() -> ProxmoxResult<()> {
//!     let client = ProxmoxClient::builder()
//!         .host("192.168.1.10")?
//!         .api_token("deploy@pve!ci=12345678-9abc-def0-1234-56789abcdef0")?
//!         .accept_invalid_certs(true)
//!         .build()
//!         .await?;
//!
//!     let mut vmr = VmRef::new(VmId::new(100)?, NodeName::new("pve1")?);
//!     let desired = VmConfig {
//!         name: Some("web-01".into()),
//!         cpu: Some(QemuCpu { cores: Some(4), ..Default::default() }),
//!         memory: Some(QemuMemory::with_size(4096)),
//!         ..Default::default()
//!     };
//!     let reboot_still_required = client.update_qemu(&desired, true, &mut vmr).await?;
//!     assert!(!reboot_still_required);
//!     Ok(())
//! }
//! ```

mod auth;
mod core;

#[cfg(test)]
mod tests;

pub use crate::core::domain::error::{ProxmoxError, ProxmoxResult, ValidationError};
pub use crate::core::domain::model::{
    Bios, CloudInit, CloudInitDrive, CloudInitIpConfig, CpuFlag, DiskAio, DiskBus, DiskCache,
    DiskFormat, DiskSlot, EfiDisk, EfiType, GuestResource, HaState, HostPci, Hotplug, IsoFile,
    MacAddress, PciId, PendingChange, PoolRow, ProxmoxAuth, ProxmoxConnection, QemuCdRom, QemuCpu,
    QemuDisk, QemuGuestAgent, QemuMemory, QemuNetworkInterface, QemuNetworkInterfaces,
    QemuPciDevices, QemuStorage, QemuStorages, QemuUsb, QemuUsbs, QemuVga, RngSource, SerialId,
    SerialInterface, SerialInterfaces, TpmState, TpmVersion, UnusedDisk, UsbId, Version,
    VirtioRng, VmConfig, VmRef, VmStatusCurrent,
};
pub use crate::core::domain::value_object::{
    DiskSize, Machine, NetworkInterfaceId, NodeName, PoolName, ProxmoxApiToken, ProxmoxCsrfToken,
    ProxmoxHost, ProxmoxPassword, ProxmoxPort, ProxmoxRealm, ProxmoxTicket, ProxmoxUrl,
    ProxmoxUsername, Tag, VmId,
};
pub use crate::core::infrastructure::api_client::{ApiClient, ClientConfig, RateLimitConfig};

use crate::auth::application::service::login_service::LoginService;
use crate::core::application::service::monitor_service::MonitorService;
use crate::core::application::service::reconcile_service::ReconcileService;
use crate::core::domain::codec::Params;
use crate::core::domain::model::VersionInfo;
use crate::core::infrastructure::tasks;

/// High-level client for one PVE cluster endpoint.
///
/// Cheap endpoint wrappers live directly on this type; the multi-step flows
/// (create, update, clone) delegate to the reconciler. Reconciles of
/// different guests may run concurrently on one client; two reconciles of
/// the same guest are only serialized by the remote lock and surface as
/// retryable [`ProxmoxError::VmLocked`] errors.
#[derive(Debug)]
pub struct ProxmoxClient {
    pub(crate) api_client: ApiClient,
}

/// Builder for a properly configured [`ProxmoxClient`].
#[derive(Debug, Default)]
pub struct ProxmoxClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    realm: Option<String>,
    api_token: Option<String>,
    secure: bool,
    accept_invalid_certs: bool,
    config: ClientConfig,
}

impl ProxmoxClientBuilder {
    /// Sets the PVE host address (IP or hostname).
    pub fn host(mut self, host: impl Into<String>) -> ProxmoxResult<Self> {
        let host = host.into();
        ProxmoxHost::new(host.clone())?;
        self.host = Some(host);
        Ok(self)
    }

    /// Sets the API port (default 8006).
    pub fn port(mut self, port: u16) -> ProxmoxResult<Self> {
        ProxmoxPort::new(port)?;
        self.port = Some(port);
        Ok(self)
    }

    /// Sets ticket-login credentials. Password strength is validated; for
    /// unattended use prefer [`ProxmoxClientBuilder::api_token`].
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> ProxmoxResult<Self> {
        let username = username.into();
        let password = password.into();
        let realm = realm.into();
        ProxmoxUsername::new(username.clone())?;
        ProxmoxPassword::new(password.clone())?;
        ProxmoxRealm::new(realm.clone())?;
        self.username = Some(username);
        self.password = Some(password);
        self.realm = Some(realm);
        Ok(self)
    }

    /// Sets a static API token (`user@realm!tokenid=uuid`); no login flow or
    /// CSRF token is needed then.
    pub fn api_token(mut self, token: impl Into<String>) -> ProxmoxResult<Self> {
        let token = token.into();
        ProxmoxApiToken::new(token.clone())?;
        self.api_token = Some(token);
        Ok(self)
    }

    /// TLS on/off; turning it off also accepts invalid certificates.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        if !secure {
            self.accept_invalid_certs = true;
        }
        self
    }

    /// Accept self-signed certificates; common on lab clusters.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Client-side request rate limiting.
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(rate_limit);
        self
    }

    /// Per-request deadline.
    pub fn request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub async fn build(self) -> ProxmoxResult<ProxmoxClient> {
        let host = ProxmoxHost::new(self.host.ok_or_else(|| {
            ProxmoxError::Validation(ValidationError::field("host", "host is required"))
        })?)?;
        let port = ProxmoxPort::new(self.port.unwrap_or(ProxmoxPort::DEFAULT))?;
        let url = ProxmoxUrl::new(&host, port, self.secure)?;

        let username = self.username.map(ProxmoxUsername::new).transpose()?;
        let password = self.password.map(ProxmoxPassword::new).transpose()?;
        let realm = self.realm.map(ProxmoxRealm::new).transpose()?;
        let connection = ProxmoxConnection::new(
            host,
            port,
            username,
            password,
            realm,
            self.secure,
            self.accept_invalid_certs,
            url,
        );

        let api_client = ApiClient::new(connection, self.config)?;
        if let Some(token) = self.api_token {
            api_client.set_token(ProxmoxApiToken::new(token)?).await;
        }
        Ok(ProxmoxClient { api_client })
    }
}

impl ProxmoxClient {
    pub fn builder() -> ProxmoxClientBuilder {
        ProxmoxClientBuilder::default()
    }

    pub(crate) fn api(&self) -> &ApiClient {
        &self.api_client
    }

    /// Authenticates with the configured credentials and stores the ticket.
    /// Not needed for API-token clients.
    pub async fn login(&self) -> ProxmoxResult<()> {
        let auth = LoginService::new().execute(self.api_client.connection()).await?;
        self.api_client.set_auth(auth).await;
        Ok(())
    }

    /// Drops the session and purges the permission cache.
    pub async fn logout(&self) {
        self.api_client.logout().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.api_client.is_authenticated().await
    }

    /// The current ticket, when authenticated via login.
    pub async fn auth_token(&self) -> Option<ProxmoxTicket> {
        self.api_client.ticket_auth().await.map(|a| a.ticket().clone())
    }

    /// The CSRF token paired with the ticket, when present.
    pub async fn csrf_token(&self) -> Option<ProxmoxCsrfToken> {
        self.api_client
            .ticket_auth()
            .await
            .and_then(|a| a.csrf_token().cloned())
    }

    /// Cluster version; attribute encoding branches on it.
    pub async fn version(&self) -> ProxmoxResult<Version> {
        let info: VersionInfo = self.api_client.get("version").await?;
        Version::parse(&info.version)
    }

    // --- guest state ---------------------------------------------------

    /// `GET …/status/current`.
    pub async fn vm_status(&self, vmr: &VmRef) -> ProxmoxResult<VmStatusCurrent> {
        self.api_client
            .get(&format!("{}/status/current", vmr.qemu_path()))
            .await
    }

    /// Raw config parameter map.
    pub(crate) async fn vm_config_params(&self, vmr: &VmRef) -> ProxmoxResult<Params> {
        self.api_client
            .get(&format!("{}/config", vmr.qemu_path()))
            .await
    }

    /// Decoded current config, with defaults applied and HA/pool state
    /// merged in. Retries while the guest is locked (three retries, eight
    /// seconds apart) before failing with [`ProxmoxError::VmLocked`].
    pub async fn current_config(&self, vmr: &mut VmRef) -> ProxmoxResult<VmConfig> {
        ReconcileService::new(self).refresh_config(vmr).await
    }

    /// `GET …/pending`.
    pub async fn pending_changes(&self, vmr: &VmRef) -> ProxmoxResult<Vec<PendingChange>> {
        self.api_client
            .get(&format!("{}/pending", vmr.qemu_path()))
            .await
    }

    /// Whether any staged change awaits the next restart.
    pub async fn guest_has_pending_changes(&self, vmr: &VmRef) -> ProxmoxResult<bool> {
        Ok(self
            .pending_changes(vmr)
            .await?
            .iter()
            .any(PendingChange::is_pending))
    }

    // --- power ---------------------------------------------------------

    pub async fn start_vm(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        self.power_op(vmr, "start", serde_json::json!({})).await
    }

    pub async fn stop_vm(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        self.power_op(vmr, "stop", serde_json::json!({})).await
    }

    /// Graceful shutdown; with `force_stop` the guest is hard-stopped when
    /// the shutdown times out.
    pub async fn shutdown_vm(&self, vmr: &VmRef, force_stop: bool) -> ProxmoxResult<()> {
        self.power_op(
            vmr,
            "shutdown",
            serde_json::json!({ "forceStop": u8::from(force_stop) }),
        )
        .await
    }

    pub async fn reboot_vm(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        self.power_op(vmr, "reboot", serde_json::json!({})).await
    }

    pub async fn reset_vm(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        self.power_op(vmr, "reset", serde_json::json!({})).await
    }

    async fn power_op(
        &self,
        vmr: &VmRef,
        op: &str,
        body: serde_json::Value,
    ) -> ProxmoxResult<()> {
        let upid: Option<String> = self
            .api_client
            .post(&format!("{}/status/{op}", vmr.qemu_path()), &body)
            .await?;
        self.wait_task(vmr.node().as_str(), upid).await
    }

    /// Polls until the guest reports `stopped` (5 s cadence, ~8 min
    /// ceiling). Useful while an ISO install finishes.
    pub async fn wait_for_shutdown(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        MonitorService::new(self).wait_for_shutdown(vmr).await
    }

    /// Deletes the guest, optionally purging it from backup jobs and HA.
    pub async fn delete_vm(&self, vmr: &VmRef, purge: bool) -> ProxmoxResult<()> {
        let upid: Option<String> = self
            .api_client
            .delete(&format!("{}?purge={}", vmr.qemu_path(), u8::from(purge)))
            .await?;
        self.wait_task(vmr.node().as_str(), upid).await
    }

    // --- config mutation ------------------------------------------------

    /// `PUT …/config`; when the node answers with a UPID the task is awaited.
    pub(crate) async fn put_config(&self, vmr: &VmRef, params: &Params) -> ProxmoxResult<()> {
        let upid: Option<String> = self
            .api_client
            .put(&format!("{}/config", vmr.qemu_path()), params)
            .await?;
        self.wait_task(vmr.node().as_str(), upid).await
    }

    pub(crate) async fn create_vm_raw(&self, node: &str, params: &Params) -> ProxmoxResult<()> {
        let upid: Option<String> = self
            .api_client
            .post(&format!("nodes/{node}/qemu"), params)
            .await?;
        self.wait_task(node, upid).await
    }

    pub(crate) async fn clone_vm_raw(&self, source: &VmRef, params: &Params) -> ProxmoxResult<()> {
        let upid: Option<String> = self
            .api_client
            .post(&format!("{}/clone", source.qemu_path()), params)
            .await?;
        self.wait_task(source.node().as_str(), upid).await
    }

    /// Grows a disk: `disk` is the slot key (`scsi0`), `size` the `+NG`
    /// delta.
    pub async fn resize_disk(&self, vmr: &VmRef, disk: &str, size: &str) -> ProxmoxResult<()> {
        let upid: Option<String> = self
            .api_client
            .post(
                &format!("{}/resize", vmr.qemu_path()),
                &serde_json::json!({ "disk": disk, "size": size }),
            )
            .await?;
        self.wait_task(vmr.node().as_str(), upid).await
    }

    /// Moves a disk volume to another storage, optionally converting its
    /// format.
    pub(crate) async fn move_disk(
        &self,
        vmr: &VmRef,
        disk: &str,
        storage: &str,
        format: Option<&str>,
        delete_source: bool,
    ) -> ProxmoxResult<()> {
        let mut body = serde_json::json!({
            "disk": disk,
            "storage": storage,
            "delete": u8::from(delete_source),
        });
        if let Some(format) = format {
            body["format"] = serde_json::json!(format);
        }
        let upid: Option<String> = self
            .api_client
            .post(&format!("{}/move_disk", vmr.qemu_path()), &body)
            .await?;
        self.wait_task(vmr.node().as_str(), upid).await
    }

    /// Migrates the guest to another node and waits for the task. The
    /// caller's `VmRef` still points at the source node afterwards.
    pub async fn migrate_vm(
        &self,
        vmr: &VmRef,
        target: &NodeName,
        online: bool,
    ) -> ProxmoxResult<()> {
        let upid: Option<String> = self
            .api_client
            .post(
                &format!("{}/migrate", vmr.qemu_path()),
                &serde_json::json!({ "target": target.as_str(), "online": u8::from(online) }),
            )
            .await?;
        self.wait_task(vmr.node().as_str(), upid).await
    }

    // --- cluster, pools ------------------------------------------------

    /// All guests in the cluster (`/cluster/resources?type=vm`).
    pub async fn cluster_guests(&self) -> ProxmoxResult<Vec<GuestResource>> {
        self.api_client.get("cluster/resources?type=vm").await
    }

    /// Highest vmid in use, floored at 100.
    pub async fn max_vm_id(&self) -> ProxmoxResult<u32> {
        let guests = self.cluster_guests().await?;
        Ok(guests.iter().map(|g| g.vmid).fold(100, u32::max))
    }

    /// All resource pools (`/pools`).
    pub async fn pools(&self) -> ProxmoxResult<Vec<PoolRow>> {
        self.api_client.get("pools").await
    }

    pub async fn add_vm_to_pool(&self, pool: &PoolName, vm_id: VmId) -> ProxmoxResult<()> {
        self.api_client
            .put::<_, Option<serde_json::Value>>(
                &format!("pools/{pool}"),
                &serde_json::json!({ "vms": vm_id.to_string() }),
            )
            .await
            .map(|_| ())
    }

    pub async fn remove_vm_from_pool(&self, pool: &PoolName, vm_id: VmId) -> ProxmoxResult<()> {
        self.api_client
            .put::<_, Option<serde_json::Value>>(
                &format!("pools/{pool}"),
                &serde_json::json!({ "vms": vm_id.to_string(), "delete": 1 }),
            )
            .await
            .map(|_| ())
    }

    // --- monitor -------------------------------------------------------

    /// Runs a raw QEMU monitor command and returns its output.
    pub async fn monitor_cmd(
        &self,
        vmr: &VmRef,
        command: &str,
    ) -> ProxmoxResult<serde_json::Value> {
        self.api_client
            .post(
                &format!("{}/monitor", vmr.qemu_path()),
                &serde_json::json!({ "command": command }),
            )
            .await
    }

    /// Types a string into the guest console via `sendkey`.
    pub async fn send_key_string(&self, vmr: &VmRef, keys: &str) -> ProxmoxResult<()> {
        MonitorService::new(self).send_key_string(vmr, keys).await
    }

    /// Forwards host port `22000 + vmid` to the guest's port 22 through a
    /// user-net device; returns the host port.
    pub async fn ssh_forward_usernet(&self, vmr: &VmRef) -> ProxmoxResult<String> {
        MonitorService::new(self).ssh_forward_usernet(vmr).await
    }

    pub async fn remove_ssh_forward_usernet(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        MonitorService::new(self).remove_ssh_forward_usernet(vmr).await
    }

    // --- lifecycle -----------------------------------------------------

    /// Creates the guest described by `config`. `cpu` and `memory` are
    /// required here; everything else falls back to PVE defaults.
    pub async fn create_qemu(&self, config: &VmConfig, vmr: &mut VmRef) -> ProxmoxResult<()> {
        ReconcileService::new(self).create(config, vmr).await
    }

    /// Reconciles the guest towards `config`. Returns whether a reboot is
    /// still required after the call; with `reboot_if_needed` the reconciler
    /// performs the reboot itself. When a reboot would be needed up front
    /// and `reboot_if_needed` is false, no config change is written and
    /// [`ProxmoxError::UnableToUpdateWithoutReboot`] is returned.
    pub async fn update_qemu(
        &self,
        config: &VmConfig,
        reboot_if_needed: bool,
        vmr: &mut VmRef,
    ) -> ProxmoxResult<bool> {
        ReconcileService::new(self)
            .update(config, reboot_if_needed, vmr)
            .await
    }

    /// Clones `source` into the guest addressed by `vmr` (full clone unless
    /// `config.full_clone` says otherwise), then leaves further shaping to
    /// [`ProxmoxClient::update_qemu`].
    pub async fn clone_qemu(
        &self,
        config: &VmConfig,
        source: &VmRef,
        vmr: &VmRef,
    ) -> ProxmoxResult<()> {
        ReconcileService::new(self).clone(config, source, vmr).await
    }

    async fn wait_task(&self, node: &str, upid: Option<String>) -> ProxmoxResult<()> {
        match upid {
            Some(upid) if upid.starts_with("UPID") => {
                tasks::wait_for_completion(&self.api_client, node, &upid).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
