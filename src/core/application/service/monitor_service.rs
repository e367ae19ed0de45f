//! QEMU monitor utilities: keystroke injection and user-net SSH forwarding.
//! Both require a running guest.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::core::domain::error::{ProxmoxError, ProxmoxResult};
use crate::core::domain::model::VmRef;
use crate::ProxmoxClient;

/// Pause between keystrokes; works around QEMU monitor backpressure.
const KEY_DELAY: Duration = Duration::from_millis(1);

/// Poll cadence while waiting for a guest to power off.
pub(crate) const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Poll ceiling, roughly eight minutes.
pub(crate) const SHUTDOWN_POLL_LIMIT: u32 = 100;

pub(crate) struct MonitorService<'a> {
    client: &'a ProxmoxClient,
}

impl<'a> MonitorService<'a> {
    pub(crate) fn new(client: &'a ProxmoxClient) -> Self {
        Self { client }
    }

    async fn ensure_running(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        let status = self.client.vm_status(vmr).await?;
        if !status.is_running() {
            return Err(ProxmoxError::Conflict(format!(
                "vm {} must be running first",
                vmr.vm_id()
            )));
        }
        Ok(())
    }

    /// Polls `status/current` until the guest reports `stopped`, up to
    /// [`SHUTDOWN_POLL_LIMIT`] rounds.
    pub(crate) async fn wait_for_shutdown(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        for _ in 0..SHUTDOWN_POLL_LIMIT {
            let status = self.client.vm_status(vmr).await?;
            if status.is_stopped() {
                return Ok(());
            }
            sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
        Err(ProxmoxError::Transport(format!(
            "vm {} not shut down within wait time",
            vmr.vm_id()
        )))
    }

    /// Types a string into the guest console via `sendkey`, one key at a
    /// time with US-layout shift mapping.
    pub(crate) async fn send_key_string(&self, vmr: &VmRef, keys: &str) -> ProxmoxResult<()> {
        self.ensure_running(vmr).await?;
        for ch in keys.chars() {
            let key = map_key(ch);
            debug!(%key, "sendkey");
            self.client.monitor_cmd(vmr, &format!("sendkey {key}")).await?;
            sleep(KEY_DELAY).await;
        }
        Ok(())
    }

    /// Adds a user-net device forwarding host port `22000 + vmid` to guest
    /// port 22. The create/config API cannot express usernet devices, hence
    /// the monitor.
    pub(crate) async fn ssh_forward_usernet(&self, vmr: &VmRef) -> ProxmoxResult<String> {
        self.ensure_running(vmr).await?;
        let ssh_port = (vmr.vm_id().value() + 22000).to_string();
        self.client
            .monitor_cmd(
                vmr,
                &format!("netdev_add user,id=net1,hostfwd=tcp::{ssh_port}-:22"),
            )
            .await?;
        self.client
            .monitor_cmd(vmr, "device_add virtio-net-pci,id=net1,netdev=net1,addr=0x13")
            .await?;
        Ok(ssh_port)
    }

    /// Tears the user-net forward down again.
    pub(crate) async fn remove_ssh_forward_usernet(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        self.ensure_running(vmr).await?;
        self.client.monitor_cmd(vmr, "device_del net1").await?;
        self.client.monitor_cmd(vmr, "netdev_del net1").await?;
        Ok(())
    }
}

/// Maps a character onto a QEMU `sendkey` name.
fn map_key(ch: char) -> String {
    if ch.is_ascii_uppercase() {
        return format!("shift-{}", ch.to_ascii_lowercase());
    }
    match ch {
        '!' => "shift-1".to_string(),
        '@' => "shift-2".to_string(),
        '#' => "shift-3".to_string(),
        '$' => "shift-4".to_string(),
        '%' => "shift-5".to_string(),
        '^' => "shift-6".to_string(),
        '&' => "shift-7".to_string(),
        '*' => "shift-8".to_string(),
        '(' => "shift-9".to_string(),
        ')' => "shift-0".to_string(),
        '_' => "shift-minus".to_string(),
        '+' => "shift-equal".to_string(),
        '?' => "shift-slash".to_string(),
        ' ' => "spc".to_string(),
        '/' => "slash".to_string(),
        '\\' => "backslash".to_string(),
        ',' => "comma".to_string(),
        '-' => "minus".to_string(),
        '=' => "equal".to_string(),
        '.' => "dot".to_string(),
        other => other.to_string(),
    }
}
