//! The differential state machine that drives a desired [`VmConfig`] into a
//! guest: side-operations first (moves, resizes, pre-PUT deletes,
//! migration), then the main config PUT, then the conditional reboot and the
//! post-processing (pool membership, HA).

use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::core::domain::codec::{DeleteList, Params};
use crate::core::domain::error::{ProxmoxError, ProxmoxResult};
use crate::core::domain::model::{DiskChanges, QemuStorage, TpmChange, VmConfig, VmRef};
use crate::ProxmoxClient;

/// Delay between config refresh attempts while the guest is locked.
pub(crate) const LOCK_RETRY_DELAY: Duration = Duration::from_secs(8);
/// Refresh attempts beyond the first while the guest is locked.
pub(crate) const LOCK_RETRIES: u32 = 3;

/// One reconcile invocation. Owns nothing; borrows the client and the
/// caller's `VmRef` exclusively for the duration of the call.
pub(crate) struct ReconcileService<'a> {
    client: &'a ProxmoxClient,
}

impl<'a> ReconcileService<'a> {
    pub(crate) fn new(client: &'a ProxmoxClient) -> Self {
        Self { client }
    }

    /// Create path: validates, encodes against an empty current state and
    /// POSTs, then post-processes (template disk grow, pool, permission
    /// cache, HA).
    pub(crate) async fn create(&self, desired: &VmConfig, vmr: &mut VmRef) -> ProxmoxResult<()> {
        let mut desired = desired.clone();
        desired.set_vm_ref(vmr);
        desired.normalize();
        desired.validate(None)?;
        let version = self.client.version().await?;

        let (_, params) = desired.map_to_api(None, version)?;
        info!(vm_id = %vmr.vm_id(), node = %vmr.node(), "creating guest");
        self.client.create_vm_raw(vmr.node().as_str(), &params).await?;

        self.resize_new_disks(vmr, &desired, None).await?;
        if let Some(pool) = &desired.pool {
            self.client.add_vm_to_pool(pool, vmr.vm_id()).await?;
            vmr.set_pool(Some(pool.clone()));
        }
        self.client
            .api()
            .insert_cached_permission(format!("/vms/{}", vmr.vm_id()))
            .await;

        self.apply_ha(vmr, &desired).await
    }

    /// Update path, steps (a)–(j) in order: disk change classes, moves,
    /// resizes, pre-PUT deletes, reboot gate, migration, main PUT,
    /// post-resize, pool membership, start/reboot, HA.
    pub(crate) async fn update(
        &self,
        desired: &VmConfig,
        reboot_if_needed: bool,
        vmr: &mut VmRef,
    ) -> ProxmoxResult<bool> {
        let mut desired = desired.clone();
        desired.set_vm_ref(vmr);
        desired.normalize();
        let version = self.client.version().await?;
        let mut current = self.refresh_config(vmr).await?;
        desired.validate(Some(&current))?;

        let mut stopped = false;

        // (a) classify disk changes
        let changes = match (&desired.disks, &current.disks) {
            (Some(d), Some(c)) => d.mark_changes(c),
            _ => DiskChanges::default(),
        };

        // (b) moves are async tasks; completion is awaited per move
        for mv in &changes.moves {
            info!(slot = %mv.slot, target = %mv.target_storage, "moving disk");
            self.client
                .move_disk(
                    vmr,
                    &mv.slot.to_string(),
                    &mv.target_storage,
                    mv.format.map(|f| f.as_str()),
                    mv.delete_source,
                )
                .await?;
        }

        // (c) pure growth via the resize endpoint
        for resize in &changes.resizes {
            info!(slot = %resize.slot, growth = %resize.growth, "resizing disk");
            self.client
                .resize_disk(vmr, &resize.slot.to_string(), &resize.growth)
                .await?;
        }

        // (d) items that must vanish before they can be recreated
        let mut pre_delete = DeleteList::new();
        pre_delete.extend(changes.cloud_init_removes);
        if let (Some(tpm), Some(current_tpm)) = (&desired.tpm, current.tpm.clone()) {
            match tpm.mark_changes(&current_tpm) {
                TpmChange::Recreate => {
                    pre_delete.push("tpmstate0");
                    current.tpm = None;
                }
                TpmChange::Move { target_storage } => {
                    info!(target = %target_storage, "moving tpm state");
                    self.client
                        .move_disk(vmr, "tpmstate0", &target_storage, None, true)
                        .await?;
                }
                TpmChange::None => {}
            }
        }

        let mut reboot_required = false;
        if !pre_delete.is_empty() {
            debug!(delete = %pre_delete.to_param(), "pre-PUT delete");
            let mut params = Params::new();
            pre_delete.apply(&mut params);
            self.client.put_config(vmr, &params).await?;
            // deleting these items can itself stage pending changes
            reboot_required = self.client.guest_has_pending_changes(vmr).await?;
        }

        // moves change the backing volume; the diff below needs fresh state
        if !changes.moves.is_empty() {
            current = self.refresh_config(vmr).await?;
        }

        // local reboot verdict, computed before anything irreversible
        let (needs_reboot, params) = desired.map_to_api(Some(&current), version)?;
        reboot_required |= needs_reboot;

        // (e) reboot gate
        if reboot_required {
            if reboot_if_needed {
                info!(vm_id = %vmr.vm_id(), "shutting guest down to apply changes");
                self.shutdown_guest(vmr).await?;
                stopped = true;
                reboot_required = false;
            } else {
                return Err(ProxmoxError::UnableToUpdateWithoutReboot);
            }
        }

        // (f) cross-node migration
        if let Some(desired_node) = desired.node.clone() {
            if Some(&desired_node) != current.node.as_ref() {
                info!(from = ?current.node, to = %desired_node, "migrating guest");
                self.client.migrate_vm(vmr, &desired_node, true).await?;
                vmr.set_node(desired_node);
            }
        }

        // (g) main config PUT
        if !params.is_empty() {
            debug!(?params, "writing config");
            self.client.put_config(vmr, &params).await?;
        }

        if !stopped {
            // the server's pending-change report is authoritative
            reboot_required = self.client.guest_has_pending_changes(vmr).await?;
        }

        // (h) disks the PUT created at template-default size
        self.resize_new_disks(vmr, &desired, Some(&current)).await?;

        // (i) pool membership, remove-then-add
        if let Some(pool) = &desired.pool {
            if current.pool.as_ref() != Some(pool) {
                if let Some(old_pool) = &current.pool {
                    self.client.remove_vm_from_pool(old_pool, vmr.vm_id()).await?;
                }
                self.client.add_vm_to_pool(pool, vmr.vm_id()).await?;
                vmr.set_pool(Some(pool.clone()));
            }
        }

        // (j) bring the guest back
        if stopped {
            info!(vm_id = %vmr.vm_id(), "starting guest");
            self.client.start_vm(vmr).await?;
            reboot_required = false;
        } else if reboot_required {
            if reboot_if_needed {
                info!(vm_id = %vmr.vm_id(), "rebooting guest to apply pending changes");
                self.client.reboot_vm(vmr).await?;
                reboot_required = false;
            } else {
                // the PUT is already applied; the caller decides when to reboot
                self.apply_ha(vmr, &desired).await?;
                return Ok(true);
            }
        }

        self.apply_ha(vmr, &desired).await?;
        Ok(reboot_required)
    }

    /// Clone path: full or linked clone of `source` into `vmr`, optionally
    /// into a target storage and pool.
    pub(crate) async fn clone(
        &self,
        desired: &VmConfig,
        source: &VmRef,
        vmr: &VmRef,
    ) -> ProxmoxResult<()> {
        let full = desired.full_clone.unwrap_or(true);
        let mut params = Params::new();
        params.insert("newid".to_string(), vmr.vm_id().value().into());
        params.insert("target".to_string(), vmr.node().as_str().into());
        params.insert("full".to_string(), u8::from(full).into());
        if let Some(name) = &desired.name {
            params.insert("name".to_string(), name.as_str().into());
        }
        if let Some(pool) = vmr.pool() {
            params.insert("pool".to_string(), pool.as_str().into());
        }
        if full {
            let storage = desired.clone_storage.clone().or_else(|| {
                desired.disks.as_ref().and_then(|disks| {
                    disks.iter().find_map(|(_, device)| match device {
                        QemuStorage::Disk(disk) => Some(disk.storage.clone()),
                        _ => None,
                    })
                })
            });
            if let Some(storage) = storage {
                params.insert("storage".to_string(), storage.into());
            }
        }
        info!(source = %source.vm_id(), new = %vmr.vm_id(), full, "cloning guest");
        self.client.clone_vm_raw(source, &params).await
    }

    /// Refresh-with-lock: reads `status/current` first and only fetches the
    /// config once no lock is reported, retrying up to [`LOCK_RETRIES`]
    /// times with [`LOCK_RETRY_DELAY`] pauses.
    pub(crate) async fn refresh_config(&self, vmr: &mut VmRef) -> ProxmoxResult<VmConfig> {
        for attempt in 0..=LOCK_RETRIES {
            let status = self.client.vm_status(vmr).await?;
            match status.lock.as_deref().filter(|l| !l.is_empty()) {
                None => {
                    let params = self.client.vm_config_params(vmr).await?;
                    let mut config = VmConfig::map_to_struct(Some(vmr), &params)?;
                    config.apply_defaults();
                    self.read_ha_and_pool(vmr, &mut config).await?;
                    return Ok(config);
                }
                Some(lock) if attempt < LOCK_RETRIES => {
                    debug!(lock, attempt, "guest is locked, retrying");
                    sleep(LOCK_RETRY_DELAY).await;
                }
                Some(lock) => {
                    return Err(ProxmoxError::VmLocked {
                        vm_id: vmr.vm_id().value(),
                        lock: lock.to_string(),
                    })
                }
            }
        }
        unreachable!("loop returns on the last attempt");
    }

    /// HA state and pool membership live outside the config response.
    async fn read_ha_and_pool(
        &self,
        vmr: &mut VmRef,
        config: &mut VmConfig,
    ) -> ProxmoxResult<()> {
        let guests = self.client.cluster_guests().await?;
        if let Some(row) = guests.iter().find(|g| g.vmid == vmr.vm_id().value()) {
            if let Some(hastate) = row.hastate.as_deref() {
                config.ha_state = crate::HaState::parse(hastate).ok();
            }
            if let Some(pool) = row.pool.as_deref().filter(|p| !p.is_empty()) {
                let pool = crate::PoolName::new(pool)?;
                config.pool = Some(pool.clone());
                vmr.set_pool(Some(pool));
            }
        }
        Ok(())
    }

    /// Graceful shutdown with forced-stop fallback, then wait until the
    /// guest reports `stopped`.
    async fn shutdown_guest(&self, vmr: &VmRef) -> ProxmoxResult<()> {
        self.client.shutdown_vm(vmr, true).await?;
        self.client.wait_for_shutdown(vmr).await
    }

    /// Grows disks the create/clone/PUT just materialized smaller than
    /// requested (e.g. written over a template disk).
    async fn resize_new_disks(
        &self,
        vmr: &mut VmRef,
        desired: &VmConfig,
        current_before: Option<&VmConfig>,
    ) -> ProxmoxResult<()> {
        let Some(desired_disks) = &desired.disks else {
            return Ok(());
        };
        let new_disks: Vec<_> = desired_disks
            .iter()
            .filter(|(slot, device)| {
                matches!(device, QemuStorage::Disk(_))
                    && current_before
                        .and_then(|c| c.disks.as_ref())
                        .and_then(|d| d.get(*slot))
                        .is_none()
            })
            .collect();
        if new_disks.is_empty() {
            return Ok(());
        }

        let live = self.refresh_config(vmr).await?;
        for (slot, device) in new_disks {
            let QemuStorage::Disk(disk) = device else {
                continue;
            };
            let Some(QemuStorage::Disk(live_disk)) =
                live.disks.as_ref().and_then(|d| d.get(slot))
            else {
                continue;
            };
            if let Some(growth) = disk.size.growth_from(live_disk.size) {
                info!(slot = %slot, growth = %growth, "growing freshly created disk");
                self.client
                    .resize_disk(vmr, &slot.to_string(), &growth)
                    .await?;
            }
        }
        Ok(())
    }

    /// Writes HA group/state at the end of every reconcile.
    async fn apply_ha(&self, vmr: &VmRef, desired: &VmConfig) -> ProxmoxResult<()> {
        let Some(state) = desired.ha_state else {
            return Ok(());
        };
        let sid = format!("vm:{}", vmr.vm_id());
        let mut body = json!({ "state": state.as_str() });
        if let Some(group) = &desired.ha_group {
            body["group"] = json!(group);
        }
        debug!(%sid, state = state.as_str(), "applying ha");
        match self
            .client
            .api()
            .put::<_, Option<serde_json::Value>>(&format!("cluster/ha/resources/{sid}"), &body)
            .await
        {
            Ok(_) => Ok(()),
            Err(ProxmoxError::NotFound(_)) => {
                body["sid"] = json!(sid);
                self.client
                    .api()
                    .post::<_, Option<serde_json::Value>>("cluster/ha/resources", &body)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}
