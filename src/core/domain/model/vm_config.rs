use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::domain::codec::{
    diff_opt_bool, diff_opt_str, value_to_bool, value_to_string, DeleteList, Params,
};
use crate::core::domain::error::{ProxmoxResult, ValidationError};
use crate::core::domain::model::agent::QemuGuestAgent;
use crate::core::domain::model::cloud_init::CloudInit;
use crate::core::domain::model::cpu::QemuCpu;
use crate::core::domain::model::efi::EfiDisk;
use crate::core::domain::model::ha::HaState;
use crate::core::domain::model::hotplug::Hotplug;
use crate::core::domain::model::memory::QemuMemory;
use crate::core::domain::model::network::{QemuNetworkInterface, QemuNetworkInterfaces};
use crate::core::domain::model::pci::{HostPci, PciId, QemuPciDevices};
use crate::core::domain::model::rng::VirtioRng;
use crate::core::domain::model::serial::{SerialId, SerialInterface, SerialInterfaces};
use crate::core::domain::model::storage::{
    DiskBus, DiskSlot, IsoFile, QemuCdRom, QemuStorage, QemuStorages, UnusedDisk,
};
use crate::core::domain::model::tpm::TpmState;
use crate::core::domain::model::usb::{QemuUsb, QemuUsbs, UsbId};
use crate::core::domain::model::version::Version;
use crate::core::domain::model::vga::QemuVga;
use crate::core::domain::model::vm_ref::VmRef;
use crate::core::domain::value_object::{
    Machine, NetworkInterfaceId, NodeName, PoolName, Tag, VmId,
};

lazy_static! {
    static ref RX_NIC: Regex = Regex::new(r"^net(\d+)$").unwrap();
    static ref RX_SERIAL: Regex = Regex::new(r"^serial(\d+)$").unwrap();
    static ref RX_USB: Regex = Regex::new(r"^usb(\d+)$").unwrap();
    static ref RX_PCI: Regex = Regex::new(r"^hostpci(\d+)$").unwrap();
    static ref RX_UNUSED: Regex = Regex::new(r"^unused(\d+)$").unwrap();
    // linked clones back their disks with the template's base volume
    static ref RX_LINKED_BASE: Regex = Regex::new(r"base-(\d+)-disk").unwrap();
}

/// Guest firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bios {
    SeaBios,
    Ovmf,
}

impl Bios {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Bios::SeaBios => "seabios",
            Bios::Ovmf => "ovmf",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "seabios" => Ok(Bios::SeaBios),
            "ovmf" => Ok(Bios::Ovmf),
            _ => Err(ValidationError::field(
                "bios",
                format!("unknown bios '{raw}'"),
            )),
        }
    }
}

/// The full desired (or decoded) configuration of one QEMU guest.
///
/// Every field is optional: absent fields are left untouched by an update,
/// present-but-empty fields are deleted, present fields are written when they
/// differ from the live state. Instances decoded from the API always have
/// [`VmConfig::apply_defaults`] applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmConfig {
    pub vm_id: Option<VmId>,
    /// Target node; differing from the live node triggers a migration.
    pub node: Option<NodeName>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<Tag>>,
    pub pool: Option<PoolName>,

    pub agent: Option<QemuGuestAgent>,
    pub args: Option<String>,
    pub bios: Option<Bios>,
    pub boot: Option<String>,
    /// Legacy field, only ever reported by the API.
    pub boot_disk: Option<String>,
    pub cpu: Option<QemuCpu>,
    pub cloud_init: Option<CloudInit>,
    pub disks: Option<QemuStorages>,
    pub efi_disk: Option<EfiDisk>,
    pub hookscript: Option<String>,
    pub hotplug: Option<Hotplug>,
    /// Sugar for a CD-ROM at ide2; normalized into `disks` before diffing.
    pub iso: Option<IsoFile>,
    pub kvm: Option<bool>,
    /// Template backing this guest, only ever reported by the API.
    pub linked_vm_id: Option<VmId>,
    pub machine: Option<Machine>,
    pub memory: Option<QemuMemory>,
    pub networks: Option<QemuNetworkInterfaces>,
    pub onboot: Option<bool>,
    pub os_type: Option<String>,
    pub pci_devices: Option<QemuPciDevices>,
    pub protection: Option<bool>,
    pub rng: Option<VirtioRng>,
    pub scsi_hw: Option<String>,
    pub serials: Option<SerialInterfaces>,
    pub smbios1: Option<String>,
    pub startup: Option<String>,
    pub tablet: Option<bool>,
    pub tpm: Option<TpmState>,
    /// Detached volumes as reported by the API; read-only.
    pub unused_disks: BTreeMap<u8, UnusedDisk>,
    pub usbs: Option<QemuUsbs>,
    pub vga: Option<QemuVga>,

    pub ha_state: Option<HaState>,
    pub ha_group: Option<String>,

    /// Clone inputs; never returned by the API.
    pub full_clone: Option<bool>,
    pub clone_storage: Option<String>,
}

impl VmConfig {
    /// Binds this config to a guest reference (vmid + node).
    pub(crate) fn set_vm_ref(&mut self, vmr: &VmRef) {
        self.vm_id = Some(vmr.vm_id());
        if self.node.is_none() {
            self.node = Some(vmr.node().clone());
        }
    }

    /// Fills the PVE defaults a freshly decoded config is entitled to.
    pub(crate) fn apply_defaults(&mut self) {
        if self.boot.is_none() {
            self.boot = Some("cdn".to_string());
        }
        if self.bios.is_none() {
            self.bios = Some(Bios::SeaBios);
        }
        if self.onboot.is_none() {
            self.onboot = Some(true);
        }
        if self.hotplug.is_none() {
            self.hotplug = Some(Hotplug::default());
        }
        if self.protection.is_none() {
            self.protection = Some(false);
        }
        if self.kvm.is_none() {
            self.kvm = Some(true);
        }
        if self.os_type.is_none() {
            self.os_type = Some("other".to_string());
        }
        if self.scsi_hw.is_none() {
            self.scsi_hw = Some("lsi".to_string());
        }
        if self.tablet.is_none() {
            self.tablet = Some(true);
        }
        if self.disks.is_none() {
            self.disks = Some(QemuStorages::default());
        }
        if self.networks.is_none() {
            self.networks = Some(QemuNetworkInterfaces::default());
        }
        if self.serials.is_none() {
            self.serials = Some(SerialInterfaces::default());
        }
        if self.usbs.is_none() {
            self.usbs = Some(QemuUsbs::default());
        }
        if self.pci_devices.is_none() {
            self.pci_devices = Some(QemuPciDevices::default());
        }
    }

    /// Folds the `iso` shortcut into the canonical ide2 CD-ROM slot.
    pub(crate) fn normalize(&mut self) {
        if let Some(iso) = self.iso.clone() {
            let disks = self.disks.get_or_insert_with(QemuStorages::default);
            let slot = DiskSlot::new_unchecked(DiskBus::Ide, 2);
            if disks.get(slot).is_none() {
                disks.set(slot, QemuStorage::CdRom(QemuCdRom::with_iso(iso)));
            }
        }
    }

    pub(crate) fn validate(&self, current: Option<&VmConfig>) -> Result<(), ValidationError> {
        if current.is_none() {
            // Creation requires compute to be pinned down, cpu first.
            let cpu = self.cpu.as_ref().ok_or(ValidationError::CpuRequired)?;
            cpu.validate(None)?;
            let memory = self.memory.as_ref().ok_or(ValidationError::MemoryRequired)?;
            memory.validate(None)?;
        } else {
            if let Some(cpu) = &self.cpu {
                cpu.validate(current.and_then(|c| c.cpu.as_ref()))?;
            }
            if let Some(memory) = &self.memory {
                memory.validate(current.and_then(|c| c.memory.as_ref()))?;
            }
        }
        if let Some(tpm) = &self.tpm {
            tpm.validate()?;
        }
        if let Some(efi) = &self.efi_disk {
            efi.validate()?;
        }
        if let Some(cloud_init) = &self.cloud_init {
            cloud_init.validate()?;
        }
        if let Some(disks) = &self.disks {
            disks.validate(current.and_then(|c| c.disks.as_ref()))?;
        }
        if let Some(networks) = &self.networks {
            networks.validate()?;
        }
        if let Some(serials) = &self.serials {
            serials.validate()?;
        }
        if let Some(usbs) = &self.usbs {
            usbs.validate()?;
        }
        if let Some(pci) = &self.pci_devices {
            pci.validate()?;
        }
        Ok(())
    }

    /// Produces the main config parameter map against the current state,
    /// together with the local reboot verdict. Side-operations (moves,
    /// resizes, pre-PUT deletes, migration) are not part of this map.
    pub(crate) fn map_to_api(
        &self,
        current: Option<&VmConfig>,
        version: Version,
    ) -> ProxmoxResult<(bool, Params)> {
        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        let mut reboot = false;

        let hotplug = self
            .hotplug
            .or(current.and_then(|c| c.hotplug))
            .unwrap_or_default();

        if current.is_none() {
            if let Some(vm_id) = self.vm_id {
                params.insert("vmid".to_string(), vm_id.value().into());
            }
        }

        diff_opt_str(
            "name",
            self.name.as_deref(),
            current.and_then(|c| c.name.as_deref()),
            &mut params,
            &mut deletes,
        );
        diff_opt_str(
            "description",
            self.description.as_deref(),
            current.and_then(|c| c.description.as_deref()),
            &mut params,
            &mut deletes,
        );
        if let Some(tags) = &self.tags {
            let encoded = Tag::list_to_api(tags);
            let current_encoded = current
                .and_then(|c| c.tags.as_ref())
                .map(|t| Tag::list_to_api(t));
            if encoded.is_empty() {
                if current_encoded.map(|c| !c.is_empty()).unwrap_or(false) {
                    deletes.push("tags");
                }
            } else if current_encoded.as_deref() != Some(encoded.as_str()) {
                params.insert("tags".to_string(), encoded.into());
            }
        }

        reboot |= diff_opt_str(
            "args",
            self.args.as_deref(),
            current.and_then(|c| c.args.as_deref()),
            &mut params,
            &mut deletes,
        );
        if let Some(bios) = self.bios {
            if current.and_then(|c| c.bios) != Some(bios) {
                params.insert("bios".to_string(), bios.as_str().into());
                reboot = true;
            }
        }
        if let Some(machine) = &self.machine {
            if current.and_then(|c| c.machine.as_ref()) != Some(machine) {
                params.insert("machine".to_string(), machine.as_str().into());
                reboot = true;
            }
        }
        reboot |= diff_opt_str(
            "smbios1",
            self.smbios1.as_deref(),
            current.and_then(|c| c.smbios1.as_deref()),
            &mut params,
            &mut deletes,
        );

        diff_opt_str(
            "boot",
            self.boot.as_deref(),
            current.and_then(|c| c.boot.as_deref()),
            &mut params,
            &mut deletes,
        );
        diff_opt_str(
            "hookscript",
            self.hookscript.as_deref(),
            current.and_then(|c| c.hookscript.as_deref()),
            &mut params,
            &mut deletes,
        );
        diff_opt_str(
            "ostype",
            self.os_type.as_deref(),
            current.and_then(|c| c.os_type.as_deref()),
            &mut params,
            &mut deletes,
        );
        diff_opt_str(
            "scsihw",
            self.scsi_hw.as_deref(),
            current.and_then(|c| c.scsi_hw.as_deref()),
            &mut params,
            &mut deletes,
        );
        diff_opt_str(
            "startup",
            self.startup.as_deref(),
            current.and_then(|c| c.startup.as_deref()),
            &mut params,
            &mut deletes,
        );
        if let Some(hotplug_set) = self.hotplug {
            if current.and_then(|c| c.hotplug) != Some(hotplug_set) {
                params.insert("hotplug".to_string(), hotplug_set.to_api().into());
            }
        }
        diff_opt_bool(
            "kvm",
            self.kvm,
            current.and_then(|c| c.kvm),
            &mut params,
        );
        diff_opt_bool(
            "onboot",
            self.onboot,
            current.and_then(|c| c.onboot),
            &mut params,
        );
        diff_opt_bool(
            "protection",
            self.protection,
            current.and_then(|c| c.protection),
            &mut params,
        );
        diff_opt_bool(
            "tablet",
            self.tablet,
            current.and_then(|c| c.tablet),
            &mut params,
        );

        if let Some(agent) = &self.agent {
            let encoded = agent.to_api();
            let current_encoded = current.and_then(|c| c.agent.as_ref()).map(QemuGuestAgent::to_api);
            if current_encoded.as_deref() != Some(encoded.as_str()) {
                params.insert("agent".to_string(), encoded.into());
            }
        }
        if let Some(vga) = &self.vga {
            let encoded = vga.to_api();
            let current_encoded = current.and_then(|c| c.vga.as_ref()).map(QemuVga::to_api);
            if encoded.is_empty() {
                if current_encoded.is_some() {
                    deletes.push("vga");
                }
            } else if current_encoded.as_deref() != Some(encoded.as_str()) {
                params.insert("vga".to_string(), encoded.into());
            }
        }
        if let Some(rng) = &self.rng {
            let encoded = rng.to_api();
            let current_encoded = current.and_then(|c| c.rng.as_ref()).map(VirtioRng::to_api);
            if current_encoded.as_deref() != Some(encoded.as_str()) {
                params.insert("rng0".to_string(), encoded.into());
            }
        }

        if let Some(cpu) = &self.cpu {
            cpu.map_to_api(current.and_then(|c| c.cpu.as_ref()), &mut params, &mut deletes);
            if let Some(current_cpu) = current.and_then(|c| c.cpu.as_ref()) {
                reboot |= cpu.requires_reboot(current_cpu, hotplug.cpu);
            }
        }
        if let Some(memory) = &self.memory {
            memory.map_to_api(
                current.and_then(|c| c.memory.as_ref()),
                &mut params,
                &mut deletes,
            );
            if let Some(current_memory) = current.and_then(|c| c.memory.as_ref()) {
                reboot |= memory.requires_reboot(current_memory, hotplug.memory);
            }
        }
        if let Some(cloud_init) = &self.cloud_init {
            cloud_init.map_to_api(
                current.and_then(|c| c.cloud_init.as_ref()),
                version,
                &mut params,
                &mut deletes,
            );
        }

        if let Some(efi) = &self.efi_disk {
            let changed = match current.and_then(|c| c.efi_disk.as_ref()) {
                Some(current_efi) => efi.differs(current_efi),
                None => true,
            };
            if changed {
                params.insert("efidisk0".to_string(), efi.to_api().into());
                reboot = true;
            }
        }
        if let Some(tpm) = &self.tpm {
            let changed = match current.and_then(|c| c.tpm.as_ref()) {
                Some(current_tpm) => tpm.differs(current_tpm),
                None => true,
            };
            if changed {
                params.insert("tpmstate0".to_string(), tpm.to_api().into());
                reboot = true;
            }
        }

        if let Some(disks) = &self.disks {
            disks.map_to_api(current.and_then(|c| c.disks.as_ref()), &mut params, &mut deletes);
        }
        if let Some(networks) = &self.networks {
            let vm_id = self
                .vm_id
                .or(current.and_then(|c| c.vm_id))
                .map(|id| id.value())
                .unwrap_or(0);
            networks.map_to_api(
                current.and_then(|c| c.networks.as_ref()),
                vm_id,
                &mut params,
                &mut deletes,
            );
        }
        if let Some(serials) = &self.serials {
            serials.map_to_api(
                current.and_then(|c| c.serials.as_ref()),
                &mut params,
                &mut deletes,
            );
        }
        if let Some(usbs) = &self.usbs {
            usbs.map_to_api(current.and_then(|c| c.usbs.as_ref()), &mut params, &mut deletes);
        }
        if let Some(pci) = &self.pci_devices {
            let changed = pci.map_to_api(
                current.and_then(|c| c.pci_devices.as_ref()),
                &mut params,
                &mut deletes,
            );
            reboot |= changed && current.is_some();
        }

        if current.is_none() {
            reboot = false;
        }
        deletes.apply(&mut params);
        Ok((reboot, params))
    }

    /// Decodes a raw config response. Defaults are applied by the caller via
    /// [`VmConfig::apply_defaults`].
    pub(crate) fn map_to_struct(vmr: Option<&VmRef>, params: &Params) -> ProxmoxResult<VmConfig> {
        let mut config = VmConfig {
            cpu: QemuCpu::map_to_struct(params),
            memory: QemuMemory::map_to_struct(params),
            cloud_init: CloudInit::map_to_struct(params),
            ..Default::default()
        };

        if let Some(vmr) = vmr {
            config.vm_id = Some(vmr.vm_id());
            config.node = Some(vmr.node().clone());
            config.pool = vmr.pool().cloned();
        }

        if let Some(v) = params.get("agent").map(value_to_string) {
            config.agent = Some(QemuGuestAgent::from_api(&v));
        }
        if let Some(v) = params.get("args").map(value_to_string) {
            config.args = Some(v.trim().to_string());
        }
        if let Some(v) = params.get("bios").map(value_to_string) {
            config.bios = Some(Bios::parse(&v)?);
        }
        if let Some(v) = params.get("boot").map(value_to_string) {
            config.boot = Some(v);
        }
        if let Some(v) = params.get("bootdisk").map(value_to_string) {
            config.boot_disk = Some(v);
        }
        if let Some(v) = params.get("description").map(value_to_string) {
            config.description = Some(v);
        }
        if let Some(v) = params.get("hookscript").map(value_to_string) {
            config.hookscript = Some(v);
        }
        if let Some(v) = params.get("hotplug").map(value_to_string) {
            config.hotplug = Some(Hotplug::from_api(&v));
        }
        if let Some(v) = params.get("kvm") {
            config.kvm = Some(value_to_bool(v));
        }
        if let Some(v) = params.get("machine").map(value_to_string) {
            config.machine = Some(Machine::new(v)?);
        }
        if let Some(v) = params.get("name").map(value_to_string) {
            config.name = Some(v);
        }
        if let Some(v) = params.get("onboot") {
            config.onboot = Some(value_to_bool(v));
        }
        if let Some(v) = params.get("ostype").map(value_to_string) {
            config.os_type = Some(v);
        }
        if let Some(v) = params.get("protection") {
            config.protection = Some(value_to_bool(v));
        }
        if let Some(v) = params.get("scsihw").map(value_to_string) {
            config.scsi_hw = Some(v);
        }
        if let Some(v) = params.get("smbios1").map(value_to_string) {
            config.smbios1 = Some(v);
        }
        if let Some(v) = params.get("startup").map(value_to_string) {
            config.startup = Some(v);
        }
        if let Some(v) = params.get("tablet") {
            config.tablet = Some(value_to_bool(v));
        }
        if let Some(v) = params.get("tags").map(value_to_string) {
            config.tags = Some(Tag::list_from_api(&v));
        }
        if let Some(v) = params.get("efidisk0").map(value_to_string) {
            config.efi_disk = Some(EfiDisk::from_api(&v)?);
        }
        if let Some(v) = params.get("tpmstate0").map(value_to_string) {
            config.tpm = Some(TpmState::from_api(&v)?);
        }
        if let Some(v) = params.get("rng0").map(value_to_string) {
            config.rng = Some(VirtioRng::from_api(&v)?);
        }
        if let Some(v) = params.get("vga").map(value_to_string) {
            config.vga = Some(QemuVga::from_api(&v));
        }

        let mut disks = QemuStorages::default();
        let mut any_disk = false;
        for bus in DiskBus::ALL {
            for index in 0..bus.slot_count() {
                let slot = DiskSlot::new_unchecked(bus, index);
                if let Some(v) = params.get(&slot.config_key()).map(value_to_string) {
                    disks.set(slot, QemuStorage::from_api(&v)?);
                    any_disk = true;
                }
            }
        }
        if any_disk {
            config.disks = Some(disks);
        }
        if let Some(disks) = &config.disks {
            let slot = DiskSlot::new_unchecked(DiskBus::Ide, 2);
            if let Some(QemuStorage::CdRom(cdrom)) = disks.get(slot) {
                config.iso = cdrom.iso.clone();
            }
            config.linked_vm_id = disks
                .iter()
                .filter_map(|(_, device)| match device {
                    QemuStorage::Disk(disk) => disk.volume.as_deref(),
                    _ => None,
                })
                .find_map(|volume| RX_LINKED_BASE.captures(volume))
                .and_then(|caps| caps[1].parse().ok())
                .and_then(|id| VmId::new(id).ok());
        }
        let mut networks = QemuNetworkInterfaces::default();
        let mut serials = SerialInterfaces::default();
        let mut usbs = QemuUsbs::default();
        let mut pci_devices = QemuPciDevices::default();
        for (key, value) in params {
            if let Some(caps) = RX_NIC.captures(key) {
                let id: u8 = caps[1].parse().unwrap_or(u8::MAX);
                if id <= 31 {
                    networks.0.insert(
                        NetworkInterfaceId::new_unchecked(id),
                        QemuNetworkInterface::from_api(&value_to_string(value))?,
                    );
                }
            } else if let Some(caps) = RX_SERIAL.captures(key) {
                let id: u8 = caps[1].parse().unwrap_or(u8::MAX);
                if id <= 3 {
                    serials.0.insert(
                        SerialId::new_unchecked(id),
                        SerialInterface::from_api(&value_to_string(value)),
                    );
                }
            } else if let Some(caps) = RX_USB.captures(key) {
                let id: u8 = caps[1].parse().unwrap_or(u8::MAX);
                if id <= 13 {
                    usbs.0.insert(
                        UsbId::new_unchecked(id),
                        QemuUsb::from_api(&value_to_string(value)),
                    );
                }
            } else if let Some(caps) = RX_PCI.captures(key) {
                let id: u8 = caps[1].parse().unwrap_or(u8::MAX);
                if id <= 15 {
                    pci_devices.0.insert(
                        PciId::new_unchecked(id),
                        HostPci::from_api(&value_to_string(value)),
                    );
                }
            } else if let Some(caps) = RX_UNUSED.captures(key) {
                if let Ok(id) = caps[1].parse::<u8>() {
                    let raw = value_to_string(value);
                    let (storage, file) = raw.split_once(':').unwrap_or((raw.as_str(), ""));
                    config.unused_disks.insert(
                        id,
                        UnusedDisk {
                            storage: storage.to_string(),
                            file: file.to_string(),
                        },
                    );
                }
            }
        }
        if !networks.0.is_empty() {
            config.networks = Some(networks);
        }
        if !serials.0.is_empty() {
            config.serials = Some(serials);
        }
        if !usbs.0.is_empty() {
            config.usbs = Some(usbs);
        }
        if !pci_devices.0.is_empty() {
            config.pci_devices = Some(pci_devices);
        }

        Ok(config)
    }
}
