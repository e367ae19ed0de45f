use std::collections::BTreeMap;

use crate::core::domain::codec::{
    parse_device, split_pair, sub_bool, DeleteList, DeviceString, Params,
};
use crate::core::domain::error::{ProxmoxResult, ValidationError};
use crate::core::domain::value_object::{validate_disk_size, DiskSize};

/// Bus a guest disk hangs off. Each family has its own slot range and
/// feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiskBus {
    Ide,
    Sata,
    Scsi,
    Virtio,
}

impl DiskBus {
    pub(crate) const ALL: [DiskBus; 4] = [DiskBus::Ide, DiskBus::Sata, DiskBus::Scsi, DiskBus::Virtio];

    pub const fn slot_count(self) -> u8 {
        match self {
            DiskBus::Ide => 4,
            DiskBus::Sata => 6,
            DiskBus::Scsi => 31,
            DiskBus::Virtio => 16,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiskBus::Ide => "ide",
            DiskBus::Sata => "sata",
            DiskBus::Scsi => "scsi",
            DiskBus::Virtio => "virtio",
        }
    }
}

/// One (bus, index) position, e.g. `scsi0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskSlot {
    pub bus: DiskBus,
    pub index: u8,
}

impl DiskSlot {
    pub fn new(bus: DiskBus, index: u8) -> ProxmoxResult<Self> {
        if index >= bus.slot_count() {
            return Err(ValidationError::field(
                "disk slot",
                format!(
                    "{} supports slots 0-{}",
                    bus.as_str(),
                    bus.slot_count() - 1
                ),
            )
            .into());
        }
        Ok(Self { bus, index })
    }

    pub(crate) fn new_unchecked(bus: DiskBus, index: u8) -> Self {
        Self { bus, index }
    }

    pub(crate) fn config_key(&self) -> String {
        format!("{}{}", self.bus.as_str(), self.index)
    }
}

impl std::fmt::Display for DiskSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.bus.as_str(), self.index)
    }
}

/// On-disk image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    Raw,
    Qcow2,
    Vmdk,
}

impl DiskFormat {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Vmdk => "vmdk",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "raw" => Ok(DiskFormat::Raw),
            "qcow2" => Ok(DiskFormat::Qcow2),
            "vmdk" => Ok(DiskFormat::Vmdk),
            _ => Err(ValidationError::field(
                "format",
                format!("unknown disk format '{raw}'"),
            )),
        }
    }
}

/// Host cache mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskCache {
    DirectSync,
    None,
    Unsafe,
    WriteBack,
    WriteThrough,
}

impl DiskCache {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            DiskCache::DirectSync => "directsync",
            DiskCache::None => "none",
            DiskCache::Unsafe => "unsafe",
            DiskCache::WriteBack => "writeback",
            DiskCache::WriteThrough => "writethrough",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "directsync" => Ok(DiskCache::DirectSync),
            "none" => Ok(DiskCache::None),
            "unsafe" => Ok(DiskCache::Unsafe),
            "writeback" => Ok(DiskCache::WriteBack),
            "writethrough" => Ok(DiskCache::WriteThrough),
            _ => Err(ValidationError::field(
                "cache",
                format!("unknown cache mode '{raw}'"),
            )),
        }
    }
}

/// Asynchronous I/O engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskAio {
    IoUring,
    Native,
    Threads,
}

impl DiskAio {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            DiskAio::IoUring => "io_uring",
            DiskAio::Native => "native",
            DiskAio::Threads => "threads",
        }
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "io_uring" => Ok(DiskAio::IoUring),
            "native" => Ok(DiskAio::Native),
            "threads" => Ok(DiskAio::Threads),
            _ => Err(ValidationError::field(
                "aio",
                format!("unknown aio mode '{raw}'"),
            )),
        }
    }
}

/// Reference to an ISO image in a storage, e.g. `local:iso/debian-12.iso`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoFile {
    pub storage: String,
    pub file: String,
}

impl IsoFile {
    pub fn new(storage: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            file: file.into(),
        }
    }

    pub(crate) fn volume(&self) -> String {
        format!("{}:{}", self.storage, self.file)
    }

    pub(crate) fn parse(volume: &str) -> Option<Self> {
        let (storage, file) = volume.split_once(':')?;
        Some(Self::new(storage, file))
    }
}

/// A CD-ROM drive: an ISO, a passed-through host drive, or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QemuCdRom {
    pub iso: Option<IsoFile>,
    pub passthrough: bool,
}

impl QemuCdRom {
    pub fn with_iso(iso: IsoFile) -> Self {
        Self {
            iso: Some(iso),
            passthrough: false,
        }
    }

    fn volume_token(&self) -> String {
        match (&self.iso, self.passthrough) {
            (Some(iso), _) => iso.volume(),
            (None, true) => "cdrom".to_string(),
            (None, false) => "none".to_string(),
        }
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.raw(self.volume_token()).pair("media", "cdrom");
        ds.finish()
    }
}

/// The auto-generated cloud-init config drive. PVE rebuilds it on the fly;
/// replacing it needs an explicit remove before the re-add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudInitDrive {
    pub storage: String,
    pub format: Option<DiskFormat>,
    /// Backing volume, present once materialized. Server-assigned.
    pub volume: Option<String>,
}

impl CloudInitDrive {
    pub fn new(storage: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            format: None,
            volume: None,
        }
    }

    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        ds.raw(format!("{}:cloudinit", self.storage))
            .opt("format", self.format.map(|f| f.as_str()))
            .pair("media", "cdrom");
        ds.finish()
    }

    fn same_config(&self, current: &CloudInitDrive) -> bool {
        self.storage == current.storage
            && (self.format.is_none() || self.format == current.format)
    }
}

/// A block disk.
#[derive(Debug, Clone, PartialEq)]
pub struct QemuDisk {
    pub storage: String,
    pub size: DiskSize,
    pub format: Option<DiskFormat>,
    pub cache: Option<DiskCache>,
    pub aio: Option<DiskAio>,
    pub discard: bool,
    pub io_thread: bool,
    pub ssd: bool,
    /// Included in backups; PVE default is on, so only `backup=0` is
    /// written.
    pub backup: bool,
    /// Included in storage replication; PVE default is on.
    pub replicate: bool,
    pub serial: Option<String>,
    pub mbps_rd: Option<f64>,
    pub mbps_wr: Option<f64>,
    /// Backing volume (`<storage>:<vmid>/<file>`) once materialized, or an
    /// `unusedN` path being re-attached.
    pub volume: Option<String>,
    pub trailer: BTreeMap<String, String>,
}

impl QemuDisk {
    pub fn new(storage: impl Into<String>, size: DiskSize) -> Self {
        Self {
            storage: storage.into(),
            size,
            format: None,
            cache: None,
            aio: None,
            discard: false,
            io_thread: false,
            ssd: false,
            backup: true,
            replicate: true,
            serial: None,
            mbps_rd: None,
            mbps_wr: None,
            volume: None,
            trailer: BTreeMap::new(),
        }
    }

    fn attrs_to(&self, ds: &mut DeviceString) {
        if let Some(cache) = self.cache {
            // cache=none is the default and stays implicit
            if cache != DiskCache::None {
                ds.pair("cache", cache.as_str());
            }
        }
        ds.opt("aio", self.aio.map(|a| a.as_str()));
        if self.discard {
            ds.pair("discard", "on");
        }
        ds.flag("iothread", self.io_thread)
            .flag("ssd", self.ssd)
            .flag_off("backup", self.backup)
            .flag_off("replicate", self.replicate)
            .opt("serial", self.serial.as_deref())
            .opt("mbps_rd", self.mbps_rd)
            .opt("mbps_wr", self.mbps_wr)
            .opt("format", self.format.map(|f| f.as_str()))
            .trailer(&self.trailer);
    }

    /// Encodes the disk. With a backing volume the token is the volume plus
    /// an explicit `size=`; without one it is the `<storage>:<GiB>` create
    /// request.
    pub(crate) fn to_api(&self) -> String {
        let mut ds = DeviceString::new();
        match &self.volume {
            Some(volume) => {
                ds.raw(volume.clone()).pair("size", self.size.to_api());
            }
            None => {
                ds.raw(format!("{}:{}", self.storage, self.size.gib_ceil()));
            }
        }
        self.attrs_to(&mut ds);
        ds.finish()
    }

    /// Encodes against the live state, inheriting the current backing volume
    /// so an attribute change rewrites in place instead of allocating a new
    /// image.
    fn to_api_against(&self, current: &QemuDisk) -> String {
        if self.volume.is_some() {
            return self.to_api();
        }
        let mut pinned = self.clone();
        pinned.volume = current.volume.clone();
        pinned.to_api()
    }

    /// Attribute equality that ignores `size` (grown out-of-band via the
    /// resize endpoint) and the server-assigned volume.
    fn same_attrs(&self, current: &QemuDisk) -> bool {
        self.storage == current.storage
            && (self.format.is_none() || self.format == current.format)
            && self.cache.unwrap_or(DiskCache::None) == current.cache.unwrap_or(DiskCache::None)
            && self.aio == current.aio
            && self.discard == current.discard
            && self.io_thread == current.io_thread
            && self.ssd == current.ssd
            && self.backup == current.backup
            && self.replicate == current.replicate
            && self.serial == current.serial
            && self.mbps_rd == current.mbps_rd
            && self.mbps_wr == current.mbps_wr
            && self.trailer == current.trailer
    }
}

/// What occupies one (bus, slot): a block disk, a CD-ROM or the cloud-init
/// drive, never more than one.
#[derive(Debug, Clone, PartialEq)]
pub enum QemuStorage {
    Disk(QemuDisk),
    CdRom(QemuCdRom),
    CloudInit(CloudInitDrive),
}

impl QemuStorage {
    pub(crate) fn to_api(&self) -> String {
        match self {
            QemuStorage::Disk(disk) => disk.to_api(),
            QemuStorage::CdRom(cdrom) => cdrom.to_api(),
            QemuStorage::CloudInit(drive) => drive.to_api(),
        }
    }

    pub(crate) fn from_api(raw: &str) -> Result<Self, ValidationError> {
        let mut map = parse_device(raw, "volume");
        let volume = map.remove("volume").unwrap_or_default();
        let media_cdrom = map.get("media").map(|m| m == "cdrom").unwrap_or(false);

        if media_cdrom && volume.contains("cloudinit") {
            let (storage, _) = split_pair(&volume, ':');
            let format = map.remove("format").map(|f| DiskFormat::parse(&f)).transpose()?;
            return Ok(QemuStorage::CloudInit(CloudInitDrive {
                storage: storage.to_string(),
                format,
                volume: Some(volume),
            }));
        }
        if media_cdrom {
            return Ok(QemuStorage::CdRom(QemuCdRom {
                passthrough: volume == "cdrom",
                iso: (volume != "none" && volume != "cdrom")
                    .then(|| IsoFile::parse(&volume))
                    .flatten(),
            }));
        }

        let (storage, _) = split_pair(&volume, ':');
        let size = match map.remove("size") {
            Some(raw) => DiskSize::parse(&raw)?,
            None => DiskSize::from_kib(0),
        };
        let format = map.remove("format").map(|f| DiskFormat::parse(&f)).transpose()?;
        let cache = map.remove("cache").map(|c| DiskCache::parse(&c)).transpose()?;
        let aio = map.remove("aio").map(|a| DiskAio::parse(&a)).transpose()?;
        let discard = map.remove("discard").map(|d| d == "on").unwrap_or(false);
        let io_thread = map.remove("iothread").map(|v| sub_bool(&v)).unwrap_or(false);
        let ssd = map.remove("ssd").map(|v| sub_bool(&v)).unwrap_or(false);
        let backup = map.remove("backup").map(|v| sub_bool(&v)).unwrap_or(true);
        let replicate = map.remove("replicate").map(|v| sub_bool(&v)).unwrap_or(true);
        let serial = map.remove("serial");
        let mbps_rd = map.remove("mbps_rd").and_then(|v| v.parse().ok());
        let mbps_wr = map.remove("mbps_wr").and_then(|v| v.parse().ok());

        Ok(QemuStorage::Disk(QemuDisk {
            storage: storage.to_string(),
            size,
            format,
            cache,
            aio,
            discard,
            io_thread,
            ssd,
            backup,
            replicate,
            serial,
            mbps_rd,
            mbps_wr,
            volume: Some(volume),
            trailer: map,
        }))
    }

    /// Whether a main-PUT write is needed for this slot.
    fn write_needed(&self, current: &QemuStorage) -> bool {
        match (self, current) {
            (QemuStorage::Disk(d), QemuStorage::Disk(c)) => !d.same_attrs(c),
            (QemuStorage::CdRom(d), QemuStorage::CdRom(c)) => d != c,
            (QemuStorage::CloudInit(d), QemuStorage::CloudInit(c)) => !d.same_config(c),
            _ => true,
        }
    }

    fn encode_against(&self, current: &QemuStorage) -> String {
        match (self, current) {
            (QemuStorage::Disk(d), QemuStorage::Disk(c)) => d.to_api_against(c),
            _ => self.to_api(),
        }
    }
}

/// A `unusedN` entry: a detached volume still owned by the guest. Read-only
/// from the client's perspective; re-attach by writing a disk whose `volume`
/// is the unused path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedDisk {
    pub storage: String,
    pub file: String,
}

/// A disk move to another storage (and/or format), executed as an async
/// task ahead of the config PUT.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskMove {
    pub slot: DiskSlot,
    pub target_storage: String,
    pub format: Option<DiskFormat>,
    pub delete_source: bool,
}

/// A pure growth, executed via the resize endpoint ahead of the config PUT.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskResize {
    pub slot: DiskSlot,
    /// `+NG` growth delta.
    pub growth: String,
    pub new_size: DiskSize,
}

/// The side-operations a storage diff produced.
#[derive(Debug, Default)]
pub struct DiskChanges {
    pub moves: Vec<DiskMove>,
    pub resizes: Vec<DiskResize>,
    /// Cloud-init drives that must be removed before they can be recreated.
    pub cloud_init_removes: DeleteList,
}

/// Every disk slot of the guest, one fixed-size family per bus so the
/// slot-by-slot diff is total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QemuStorages {
    pub ide: [Option<QemuStorage>; 4],
    pub sata: [Option<QemuStorage>; 6],
    pub scsi: [Option<QemuStorage>; 31],
    pub virtio: [Option<QemuStorage>; 16],
}

impl QemuStorages {
    fn family(&self, bus: DiskBus) -> &[Option<QemuStorage>] {
        match bus {
            DiskBus::Ide => &self.ide,
            DiskBus::Sata => &self.sata,
            DiskBus::Scsi => &self.scsi,
            DiskBus::Virtio => &self.virtio,
        }
    }

    fn family_mut(&mut self, bus: DiskBus) -> &mut [Option<QemuStorage>] {
        match bus {
            DiskBus::Ide => &mut self.ide,
            DiskBus::Sata => &mut self.sata,
            DiskBus::Scsi => &mut self.scsi,
            DiskBus::Virtio => &mut self.virtio,
        }
    }

    pub fn get(&self, slot: DiskSlot) -> Option<&QemuStorage> {
        self.family(slot.bus)[slot.index as usize].as_ref()
    }

    pub fn set(&mut self, slot: DiskSlot, device: QemuStorage) {
        self.family_mut(slot.bus)[slot.index as usize] = Some(device);
    }

    pub fn clear(&mut self, slot: DiskSlot) {
        self.family_mut(slot.bus)[slot.index as usize] = None;
    }

    pub fn iter(&self) -> impl Iterator<Item = (DiskSlot, &QemuStorage)> + '_ {
        DiskBus::ALL.into_iter().flat_map(move |bus| {
            self.family(bus).iter().enumerate().filter_map(move |(i, slot)| {
                slot.as_ref()
                    .map(|device| (DiskSlot::new_unchecked(bus, i as u8), device))
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub(crate) fn validate(&self, current: Option<&QemuStorages>) -> Result<(), ValidationError> {
        for (slot, device) in self.iter() {
            if let QemuStorage::Disk(disk) = device {
                if disk.storage.is_empty() && disk.volume.is_none() {
                    return Err(ValidationError::field(
                        "disk.storage",
                        format!("{slot}: may not be empty"),
                    ));
                }
                validate_disk_size(&disk.size)?;
                if let Some(QemuStorage::Disk(current_disk)) =
                    current.and_then(|c| c.get(slot))
                {
                    if disk.size < current_disk.size {
                        return Err(ValidationError::Constraint(format!(
                            "disk {slot} may not shrink from {} to {}",
                            current_disk.size, disk.size
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Classifies the disk side-operations against the current state:
    /// storage/format changes become moves, growth becomes resizes, and
    /// cloud-init drives being replaced are flagged for the pre-PUT delete.
    pub(crate) fn mark_changes(&self, current: &QemuStorages) -> DiskChanges {
        let mut changes = DiskChanges::default();
        let desired_has_cloud_init = self
            .iter()
            .any(|(_, d)| matches!(d, QemuStorage::CloudInit(_)));

        for (slot, desired) in self.iter() {
            let Some(QemuStorage::Disk(current_disk)) = current.get(slot) else {
                continue;
            };
            let QemuStorage::Disk(desired_disk) = desired else {
                continue;
            };
            let storage_changed = desired_disk.storage != current_disk.storage;
            let format_changed = desired_disk.format.is_some()
                && desired_disk.format != current_disk.format;
            if storage_changed || format_changed {
                changes.moves.push(DiskMove {
                    slot,
                    target_storage: desired_disk.storage.clone(),
                    format: format_changed.then_some(desired_disk.format).flatten(),
                    delete_source: true,
                });
            }
            if let Some(growth) = desired_disk.size.growth_from(current_disk.size) {
                changes.resizes.push(DiskResize {
                    slot,
                    growth,
                    new_size: desired_disk.size,
                });
            }
        }

        for bus in DiskBus::ALL {
            for (index, device) in current.family(bus).iter().enumerate() {
                let Some(QemuStorage::CloudInit(current_drive)) = device else {
                    continue;
                };
                let slot = DiskSlot::new_unchecked(bus, index as u8);
                let replaced = match self.get(slot) {
                    Some(QemuStorage::CloudInit(desired_drive)) => {
                        !desired_drive.same_config(current_drive)
                    }
                    _ => desired_has_cloud_init,
                };
                if replaced {
                    changes.cloud_init_removes.push(slot.config_key());
                }
            }
        }

        changes
    }

    /// The main-PUT portion of the storage diff: changed or new slots are
    /// written, vanished slots are deleted. Size-only growth emits nothing,
    /// that is the resize side-operation's job.
    pub(crate) fn map_to_api(
        &self,
        current: Option<&QemuStorages>,
        params: &mut Params,
        deletes: &mut DeleteList,
    ) {
        for bus in DiskBus::ALL {
            for index in 0..bus.slot_count() {
                let slot = DiskSlot::new_unchecked(bus, index);
                let desired = self.get(slot);
                let current_device = current.and_then(|c| c.get(slot));
                match (desired, current_device) {
                    (Some(desired), Some(current_device)) => {
                        if desired.write_needed(current_device) {
                            params.insert(
                                slot.config_key(),
                                desired.encode_against(current_device).into(),
                            );
                        }
                    }
                    (Some(desired), None) => {
                        params.insert(slot.config_key(), desired.to_api().into());
                    }
                    (None, Some(_)) => deletes.push(slot.config_key()),
                    (None, None) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(bus: DiskBus, index: u8) -> DiskSlot {
        DiskSlot::new_unchecked(bus, index)
    }

    fn disk_at(storages: &mut QemuStorages, s: DiskSlot, disk: QemuDisk) {
        storages.set(s, QemuStorage::Disk(disk));
    }

    #[test]
    fn test_slot_bounds() {
        assert!(DiskSlot::new(DiskBus::Ide, 3).is_ok());
        assert!(DiskSlot::new(DiskBus::Ide, 4).is_err());
        assert!(DiskSlot::new(DiskBus::Scsi, 30).is_ok());
        assert!(DiskSlot::new(DiskBus::Scsi, 31).is_err());
        assert!(DiskSlot::new(DiskBus::Virtio, 16).is_err());
        assert!(DiskSlot::new(DiskBus::Sata, 6).is_err());
    }

    #[test]
    fn test_disk_create_encoding() {
        let mut disk = QemuDisk::new("local-lvm", DiskSize::from_gib(32));
        disk.ssd = true;
        disk.discard = true;
        disk.backup = false;
        assert_eq!(disk.to_api(), "local-lvm:32,discard=on,ssd=1,backup=0");
    }

    #[test]
    fn test_disk_decode_materialized() {
        let raw = "local-lvm:vm-100-disk-0,iothread=1,size=32G,ssd=1";
        let QemuStorage::Disk(disk) = QemuStorage::from_api(raw).unwrap() else {
            panic!("expected a disk");
        };
        assert_eq!(disk.storage, "local-lvm");
        assert_eq!(disk.size, DiskSize::from_gib(32));
        assert!(disk.io_thread);
        assert!(disk.ssd);
        assert!(disk.backup, "backup defaults to on");
        assert_eq!(disk.volume.as_deref(), Some("local-lvm:vm-100-disk-0"));
    }

    #[test]
    fn test_disk_round_trip() {
        let raw = "local-lvm:vm-100-disk-0,size=32G,cache=writeback,discard=on,iothread=1";
        let device = QemuStorage::from_api(raw).unwrap();
        let reencoded = device.to_api();
        assert_eq!(QemuStorage::from_api(&reencoded).unwrap(), device);
    }

    #[test]
    fn test_cdrom_decode_and_encode() {
        let device = QemuStorage::from_api("local:iso/debian-12.iso,media=cdrom").unwrap();
        let QemuStorage::CdRom(cdrom) = &device else {
            panic!("expected a cdrom");
        };
        assert_eq!(cdrom.iso.as_ref().unwrap().file, "iso/debian-12.iso");
        assert_eq!(device.to_api(), "local:iso/debian-12.iso,media=cdrom");

        let empty = QemuStorage::from_api("none,media=cdrom").unwrap();
        assert_eq!(empty, QemuStorage::CdRom(QemuCdRom::default()));
    }

    #[test]
    fn test_cloud_init_decode() {
        let device =
            QemuStorage::from_api("local-lvm:vm-100-cloudinit,media=cdrom,size=4M").unwrap();
        let QemuStorage::CloudInit(drive) = &device else {
            panic!("expected a cloud-init drive");
        };
        assert_eq!(drive.storage, "local-lvm");
    }

    #[test]
    fn test_shrink_rejected() {
        let mut current = QemuStorages::default();
        disk_at(
            &mut current,
            slot(DiskBus::Scsi, 0),
            QemuDisk::new("local-lvm", DiskSize::from_gib(10)),
        );
        let mut desired = QemuStorages::default();
        disk_at(
            &mut desired,
            slot(DiskBus::Scsi, 0),
            QemuDisk::new("local-lvm", DiskSize::from_gib(5)),
        );
        let err = desired.validate(Some(&current)).unwrap_err();
        assert!(err.to_string().contains("shrink"), "got: {err}");
    }

    #[test]
    fn test_growth_is_resize_not_write() {
        let mut current = QemuStorages::default();
        let mut current_disk = QemuDisk::new("local-lvm", DiskSize::from_gib(10));
        current_disk.volume = Some("local-lvm:vm-100-disk-0".to_string());
        disk_at(&mut current, slot(DiskBus::Scsi, 0), current_disk);

        let mut desired = QemuStorages::default();
        disk_at(
            &mut desired,
            slot(DiskBus::Scsi, 0),
            QemuDisk::new("local-lvm", DiskSize::from_gib(20)),
        );

        let changes = desired.mark_changes(&current);
        assert!(changes.moves.is_empty());
        assert_eq!(changes.resizes.len(), 1);
        assert_eq!(changes.resizes[0].growth, "+10G");

        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        desired.map_to_api(Some(&current), &mut params, &mut deletes);
        assert!(params.is_empty(), "growth must not appear in the PUT: {params:?}");
        assert!(deletes.is_empty());
    }

    #[test]
    fn test_storage_change_is_move() {
        let mut current = QemuStorages::default();
        disk_at(
            &mut current,
            slot(DiskBus::Scsi, 0),
            QemuDisk::new("local-lvm", DiskSize::from_gib(10)),
        );
        let mut desired = QemuStorages::default();
        disk_at(
            &mut desired,
            slot(DiskBus::Scsi, 0),
            QemuDisk::new("ceph-rbd", DiskSize::from_gib(10)),
        );

        let changes = desired.mark_changes(&current);
        assert_eq!(changes.moves.len(), 1);
        assert_eq!(changes.moves[0].target_storage, "ceph-rbd");
        assert!(changes.moves[0].delete_source);
    }

    #[test]
    fn test_attribute_change_rewrites_in_place() {
        let mut current = QemuStorages::default();
        let mut current_disk = QemuDisk::new("local-lvm", DiskSize::from_gib(10));
        current_disk.volume = Some("local-lvm:vm-100-disk-0".to_string());
        disk_at(&mut current, slot(DiskBus::Scsi, 0), current_disk);

        let mut desired = QemuStorages::default();
        let mut desired_disk = QemuDisk::new("local-lvm", DiskSize::from_gib(10));
        desired_disk.io_thread = true;
        disk_at(&mut desired, slot(DiskBus::Scsi, 0), desired_disk);

        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        desired.map_to_api(Some(&current), &mut params, &mut deletes);
        assert_eq!(
            params["scsi0"],
            "local-lvm:vm-100-disk-0,size=10G,iothread=1"
        );
    }

    #[test]
    fn test_unchanged_emits_nothing() {
        let mut current = QemuStorages::default();
        let mut disk = QemuDisk::new("local-lvm", DiskSize::from_gib(10));
        disk.volume = Some("local-lvm:vm-100-disk-0".to_string());
        disk_at(&mut current, slot(DiskBus::Scsi, 0), disk);

        let mut desired = QemuStorages::default();
        disk_at(
            &mut desired,
            slot(DiskBus::Scsi, 0),
            QemuDisk::new("local-lvm", DiskSize::from_gib(10)),
        );

        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        desired.map_to_api(Some(&current), &mut params, &mut deletes);
        assert!(params.is_empty());
        assert!(deletes.is_empty());
    }

    #[test]
    fn test_vanished_slot_deleted() {
        let mut current = QemuStorages::default();
        disk_at(
            &mut current,
            slot(DiskBus::Virtio, 1),
            QemuDisk::new("local-lvm", DiskSize::from_gib(10)),
        );
        let desired = QemuStorages::default();

        let mut params = Params::new();
        let mut deletes = DeleteList::new();
        desired.map_to_api(Some(&current), &mut params, &mut deletes);
        assert_eq!(deletes.to_param(), "virtio1");
    }

    #[test]
    fn test_cloud_init_replacement_marked() {
        let mut current = QemuStorages::default();
        current.set(
            slot(DiskBus::Ide, 2),
            QemuStorage::CloudInit(CloudInitDrive::new("local-lvm")),
        );
        let mut desired = QemuStorages::default();
        desired.set(
            slot(DiskBus::Ide, 2),
            QemuStorage::CloudInit(CloudInitDrive::new("ceph-rbd")),
        );

        let changes = desired.mark_changes(&current);
        assert_eq!(changes.cloud_init_removes.to_param(), "ide2");

        // unchanged drive stays put
        let unchanged = current.mark_changes(&current);
        assert!(unchanged.cloud_init_removes.is_empty());
    }

    #[test]
    fn test_unused_reattach_uses_volume() {
        let mut disk = QemuDisk::new("local-lvm", DiskSize::from_gib(8));
        disk.volume = Some("local-lvm:vm-100-disk-3".to_string());
        assert_eq!(disk.to_api(), "local-lvm:vm-100-disk-3,size=8G");
    }
}
