mod agent;
mod cloud_init;
mod cpu;
mod efi;
mod ha;
mod hotplug;
mod memory;
mod network;
mod pci;
mod proxmox_auth;
mod proxmox_connection;
mod rng;
mod serial;
mod storage;
mod tpm;
mod usb;
mod version;
mod vga;
mod vm;
mod vm_config;
mod vm_ref;

pub use agent::QemuGuestAgent;
pub use cloud_init::{CloudInit, CloudInitIpConfig};
pub use cpu::{CpuFlag, QemuCpu};
pub use efi::{EfiDisk, EfiType};
pub use ha::HaState;
pub use hotplug::Hotplug;
pub use memory::QemuMemory;
pub use network::{MacAddress, QemuNetworkInterface, QemuNetworkInterfaces};
pub use pci::{HostPci, PciId, QemuPciDevices};
pub use proxmox_auth::ProxmoxAuth;
pub use proxmox_connection::ProxmoxConnection;
pub use rng::{RngSource, VirtioRng};
pub use serial::{SerialId, SerialInterface, SerialInterfaces};
pub use storage::{
    CloudInitDrive, DiskAio, DiskBus, DiskCache, DiskChanges, DiskFormat, DiskMove, DiskResize,
    DiskSlot, IsoFile, QemuCdRom, QemuDisk, QemuStorage, QemuStorages, UnusedDisk,
};
pub use tpm::{TpmChange, TpmState, TpmVersion};
pub use usb::{QemuUsb, QemuUsbs, UsbId};
pub use version::{Version, VersionInfo};
pub use vga::QemuVga;
pub use vm::{GuestResource, PendingChange, PoolRow, VmStatusCurrent};
pub use vm_config::{Bios, VmConfig};
pub use vm_ref::VmRef;
