use crate::device::{Device, OutputState, Snapshot, Vendor};
use crate::sysfs::SysfsRoot;
use tracing::{info, warn};

const PCI_DEVICES: &str = "sys/bus/pci/devices";

/// Base class of VGA, XGA, 3D and other display controllers.
const DISPLAY_CLASS: u32 = 0x03;

/// Drivers that reserve a device for a virtual machine.
const PASSTHROUGH_DRIVERS: [&str; 2] = ["pci-stub", "pciback"];

/// A display-class PCI function as found in sysfs, before vendor-specific
/// output detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciDisplay {
    pub address: String,
    pub vendor_id: u32,
    pub device_id: u16,
    pub domain: u32,
    pub bus: u32,
    pub dev: u32,
    pub func: u32,
    pub boot_vga: bool,
    pub driver: Option<String>,
}

impl PciDisplay {
    pub fn is_passthrough(&self) -> bool {
        self.driver
            .as_deref()
            .is_some_and(|d| PASSTHROUGH_DRIVERS.contains(&d))
    }

    pub fn into_device(self, output: OutputState) -> Device {
        Device {
            vendor: Vendor::from_id(self.vendor_id),
            device_id: self.device_id,
            domain: self.domain,
            bus: self.bus,
            dev: self.dev,
            func: self.func,
            is_boot_display: self.boot_vga,
            output,
        }
    }
}

/// Split `DDDD:BB:DD.F` into its numeric parts.
pub fn parse_address(address: &str) -> Option<(u32, u32, u32, u32)> {
    let (domain, rest) = address.split_once(':')?;
    let (bus, rest) = rest.split_once(':')?;
    let (dev, func) = rest.split_once('.')?;
    Some((
        u32::from_str_radix(domain, 16).ok()?,
        u32::from_str_radix(bus, 16).ok()?,
        u32::from_str_radix(dev, 16).ok()?,
        u32::from_str_radix(func, 16).ok()?,
    ))
}

/// Read one PCI function. None unless it is a display controller.
pub fn read_display(sysfs: &SysfsRoot, address: &str) -> Option<PciDisplay> {
    let base = format!("{}/{}", PCI_DEVICES, address);
    let class = sysfs.read_hex(format!("{}/class", base))?;
    if class >> 16 != DISPLAY_CLASS {
        return None;
    }

    let (domain, bus, dev, func) = parse_address(address)?;
    let vendor_id = sysfs.read_hex(format!("{}/vendor", base))?;
    let device_id = sysfs.read_hex(format!("{}/device", base))?;
    let boot_vga = sysfs
        .read_optional(format!("{}/boot_vga", base))
        .ok()
        .flatten()
        .is_some_and(|v| v == "1");

    Some(PciDisplay {
        address: address.to_string(),
        vendor_id,
        device_id: u16::try_from(device_id).ok()?,
        domain,
        bus,
        dev,
        func,
        boot_vga,
        driver: sysfs.link_name(format!("{}/driver", base)),
    })
}

/// Every display controller on the PCI bus, in address order, passthrough
/// devices excluded.
pub fn scan(sysfs: &SysfsRoot) -> crate::error::Result<Vec<PciDisplay>> {
    let mut found = Vec::new();
    for address in sysfs.list_dir(PCI_DEVICES)? {
        let Some(pci) = read_display(sysfs, &address) else {
            continue;
        };

        info!("Device ID: 0x{:04x}", pci.device_id);
        info!("  Vendor ID: 0x{:04x}", pci.vendor_id);
        info!("  Bus ID: \"{}\"", pci.address);
        info!("  Boot VGA: {}", if pci.boot_vga { "yes" } else { "no" });

        if pci.driver.is_none() {
            info!("The device is not bound to any driver.");
        }
        if pci.is_passthrough() {
            info!("The device is a pci passthrough. Skipping...");
            continue;
        }
        found.push(pci);
    }
    Ok(found)
}

/// Output state of each vendor's driver, sampled once per enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverOutputs {
    pub amdgpu: OutputState,
    pub radeon: OutputState,
    pub nouveau: OutputState,
    pub i915: OutputState,
}

impl DriverOutputs {
    pub fn detect(sysfs: &SysfsRoot) -> Self {
        Self {
            amdgpu: super::drm::driver_outputs(sysfs, "amdgpu"),
            radeon: super::drm::driver_outputs(sysfs, "radeon"),
            nouveau: super::drm::driver_outputs(sysfs, "nouveau"),
            i915: super::drm::driver_outputs(sysfs, "i915"),
        }
    }

    /// AMD cards report radeon when radeon owns a DRM card, amdgpu otherwise.
    pub fn for_vendor(&self, vendor: Vendor) -> OutputState {
        match vendor {
            Vendor::Amd if self.radeon != OutputState::Unknown => self.radeon,
            Vendor::Amd => self.amdgpu,
            Vendor::Intel => self.i915,
            Vendor::Nvidia => self.nouveau,
            Vendor::Other(_) => OutputState::Unknown,
        }
    }
}

/// Build the live snapshot from `displays`, dropping cards past capacity.
pub fn build_snapshot(displays: Vec<PciDisplay>, outputs: &DriverOutputs) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for display in displays {
        let vendor = Vendor::from_id(display.vendor_id);
        if snapshot.is_full() {
            warn!(
                "Warning: too many devices. Max supported {}. Ignoring the rest.",
                crate::device::MAX_CARDS
            );
            break;
        }
        snapshot.push(display.into_device(outputs.for_vendor(vendor)));
    }

    info!("Cards detected: {}", snapshot.len());
    for vendor in [Vendor::Amd, Vendor::Intel, Vendor::Nvidia] {
        info!(
            "  {}: {}",
            vendor,
            if snapshot.contains_vendor(vendor) { "yes" } else { "no" }
        );
    }
    snapshot
}
