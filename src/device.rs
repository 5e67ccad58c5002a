//! Graphics controller records and the per-boot snapshot they live in.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Cards beyond this many are dropped during enumeration or decoding.
pub const MAX_CARDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    Amd,
    Intel,
    Nvidia,
    Other(u32),
}

impl Vendor {
    pub const AMD_ID: u32 = 0x1002;
    pub const INTEL_ID: u32 = 0x8086;
    pub const NVIDIA_ID: u32 = 0x10de;

    pub fn from_id(id: u32) -> Self {
        match id {
            Self::AMD_ID => Vendor::Amd,
            Self::INTEL_ID => Vendor::Intel,
            Self::NVIDIA_ID => Vendor::Nvidia,
            other => Vendor::Other(other),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            Vendor::Amd => Self::AMD_ID,
            Vendor::Intel => Self::INTEL_ID,
            Vendor::Nvidia => Self::NVIDIA_ID,
            Vendor::Other(id) => id,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::Amd => write!(f, "AMD"),
            Vendor::Intel => write!(f, "Intel"),
            Vendor::Nvidia => write!(f, "NVIDIA"),
            Vendor::Other(id) => write!(f, "{:04x}", id),
        }
    }
}

/// Whether a controller drives at least one connected display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputState {
    #[default]
    Unknown,
    Disconnected,
    Connected,
}

/// One graphics controller. Identity is the PCI address; vendor and device
/// id only describe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub vendor: Vendor,
    pub device_id: u16,
    pub domain: u32,
    pub bus: u32,
    pub dev: u32,
    pub func: u32,
    pub is_boot_display: bool,
    pub output: OutputState,
}

impl Device {
    /// sysfs-style address, e.g. `0000:01:00.0`.
    pub fn pci_address(&self) -> String {
        format!(
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.dev, self.func
        )
    }

    fn same_address(&self, other: &Device) -> bool {
        (self.domain, self.bus, self.dev, self.func)
            == (other.domain, other.bus, other.dev, other.func)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} at PCI {}{}",
            self.vendor.id(),
            self.device_id,
            self.pci_address(),
            if self.is_boot_display { " (boot vga)" } else { "" }
        )
    }
}

/// Ordered set of controllers seen at one point in time, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    cards: Vec<Device>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a card. Returns false, leaving the snapshot unchanged, when the
    /// snapshot is already at [`MAX_CARDS`].
    pub fn push(&mut self, device: Device) -> bool {
        if self.cards.len() >= MAX_CARDS {
            warn!(
                "Warning: too many devices. Max supported {}. Ignoring {}",
                MAX_CARDS, device
            );
            return false;
        }
        self.cards.push(device);
        true
    }

    pub fn cards(&self) -> &[Device] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.cards.len() >= MAX_CARDS
    }

    /// First card the firmware initialised as the primary VGA device.
    pub fn boot_display(&self) -> Option<&Device> {
        self.cards.iter().find(|d| d.is_boot_display)
    }

    /// First card that is not the boot display. Only meaningful as "the
    /// discrete GPU" when exactly one such card exists.
    pub fn first_discrete(&self) -> Option<&Device> {
        self.cards.iter().find(|d| !d.is_boot_display)
    }

    pub fn contains_vendor(&self, vendor: Vendor) -> bool {
        self.cards.iter().any(|d| d.vendor == vendor)
    }

    /// Positional comparison against the previous boot. Reordering counts as
    /// a change; the output state is ignored.
    pub fn has_changed_since(&self, previous: &Snapshot) -> bool {
        if previous.len() != self.len() {
            info!("The number of cards has changed!");
            return true;
        }

        previous.cards.iter().zip(&self.cards).any(|(old, new)| {
            old.is_boot_display != new.is_boot_display
                || old.vendor != new.vendor
                || old.device_id != new.device_id
                || !old.same_address(new)
        })
    }
}

impl FromIterator<Device> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for device in iter {
            if !snapshot.push(device) {
                break;
            }
        }
        snapshot
    }
}

#[cfg(test)]
pub(crate) fn card(vendor: Vendor, device_id: u16, bus: u32, boot: bool) -> Device {
    Device {
        vendor,
        device_id,
        domain: 0,
        bus,
        dev: 0,
        func: 0,
        is_boot_display: boot,
        output: OutputState::Unknown,
    }
}
