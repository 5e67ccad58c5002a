//! On-disk snapshot format shared by the last-boot file and `--fake-lspci`.
//!
//! One line per card, fixed-width and positional:
//!
//! ```text
//! 8086:3e9b;0000:00:02:0;1
//! 10de:1f91;0000:01:00:0;0
//! ```
//!
//! vendor:device;domain:bus:dev:func;boot_vga. Hex everywhere except the
//! function number and the boot flag. The format carries no version marker,
//! so any new field has to arrive as a new format behind this module.

use crate::device::{Device, OutputState, Snapshot, Vendor};
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, info};

/// How [`load_or_create`] obtained its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file existed and was decoded.
    Read,
    /// The file was missing and has just been seeded with a placeholder.
    Created,
}

/// Placeholder record written on the very first boot.
pub const PLACEHOLDER_LINE: &str = "0000:0000;0000:00:00:0;0";

pub fn encode_device(device: &Device) -> String {
    format!(
        "{:04x}:{:04x};{:04x}:{:02x}:{:02x}:{};{}",
        device.vendor.id(),
        device.device_id,
        device.domain,
        device.bus,
        device.dev,
        device.func,
        u8::from(device.is_boot_display)
    )
}

pub fn encode(snapshot: &Snapshot) -> String {
    snapshot
        .cards()
        .iter()
        .map(|d| format!("{}\n", encode_device(d)))
        .collect()
}

/// Parse one line. None unless all seven fields are present and numeric.
pub fn decode_line(line: &str) -> Option<Device> {
    let mut groups = line.trim().split(';');
    let id = groups.next()?;
    let address = groups.next()?;
    let boot_vga = groups.next()?;
    if groups.next().is_some() {
        return None;
    }

    let (vendor, device_id) = id.split_once(':')?;
    let address: Vec<&str> = address.split(':').collect();
    let [domain, bus, dev, func] = address.as_slice() else {
        return None;
    };

    Some(Device {
        vendor: Vendor::from_id(hex(vendor)?),
        device_id: u16::from_str_radix(device_id, 16).ok()?,
        domain: hex(domain)?,
        bus: hex(bus)?,
        dev: hex(dev)?,
        func: func.parse().ok()?,
        is_boot_display: boot_vga.parse::<i32>().ok()? != 0,
        output: OutputState::Unknown,
    })
}

fn hex(field: &str) -> Option<u32> {
    if field.is_empty() {
        return None;
    }
    u32::from_str_radix(field, 16).ok()
}

/// Decode arbitrary text. Unparseable lines are skipped and decoding stops
/// once the snapshot is full, so this never fails.
pub fn decode(text: &str) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if snapshot.is_full() {
            break;
        }
        match decode_line(line) {
            Some(device) => {
                snapshot.push(device);
            }
            None => debug!("Skipping malformed line {:?}", line),
        }
    }
    snapshot
}

/// Read the snapshot at `path`, seeding the file with a single placeholder
/// record when it does not exist yet.
pub fn load_or_create(path: &Path) -> Result<(Snapshot, LoadOutcome)> {
    let outcome = if path.exists() {
        LoadOutcome::Read
    } else {
        info!("I couldn't open {} for reading.", path.display());
        info!("Create {} for the 1st time", path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::BootState {
                path: path.to_path_buf(),
                detail: format!("failed to create directory: {}", e),
            })?;
        }
        std::fs::write(path, format!("{}\n", PLACEHOLDER_LINE)).map_err(|e| {
            Error::BootState {
                path: path.to_path_buf(),
                detail: format!("failed to create: {}", e),
            }
        })?;
        LoadOutcome::Created
    };

    let text = std::fs::read_to_string(path).map_err(|e| Error::BootState {
        path: path.to_path_buf(),
        detail: format!("failed to read: {}", e),
    })?;
    Ok((decode(&text), outcome))
}

/// Read without creating. A missing file reads as an empty snapshot.
pub fn load_existing(path: &Path) -> Result<Option<Snapshot>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(decode(&text))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::BootState {
            path: path.to_path_buf(),
            detail: format!("failed to read: {}", e),
        }),
    }
}

pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    std::fs::write(path, encode(snapshot)).map_err(|e| Error::BootState {
        path: path.to_path_buf(),
        detail: format!("failed to write: {}", e),
    })
}

const MARKER_PREFIX: &str = "u-d-c-gpu-";

/// Parse a disabled-card marker name such as
/// `u-d-c-gpu-0000:09:00.0-0x10de-0x1140`.
pub fn decode_marker_name(name: &str) -> Option<Device> {
    let rest = name.strip_prefix(MARKER_PREFIX)?;
    let mut parts = rest.split('-');
    let address = parts.next()?;
    let vendor = parts.next()?.strip_prefix("0x")?;
    let device_id = parts.next()?.strip_prefix("0x")?;
    if parts.next().is_some() {
        return None;
    }

    let (domain, rest) = address.split_once(':')?;
    let (bus, rest) = rest.split_once(':')?;
    let (dev, func) = rest.split_once('.')?;

    Some(Device {
        vendor: Vendor::from_id(hex(vendor)?),
        device_id: u16::from_str_radix(device_id, 16).ok()?,
        domain: hex(domain)?,
        bus: hex(bus)?,
        dev: hex(dev)?,
        func: func.parse().ok()?,
        is_boot_display: false,
        output: OutputState::Unknown,
    })
}

pub fn is_marker_name(name: &str) -> bool {
    name.starts_with(MARKER_PREFIX)
}
