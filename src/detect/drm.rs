use crate::device::OutputState;
use crate::sysfs::SysfsRoot;
use tracing::{debug, info};

const DRM_CLASS: &str = "sys/class/drm";

/// First DRM card whose kernel driver name contains `driver`, e.g. `card0`.
/// Substring matching catches backported builds such as `amdgpu-pro`.
pub fn find_card(sysfs: &SysfsRoot, driver: &str) -> Option<String> {
    let entries = sysfs.list_dir(DRM_CLASS).ok()?;
    for entry in entries {
        if !entry.starts_with("card") || entry.contains('-') {
            continue;
        }
        let Some(bound) = sysfs.link_name(format!("{}/{}/device/driver", DRM_CLASS, entry)) else {
            continue;
        };
        if bound.contains(driver) {
            info!("Found \"{}\", driven by \"{}\"", entry, bound);
            return Some(entry);
        }
        debug!("Skipping \"{}\", driven by \"{}\"", entry, bound);
    }
    None
}

/// Connectors of `card` whose status reads `connected`.
pub fn connected_outputs(sysfs: &SysfsRoot, card: &str) -> Vec<String> {
    let prefix = format!("{}-", card);
    let Ok(entries) = sysfs.list_dir(DRM_CLASS) else {
        return Vec::new();
    };

    entries
        .into_iter()
        .filter(|entry| entry.starts_with(&prefix))
        .filter(|entry| {
            sysfs
                .read_optional(format!("{}/{}/status", DRM_CLASS, entry))
                .ok()
                .flatten()
                .and_then(|status| status.split_whitespace().next().map(str::to_owned))
                .is_some_and(|token| token.starts_with("connected"))
        })
        .collect()
}

/// Output state of the card driven by `driver`. `Unknown` when no DRM card
/// belongs to that driver.
pub fn driver_outputs(sysfs: &SysfsRoot, driver: &str) -> OutputState {
    let Some(card) = find_card(sysfs, driver) else {
        return OutputState::Unknown;
    };

    let outputs = connected_outputs(sysfs, &card);
    for (i, output) in outputs.iter().enumerate() {
        debug!("output {}: {}", i, output);
    }
    info!(
        "Number of connected outputs for {}: {}",
        card,
        outputs.len()
    );

    if outputs.is_empty() {
        OutputState::Disconnected
    } else {
        OutputState::Connected
    }
}
