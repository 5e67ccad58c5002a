use crate::device::{OutputState, Snapshot, Vendor};

/// Render offload is only advertised when the boot display is an Intel IGP
/// that actually drives a connected output. Offloading to any other driver,
/// or to an IGP without a screen, is refused.
pub fn should_offload(snapshot: &Snapshot) -> bool {
    snapshot
        .boot_display()
        .is_some_and(|d| d.vendor == Vendor::Intel && d.output == OutputState::Connected)
}
