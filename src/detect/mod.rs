pub mod drm;
pub mod pci;

use crate::device::Snapshot;
use crate::error::Result;
use crate::sysfs::SysfsRoot;
use tracing::info;

/// Kernel parameter that turns the whole boot pass off.
pub const DISABLE_PARAM: &str = "nogpumanager";

/// Enumerate display controllers and attach each one's output state.
pub fn enumerate(sysfs: &SysfsRoot) -> Result<Snapshot> {
    let outputs = pci::DriverOutputs::detect(sysfs);
    let displays = pci::scan(sysfs)?;
    Ok(pci::build_snapshot(displays, &outputs))
}

/// The kernel command line, matched the way boot-time tools traditionally
/// do: case-insensitive substring search.
#[derive(Debug, Clone, Default)]
pub struct KernelCmdline {
    line: String,
}

impl KernelCmdline {
    pub fn detect(sysfs: &SysfsRoot) -> Self {
        Self::from_line(&sysfs.read("proc/cmdline").unwrap_or_default())
    }

    pub fn from_line(line: &str) -> Self {
        Self {
            line: line.to_lowercase(),
        }
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.line.contains(&option.to_lowercase())
    }

    pub fn is_disabled(&self) -> bool {
        self.has_option(DISABLE_PARAM)
    }

    /// Which Intel X driver the user forced, if any.
    pub fn intel_driver_override(&self) -> Option<&'static str> {
        [
            ("gpumanager_modesetting", "modesetting"),
            ("gpumanager_uxa", "Intel/UXA"),
            ("gpumanager_sna", "Intel/SNA"),
        ]
        .into_iter()
        .find(|(param, _)| self.has_option(param))
        .map(|(_, driver)| driver)
    }

    pub fn report_intel_driver(&self) {
        match self.intel_driver_override() {
            Some(driver) => info!("Detected boot parameter to force the {} driver", driver),
            None => info!("No boot parameter to force Intel: Using modesetting driver"),
        }
    }
}
