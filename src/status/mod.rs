use crate::boot_state;
use crate::config::GpuManagerConfig;
use crate::decide::DriverFlags;
use crate::detect::KernelCmdline;
use crate::device::Snapshot;
use crate::platform::Platform;
use crate::platform::xorg::{OFFLOAD_SERVERLAYOUT, PRIME_OUTPUTCLASS};
use crate::preference::PrimeMode;
use crate::run::{self, RunOptions};
use crate::sysfs::SysfsRoot;
use serde::Serialize;

/// A generated file and whether it is currently on disk.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
}

impl FileStatus {
    fn check(path: &std::path::Path) -> Self {
        Self {
            path: path.display().to_string(),
            exists: path.exists(),
        }
    }
}

/// What a boot pass would see right now.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub timestamp: String,
    pub disabled_by_kernel_parameter: bool,
    pub current: Snapshot,
    /// None before the first boot pass.
    pub previous: Option<Snapshot>,
    pub changed: bool,
    pub requires_offloading: bool,
    pub prime_mode: PrimeMode,
    pub flags: DriverFlags,
    pub offloading_marker: FileStatus,
    pub prime_config: FileStatus,
    pub offload_config: FileStatus,
}

impl StatusReport {
    pub fn boot_display_vendor(&self) -> Option<String> {
        self.current.boot_display().map(|d| d.vendor.to_string())
    }
}

/// Gather the report without writing anything.
pub fn check(
    sysfs: &SysfsRoot,
    config: &GpuManagerConfig,
    platform: &impl Platform,
    options: &RunOptions,
) -> crate::error::Result<StatusReport> {
    let paths = &config.paths;
    let current = run::current_snapshot(sysfs, options)?;
    let previous = boot_state::load_existing(&paths.last_boot_file)?;
    let changed = previous
        .as_ref()
        .is_some_and(|p| current.has_changed_since(p));

    Ok(StatusReport {
        timestamp: chrono::Local::now().to_rfc3339(),
        disabled_by_kernel_parameter: KernelCmdline::detect(sysfs).is_disabled(),
        requires_offloading: run::offloading(&current, options),
        current,
        previous,
        changed,
        prime_mode: PrimeMode::load(&paths.prime_settings),
        flags: run::probe_flags(platform, config, options),
        offloading_marker: FileStatus::check(&paths.offloading_conf),
        prime_config: FileStatus::check(&paths.xorg_conf_d.join(PRIME_OUTPUTCLASS)),
        offload_config: FileStatus::check(&paths.xorg_conf_d.join(OFFLOAD_SERVERLAYOUT)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::recording::RecordingPlatform;
    use std::fs;

    fn config_in(root: &std::path::Path) -> GpuManagerConfig {
        let mut config = GpuManagerConfig::default();
        config.paths.last_boot_file = root.join("last_gfx_boot");
        config.paths.prime_settings = root.join("prime-discrete");
        config.paths.offloading_conf = root.join("requires_offloading");
        config.paths.xorg_conf_d = root.join("xorg.conf.d");
        config.paths.amdgpu_pro_px = root.join("amdgpu-pro-px");
        config
    }

    #[test]
    fn test_check_is_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let fake = tmp.path().join("fake-lspci");
        fs::write(&fake, "8086:3e9b;0000:00:02:0;1\n10de:1f91;0000:01:00:0;0\n").unwrap();
        let options = RunOptions {
            fake_lspci: Some(fake),
            fake_offloading: Some(true),
            ..RunOptions::default()
        };

        let report = check(
            &SysfsRoot::new(tmp.path()),
            &config,
            &RecordingPlatform::new(),
            &options,
        )
        .unwrap();

        assert_eq!(report.current.len(), 2);
        assert!(report.previous.is_none());
        assert!(!report.changed);
        assert!(report.requires_offloading);
        assert_eq!(report.prime_mode, PrimeMode::Off);
        assert_eq!(report.boot_display_vendor().as_deref(), Some("Intel"));
        assert!(!report.prime_config.exists);
        assert!(!config.paths.last_boot_file.exists());
    }

    #[test]
    fn test_check_reports_change() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        fs::write(&config.paths.last_boot_file, "8086:3e9b;0000:00:02:0;1\n").unwrap();
        let fake = tmp.path().join("fake-lspci");
        fs::write(&fake, "8086:3e9b;0000:00:02:0;1\n10de:1f91;0000:01:00:0;0\n").unwrap();
        let options = RunOptions {
            fake_lspci: Some(fake),
            ..RunOptions::default()
        };

        let report = check(
            &SysfsRoot::new(tmp.path()),
            &config,
            &RecordingPlatform::new(),
            &options,
        )
        .unwrap();
        assert!(report.changed);
        assert_eq!(report.previous.unwrap().len(), 1);

        let json = serde_json::to_value(&report.flags).unwrap();
        assert_eq!(json["nvidia_loaded"], false);
    }
}
