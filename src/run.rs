//! One boot pass: probe, enumerate, compare with the last boot, decide, act.

use crate::boot_state::{self, LoadOutcome};
use crate::config::GpuManagerConfig;
use crate::decide::{self, Context, DriverFlags, Outcome};
use crate::detect::{self, KernelCmdline};
use crate::device::Snapshot;
use crate::error::{Error, Result};
use crate::offload;
use crate::platform::Platform;
use crate::sysfs::SysfsRoot;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Test hooks that replace parts of the live system.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Read the current snapshot from a boot-state formatted file instead of
    /// scanning the PCI bus.
    pub fake_lspci: Option<PathBuf>,
    pub fake_offloading: Option<bool>,
    /// Override dkms availability of both nvidia and amdgpu.
    pub fake_module_available: Option<bool>,
    pub fake_module_versioned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed { outcome: Outcome, changed: bool },
    DisabledByKernelParameter,
}

impl RunStatus {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Completed { .. } => 0,
            RunStatus::DisabledByKernelParameter => 2,
        }
    }
}

/// Exit code for a pass that stopped on an [`Error`].
pub const FAILURE_EXIT_CODE: u8 = 1;

/// True when the vendor helper is installed: present and not empty.
pub fn helper_installed(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Sample the driver stack, applying any fake overrides.
pub fn probe_flags(platform: &impl Platform, config: &GpuManagerConfig, options: &RunOptions) -> DriverFlags {
    let mut flags = DriverFlags::probe(platform, helper_installed(&config.paths.amdgpu_pro_px));
    if let Some(available) = options.fake_module_available {
        flags.nvidia_kmod_available = available;
        flags.amdgpu_kmod_available = available;
    }
    if options.fake_module_versioned {
        flags.amdgpu_versioned = true;
    }
    flags
}

/// The controllers present now, from the PCI bus or the fake file.
pub fn current_snapshot(sysfs: &SysfsRoot, options: &RunOptions) -> Result<Snapshot> {
    match &options.fake_lspci {
        Some(path) => match boot_state::load_existing(path)? {
            Some(snapshot) => Ok(snapshot),
            None => Err(Error::Detection(format!("can't read {}", path.display()))),
        },
        None => detect::enumerate(sysfs),
    }
}

/// Whether render offloading applies. The fake flag only takes effect
/// together with a fake snapshot, whose outputs are always unknown.
pub fn offloading(current: &Snapshot, options: &RunOptions) -> bool {
    match (&options.fake_lspci, options.fake_offloading) {
        (Some(_), fake) => fake.unwrap_or(false),
        (None, _) => offload::should_offload(current),
    }
}

pub fn run<P: Platform>(
    sysfs: &SysfsRoot,
    config: &GpuManagerConfig,
    platform: &mut P,
    options: &RunOptions,
) -> Result<RunStatus> {
    let cmdline = KernelCmdline::detect(sysfs);
    if cmdline.is_disabled() {
        info!("Disabled by the \"{}\" kernel parameter", detect::DISABLE_PARAM);
        return Ok(RunStatus::DisabledByKernelParameter);
    }

    let flags = probe_flags(&*platform, config, options);
    flags.log();
    cmdline.report_intel_driver();

    let current = current_snapshot(sysfs, options)?;
    let offloading = offloading(&current, options);
    info!(
        "Does it require offloading? {}",
        if offloading { "yes" } else { "no" }
    );
    if !offloading {
        platform.clear_offloading();
    }

    let paths = &config.paths;
    let (previous, loaded) = boot_state::load_or_create(&paths.last_boot_file)?;
    info!("last cards number = {}", previous.len());

    boot_state::save(paths.new_boot_file(), &current)?;

    // A freshly seeded file only holds the placeholder, which says nothing
    // about the previous boot.
    let changed = loaded == LoadOutcome::Read && current.has_changed_since(&previous);
    info!(
        "Has the system changed? {}",
        if changed { "Yes" } else { "No" }
    );
    if changed {
        info!("System configuration has changed");
    }

    let ctx = Context {
        current: &current,
        changed,
        offloading,
        flags: &flags,
        prime_settings: &paths.prime_settings,
        backends: &config.session.backends,
    };
    let outcome = decide::decide(platform, &ctx);
    Ok(RunStatus::Completed { outcome, changed })
}
