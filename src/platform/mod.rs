//! Everything the decision logic needs from the running system, behind three
//! traits so the mode engine and orchestrator can be driven by a recording
//! double in tests.

pub mod helper;
pub mod modules;
#[cfg(test)]
pub(crate) mod recording;
pub mod session;
pub mod xorg;

use crate::config::{GpuManagerConfig, PathsConfig, SessionConfig};
use crate::device::{Device, Snapshot};
use crate::sysfs::SysfsRoot;
use nix::unistd::Pid;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of deleting a generated configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    Removed,
    NotFound,
    Failed,
}

/// Actions understood by the AMD switchable-graphics helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PxAction {
    PowerSaving,
    Reset,
}

/// Read-only queries about kernel modules and leftover markers.
pub trait Probe {
    fn is_loaded(&self, module: &str) -> bool;
    fn is_blacklisted(&self, module: &str) -> bool;
    /// A build of `module` exists for the running kernel.
    fn is_available(&self, module: &str) -> bool;
    fn is_versioned(&self, module: &str) -> bool;
    /// `module` was loaded earlier in this boot and has since gone away.
    fn was_unloaded(&self, module: &str) -> bool;
    /// Cards that were powered off before enumeration and only survive as
    /// marker files.
    fn disabled_cards(&self) -> Vec<Device>;
}

/// Side effects on the running system. Failures are reported, never raised.
pub trait SystemActions {
    fn load_module(&mut self, module: &str) -> bool;
    fn unload_module(&mut self, module: &str) -> bool;
    /// Kill the greeter session of `backend`, returning its PID when one was
    /// found.
    fn terminate_session(&mut self, backend: &str) -> Option<Pid>;
    fn run_vendor_helper(&mut self, action: PxAction) -> bool;
    /// `auto` lets the PCI device runtime-suspend, `on` keeps it powered.
    fn set_runtime_pm(&mut self, device: &Device, auto: bool) -> bool;
    fn set_offloading(&mut self) -> bool;
    fn clear_offloading(&mut self);
}

/// Display-server snippets selecting how the NVIDIA GPU is used.
pub trait XorgConfig {
    fn publish_offload_config(&mut self) -> bool;
    fn publish_always_discrete_config(&mut self) -> bool;
    fn remove_offload_config(&mut self) -> Removal;
    fn remove_always_discrete_config(&mut self) -> Removal;
}

pub trait Platform: Probe + SystemActions + XorgConfig {}

impl<T: Probe + SystemActions + XorgConfig> Platform for T {}

/// The real system: sysfs/procfs under a root, external commands, files
/// from the configured paths.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    sysfs: SysfsRoot,
    paths: PathsConfig,
    session: SessionConfig,
    dry_run: bool,
    modules_file: Option<PathBuf>,
    xorg: xorg::XorgConfDir,
}

impl LinuxPlatform {
    pub fn new(sysfs: SysfsRoot, config: &GpuManagerConfig) -> Self {
        Self {
            sysfs,
            paths: config.paths.clone(),
            session: config.session.clone(),
            dry_run: false,
            modules_file: None,
            xorg: xorg::XorgConfDir::new(&config.paths.xorg_conf_d),
        }
    }

    /// Log module, process and power actions instead of performing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Read loaded modules from `path` instead of `/proc/modules`.
    pub fn with_modules_file(mut self, path: Option<PathBuf>) -> Self {
        self.modules_file = path;
        self
    }

    /// Skip the `dpkg-architecture` lookup for the prime OutputClass.
    pub fn with_multiarch(mut self, multiarch: impl Into<String>) -> Self {
        self.xorg = self.xorg.with_multiarch(multiarch);
        self
    }

    pub fn sysfs(&self) -> &SysfsRoot {
        &self.sysfs
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn modules_list(&self) -> PathBuf {
        self.modules_file
            .clone()
            .unwrap_or_else(|| self.sysfs.path("proc/modules"))
    }
}

impl Probe for LinuxPlatform {
    fn is_loaded(&self, module: &str) -> bool {
        modules::is_loaded(&self.modules_list(), module)
    }

    fn is_blacklisted(&self, module: &str) -> bool {
        modules::is_blacklisted(&self.sysfs, &self.paths.modprobe_d, module)
    }

    fn is_available(&self, module: &str) -> bool {
        modules::is_available(&self.sysfs, module)
    }

    fn is_versioned(&self, module: &str) -> bool {
        if self.dry_run {
            return false;
        }
        modules::version(module).is_some()
    }

    fn was_unloaded(&self, module: &str) -> bool {
        let marker = self
            .paths
            .gpu_detection_path
            .join(format!("u-d-c-{}-was-loaded", module));
        if marker.is_file() && !self.is_loaded(module) {
            info!("{} was unloaded", module);
            return true;
        }
        false
    }

    fn disabled_cards(&self) -> Vec<Device> {
        modules::find_disabled_cards(&self.paths.gpu_detection_path)
    }
}

impl SystemActions for LinuxPlatform {
    fn load_module(&mut self, module: &str) -> bool {
        helper::modprobe(module, self.dry_run)
    }

    fn unload_module(&mut self, module: &str) -> bool {
        helper::rmmod(module, self.dry_run)
    }

    fn terminate_session(&mut self, backend: &str) -> Option<Pid> {
        let pid = session::find_greeter_session(&self.sysfs, backend, &self.session.greeter_user)?;
        if self.dry_run {
            info!("Dry run: not killing {} session {}", backend, pid);
            return Some(pid);
        }
        session::kill(pid).then_some(pid)
    }

    fn run_vendor_helper(&mut self, action: PxAction) -> bool {
        helper::run_amdgpu_pro_px(&self.paths.amdgpu_pro_px, action, self.dry_run)
    }

    fn set_runtime_pm(&mut self, device: &Device, auto: bool) -> bool {
        let value = if auto { "auto" } else { "on" };
        let path = format!("sys/bus/pci/devices/{}/power/control", device.pci_address());
        info!(
            "Setting power control to \"{}\" in {}",
            value,
            self.sysfs.path(&path).display()
        );
        if self.dry_run {
            return true;
        }
        match self.sysfs.write(&path, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("Error while writing power control: {}", e);
                false
            }
        }
    }

    fn set_offloading(&mut self) -> bool {
        if self.dry_run {
            return true;
        }
        match std::fs::write(&self.paths.offloading_conf, "ON\n") {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Error writing {}: {}",
                    self.paths.offloading_conf.display(),
                    e
                );
                false
            }
        }
    }

    fn clear_offloading(&mut self) {
        if self.dry_run {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.paths.offloading_conf)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                "Error removing {}: {}",
                self.paths.offloading_conf.display(),
                e
            );
        }
    }
}

impl XorgConfig for LinuxPlatform {
    fn publish_offload_config(&mut self) -> bool {
        self.xorg.create_offload_serverlayout()
    }

    fn publish_always_discrete_config(&mut self) -> bool {
        self.xorg.create_prime_outputclass()
    }

    fn remove_offload_config(&mut self) -> Removal {
        self.xorg.remove_offload_serverlayout()
    }

    fn remove_always_discrete_config(&mut self) -> Removal {
        self.xorg.remove_prime_outputclass()
    }
}

/// Append marker-file cards to `snapshot`, for systems where the discrete
/// GPU was switched off before it could be enumerated.
pub fn add_disabled_cards(probe: &impl Probe, snapshot: &mut Snapshot) {
    for device in probe.disabled_cards() {
        info!("Adding {} to the list", device);
        if !snapshot.push(device) {
            break;
        }
        info!(
            "Successfully detected disabled cards. Total number is {} now",
            snapshot.len()
        );
    }
}
