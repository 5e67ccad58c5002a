//! In-memory platform that records every side effect, for unit tests of the
//! mode engine and orchestrator.

use super::{Probe, PxAction, Removal, SystemActions, XorgConfig};
use crate::device::Device;
use nix::unistd::Pid;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    PublishOffload,
    PublishAlwaysDiscrete,
    RemoveOffload,
    RemoveAlwaysDiscrete,
    RuntimePm { address: String, auto: bool },
    Load(String),
    Unload(String),
    Terminate(String),
    Helper(PxAction),
    SetOffloading,
    ClearOffloading,
}

#[derive(Debug, Default)]
pub struct RecordingPlatform {
    pub loaded: BTreeSet<String>,
    /// Modules whose unload fails while a display session holds them.
    pub stuck: BTreeSet<String>,
    /// Backends that have a killable greeter session.
    pub sessions: Vec<String>,
    /// Killing a session releases the stuck modules.
    pub kill_releases: bool,
    pub blacklisted: BTreeSet<String>,
    pub available: BTreeSet<String>,
    pub versioned: BTreeSet<String>,
    pub unloaded: BTreeSet<String>,
    pub disabled: Vec<Device>,
    pub offload_config: bool,
    pub always_discrete_config: bool,
    pub helper_ok: bool,
    pub calls: Vec<Call>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            helper_ok: true,
            ..Self::default()
        }
    }

    pub fn with_loaded(mut self, modules: &[&str]) -> Self {
        self.loaded.extend(modules.iter().map(|m| m.to_string()));
        self
    }

    pub fn terminations(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Terminate(_)))
            .count()
    }

    pub fn unload_attempts(&self, module: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Unload(m) if m == module))
            .count()
    }
}

impl Probe for RecordingPlatform {
    fn is_loaded(&self, module: &str) -> bool {
        self.loaded.contains(module)
    }

    fn is_blacklisted(&self, module: &str) -> bool {
        self.blacklisted.contains(module)
    }

    fn is_available(&self, module: &str) -> bool {
        self.available.contains(module)
    }

    fn is_versioned(&self, module: &str) -> bool {
        self.versioned.contains(module)
    }

    fn was_unloaded(&self, module: &str) -> bool {
        self.unloaded.contains(module) && !self.loaded.contains(module)
    }

    fn disabled_cards(&self) -> Vec<Device> {
        self.disabled.clone()
    }
}

impl SystemActions for RecordingPlatform {
    fn load_module(&mut self, module: &str) -> bool {
        self.calls.push(Call::Load(module.to_string()));
        self.loaded.insert(module.to_string());
        true
    }

    fn unload_module(&mut self, module: &str) -> bool {
        self.calls.push(Call::Unload(module.to_string()));
        if self.stuck.contains(module) {
            return false;
        }
        self.loaded.remove(module)
    }

    fn terminate_session(&mut self, backend: &str) -> Option<Pid> {
        self.calls.push(Call::Terminate(backend.to_string()));
        if !self.sessions.iter().any(|s| s == backend) {
            return None;
        }
        if self.kill_releases {
            self.stuck.clear();
        }
        Some(Pid::from_raw(4242))
    }

    fn run_vendor_helper(&mut self, action: PxAction) -> bool {
        self.calls.push(Call::Helper(action));
        self.helper_ok
    }

    fn set_runtime_pm(&mut self, device: &Device, auto: bool) -> bool {
        self.calls.push(Call::RuntimePm {
            address: device.pci_address(),
            auto,
        });
        true
    }

    fn set_offloading(&mut self) -> bool {
        self.calls.push(Call::SetOffloading);
        true
    }

    fn clear_offloading(&mut self) {
        self.calls.push(Call::ClearOffloading);
    }
}

fn removal(present: &mut bool) -> Removal {
    if std::mem::take(present) {
        Removal::Removed
    } else {
        Removal::NotFound
    }
}

impl XorgConfig for RecordingPlatform {
    fn publish_offload_config(&mut self) -> bool {
        self.calls.push(Call::PublishOffload);
        self.offload_config = true;
        true
    }

    fn publish_always_discrete_config(&mut self) -> bool {
        self.calls.push(Call::PublishAlwaysDiscrete);
        self.always_discrete_config = true;
        true
    }

    fn remove_offload_config(&mut self) -> Removal {
        self.calls.push(Call::RemoveOffload);
        removal(&mut self.offload_config)
    }

    fn remove_always_discrete_config(&mut self) -> Removal {
        self.calls.push(Call::RemoveAlwaysDiscrete);
        removal(&mut self.always_discrete_config)
    }
}
