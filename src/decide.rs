//! The per-boot decision: which single action, if any, this topology and
//! driver state call for.

use crate::device::{Snapshot, Vendor};
use crate::platform::{self, Platform, Probe, PxAction, Removal};
use crate::preference::PrimeMode;
use crate::prime;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Driver stack state sampled once at the start of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverFlags {
    pub nvidia_loaded: bool,
    pub nvidia_unloaded: bool,
    pub nvidia_blacklisted: bool,
    pub intel_loaded: bool,
    pub radeon_loaded: bool,
    pub radeon_blacklisted: bool,
    pub amdgpu_loaded: bool,
    pub amdgpu_blacklisted: bool,
    pub amdgpu_versioned: bool,
    pub amdgpu_pro_px_installed: bool,
    pub nouveau_loaded: bool,
    pub nouveau_blacklisted: bool,
    pub nvidia_kmod_available: bool,
    pub amdgpu_kmod_available: bool,
}

impl DriverFlags {
    pub fn probe(probe: &impl Probe, amdgpu_pro_px_installed: bool) -> Self {
        let nvidia_loaded = probe.is_loaded("nvidia");
        Self {
            nvidia_loaded,
            nvidia_unloaded: !nvidia_loaded && probe.was_unloaded("nvidia"),
            nvidia_blacklisted: probe.is_blacklisted("nvidia"),
            intel_loaded: probe.is_loaded("i915") || probe.is_loaded("i810"),
            radeon_loaded: probe.is_loaded("radeon"),
            radeon_blacklisted: probe.is_blacklisted("radeon"),
            amdgpu_loaded: probe.is_loaded("amdgpu"),
            amdgpu_blacklisted: probe.is_blacklisted("amdgpu"),
            amdgpu_versioned: probe.is_versioned("amdgpu"),
            amdgpu_pro_px_installed,
            nouveau_loaded: probe.is_loaded("nouveau"),
            nouveau_blacklisted: probe.is_blacklisted("nouveau"),
            nvidia_kmod_available: probe.is_available("nvidia"),
            amdgpu_kmod_available: probe.is_available("amdgpu"),
        }
    }

    /// The proprietary amdgpu-pro stack: a DKMS amdgpu that carries a version.
    pub fn amdgpu_is_pro(&self) -> bool {
        self.amdgpu_kmod_available && self.amdgpu_versioned
    }

    fn amdgpu_pro_switchable(&self) -> bool {
        self.amdgpu_loaded && self.amdgpu_is_pro() && self.amdgpu_pro_px_installed
    }

    pub fn log(&self) {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        info!("Is nvidia loaded? {}", yes_no(self.nvidia_loaded));
        info!("Was nvidia unloaded? {}", yes_no(self.nvidia_unloaded));
        info!("Is nvidia blacklisted? {}", yes_no(self.nvidia_blacklisted));
        info!("Is intel loaded? {}", yes_no(self.intel_loaded));
        info!("Is radeon loaded? {}", yes_no(self.radeon_loaded));
        info!("Is radeon blacklisted? {}", yes_no(self.radeon_blacklisted));
        info!("Is amdgpu loaded? {}", yes_no(self.amdgpu_loaded));
        info!("Is amdgpu blacklisted? {}", yes_no(self.amdgpu_blacklisted));
        info!("Is amdgpu versioned? {}", yes_no(self.amdgpu_versioned));
        info!("Is amdgpu pro stack? {}", yes_no(self.amdgpu_is_pro()));
        info!("Is nouveau loaded? {}", yes_no(self.nouveau_loaded));
        info!("Is nouveau blacklisted? {}", yes_no(self.nouveau_blacklisted));
        info!(
            "Is nvidia kernel module available? {}",
            yes_no(self.nvidia_kmod_available)
        );
        info!(
            "Is amdgpu kernel module available? {}",
            yes_no(self.amdgpu_kmod_available)
        );
    }
}

/// Everything the decision depends on, gathered before any action is taken.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub current: &'a Snapshot,
    pub changed: bool,
    pub offloading: bool,
    pub flags: &'a DriverFlags,
    pub prime_settings: &'a Path,
    pub backends: &'a [String],
}

/// What the run ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NoBootDisplay,
    NothingToDo,
    /// Desktop system, or a laptop running open drivers only.
    DesktopOrOpenDrivers,
    NoDiscreteDevice,
    PrimeConfigured { mode: PrimeMode, offloading_saved: bool },
    PrimeFailed { mode: PrimeMode, reason: String },
    SwitchableHelper { action: PxAction, succeeded: bool },
    OffloadLayoutRemoved,
    UnsupportedDiscrete { vendor: Vendor },
}

impl Outcome {
    /// True for outcomes where nothing was changed on the system.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            Outcome::NoBootDisplay
                | Outcome::NothingToDo
                | Outcome::DesktopOrOpenDrivers
                | Outcome::NoDiscreteDevice
                | Outcome::UnsupportedDiscrete { .. }
        )
    }
}

pub fn decide<P: Platform>(platform: &mut P, ctx: &Context<'_>) -> Outcome {
    let Some(boot) = ctx.current.boot_display() else {
        info!("No boot display controller detected");
        return Outcome::NoBootDisplay;
    };

    if ctx.current.len() == 1 {
        info!("Single card detected");
        return match boot.vendor {
            Vendor::Intel if ctx.offloading && ctx.flags.nvidia_unloaded => {
                info!("PRIME detected");
                // The discrete GPU was powered off before enumeration; bring
                // it back from its marker file.
                let mut rediscovered = ctx.current.clone();
                platform::add_disabled_cards(&*platform, &mut rediscovered);
                match rediscovered.first_discrete() {
                    Some(discrete) => run_prime(platform, ctx, *discrete),
                    None => Outcome::NoDiscreteDevice,
                }
            }
            Vendor::Amd if ctx.changed && ctx.flags.amdgpu_pro_switchable() => {
                // Switchable graphics was turned off in the firmware.
                info!("AMDGPU-Pro discrete graphics detected");
                switchable_helper(platform, PxAction::Reset)
            }
            Vendor::Nvidia => match platform.remove_offload_config() {
                Removal::Removed => Outcome::OffloadLayoutRemoved,
                Removal::NotFound | Removal::Failed => nothing_to_do(),
            },
            _ => nothing_to_do(),
        };
    }

    let Some(discrete) = ctx.current.first_discrete().copied() else {
        return Outcome::NoDiscreteDevice;
    };

    if boot.vendor != Vendor::Intel {
        info!("Unsupported discrete card vendor: {}", discrete.vendor);
        info!("Nothing to do");
        return Outcome::UnsupportedDiscrete {
            vendor: discrete.vendor,
        };
    }

    info!("Intel IGP detected");
    let flags = ctx.flags;
    if ctx.changed && flags.amdgpu_pro_switchable() {
        // Switchable graphics was turned back on in the firmware.
        info!("AMDGPU-Pro switchable graphics detected");
        switchable_helper(platform, PxAction::PowerSaving)
    } else if ctx.offloading
        && flags.intel_loaded
        && !flags.nouveau_loaded
        && (flags.nvidia_loaded || flags.nvidia_kmod_available)
    {
        info!("Intel hybrid system");
        run_prime(platform, ctx, discrete)
    } else {
        info!("Desktop system detected");
        info!("or laptop with open drivers");
        info!("Nothing to do");
        Outcome::DesktopOrOpenDrivers
    }
}

fn nothing_to_do() -> Outcome {
    info!("Nothing to do");
    Outcome::NothingToDo
}

fn switchable_helper<P: Platform>(platform: &mut P, action: PxAction) -> Outcome {
    let succeeded = platform.run_vendor_helper(action);
    Outcome::SwitchableHelper { action, succeeded }
}

fn run_prime<P: Platform>(
    platform: &mut P,
    ctx: &Context<'_>,
    discrete: crate::device::Device,
) -> Outcome {
    let mode = PrimeMode::load(ctx.prime_settings);
    match prime::apply(platform, mode, &discrete, ctx.backends) {
        Ok(()) => Outcome::PrimeConfigured {
            mode,
            offloading_saved: platform.set_offloading(),
        },
        Err(e) => {
            info!("Nothing to do");
            Outcome::PrimeFailed {
                mode,
                reason: e.to_string(),
            }
        }
    }
}
