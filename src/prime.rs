//! Applies the user's prime preference to the discrete NVIDIA GPU.
//!
//! | mode      | xorg snippet          | runtime PM | nvidia module |
//! |-----------|-----------------------|------------|---------------|
//! | on        | OutputClass (primary) | `on`       | loaded        |
//! | on-demand | ServerLayout offload  | `auto`     | loaded        |
//! | off       | none                  | `auto`     | unloaded      |
//!
//! Unloading may need the greeter's display session killed first. That
//! happens at most once per run: if the module is still held afterwards the
//! run reports failure instead of killing again. With no session to kill the
//! module is left loaded and power management is re-armed anyway.

use crate::device::Device;
use crate::platform::{Platform, Removal};
use crate::preference::PrimeMode;
use tracing::{error, info, warn};

pub const NVIDIA: &str = "nvidia";

/// Modules stacked on top of `nvidia`, unloaded before it.
pub const NVIDIA_DEPENDENTS: [&str; 3] = ["nvidia-drm", "nvidia-uvm", "nvidia-modeset"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimeError {
    #[error("nvidia is still in use after terminating the {backend} session")]
    StillLoaded { backend: String },
}

/// Switch the discrete GPU to `mode`. `backends` lists the display servers
/// whose greeter session may be killed to release the driver, in the order
/// they are tried.
pub fn apply<P: Platform + ?Sized>(
    platform: &mut P,
    mode: PrimeMode,
    discrete: &Device,
    backends: &[String],
) -> Result<(), PrimeError> {
    info!("Applying prime mode \"{}\" to {}", mode, discrete);

    match mode {
        PrimeMode::On => {
            if !platform.publish_always_discrete_config() {
                warn!("Warning: could not create the prime OutputClass");
            }
            log_removal(platform.remove_offload_config(), "offload ServerLayout");
            platform.set_runtime_pm(discrete, false);
            ensure_loaded(platform);
        }
        PrimeMode::OnDemand => {
            if !platform.publish_offload_config() {
                warn!("Warning: could not create the offload ServerLayout");
            }
            log_removal(platform.remove_always_discrete_config(), "prime OutputClass");
            platform.set_runtime_pm(discrete, true);
            ensure_loaded(platform);
        }
        PrimeMode::Off => {
            log_removal(platform.remove_always_discrete_config(), "prime OutputClass");
            log_removal(platform.remove_offload_config(), "offload ServerLayout");
            unload_with_escalation(platform, backends)?;
            platform.set_runtime_pm(discrete, true);
        }
    }

    Ok(())
}

fn log_removal(removal: Removal, what: &str) {
    if removal == Removal::Failed {
        warn!("Warning: could not remove the {}", what);
    }
}

fn ensure_loaded<P: Platform + ?Sized>(platform: &mut P) {
    if !platform.is_loaded(NVIDIA) && !platform.load_module(NVIDIA) {
        warn!("Warning: failed to load {}", NVIDIA);
    }
}

/// Dependents first, `nvidia` last. Only the last result counts, since the
/// dependents may legitimately not be loaded.
fn unload_nvidia<P: Platform + ?Sized>(platform: &mut P) -> bool {
    for module in NVIDIA_DEPENDENTS {
        platform.unload_module(module);
    }
    platform.unload_module(NVIDIA)
}

fn unloaded<P: Platform + ?Sized>(platform: &mut P) -> bool {
    unload_nvidia(platform) || !platform.is_loaded(NVIDIA)
}

/// Graceful unload, then at most one session kill followed by one retry.
pub fn unload_with_escalation<P: Platform + ?Sized>(
    platform: &mut P,
    backends: &[String],
) -> Result<(), PrimeError> {
    if !platform.is_loaded(NVIDIA) || unloaded(platform) {
        return Ok(());
    }

    warn!("Warning: failure to unload the nvidia modules.");
    info!("Info: killing the display session...");

    let Some((backend, pid)) = backends
        .iter()
        .find_map(|b| platform.terminate_session(b).map(|pid| (b, pid)))
    else {
        warn!("Warning: no display session to terminate, leaving nvidia loaded");
        return Ok(());
    };
    info!("Terminated {} session {}", backend, pid);

    if unloaded(platform) {
        return Ok(());
    }
    error!("Error: giving up on unloading nvidia...");
    Err(PrimeError::StillLoaded {
        backend: backend.clone(),
    })
}
