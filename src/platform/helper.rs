use super::PxAction;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{info, warn};

const MODPROBE: &str = "/sbin/modprobe";
const RMMOD: &str = "/sbin/rmmod";

fn run(program: &str, args: &[&str]) -> Result<bool> {
    let status = std::process::Command::new(program)
        .args(args)
        .status()
        .map_err(|e| Error::Command {
            command: format!("{} {}", program, args.join(" ")),
            source: e,
        })?;
    Ok(status.success())
}

fn run_logged(program: &str, args: &[&str]) -> bool {
    run(program, args).unwrap_or_else(|e| {
        warn!("{}", e);
        false
    })
}

/// Load a kernel module.
pub fn modprobe(module: &str, dry_run: bool) -> bool {
    info!("Loading {} with \"no\" parameters", module);
    if dry_run {
        return true;
    }
    run_logged(MODPROBE, &[module])
}

/// Unload a kernel module. Fails while anything still holds it.
pub fn rmmod(module: &str, dry_run: bool) -> bool {
    info!("Unloading {} with \"no\" parameters", module);
    if dry_run {
        return true;
    }
    run_logged(RMMOD, &[module])
}

pub fn px_args(action: PxAction) -> &'static [&'static str] {
    match action {
        PxAction::PowerSaving => &["--mode", "powersaving"],
        PxAction::Reset => &["--reset"],
    }
}

/// Run the AMD switchable-graphics helper.
pub fn run_amdgpu_pro_px(helper: &Path, action: PxAction, dry_run: bool) -> bool {
    match action {
        PxAction::PowerSaving => info!("Enabling power saving mode for amdgpu-pro"),
        PxAction::Reset => info!("Resetting the script changes for amdgpu-pro"),
    }

    let program = helper.to_string_lossy();
    let args = px_args(action);
    if dry_run {
        info!("{} {}", program, args.join(" "));
        return true;
    }
    run_logged(&program, args)
}
