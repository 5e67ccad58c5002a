use crate::boot_state;
use crate::device::Device;
use crate::sysfs::SysfsRoot;
use std::path::Path;
use tracing::{debug, info, warn};

/// True if `module` is listed in a `/proc/modules`-formatted file.
pub fn is_loaded(modules_list: &Path, module: &str) -> bool {
    let content = match std::fs::read_to_string(modules_list) {
        Ok(c) => c,
        Err(e) => {
            warn!("Error: can't open {}: {}", modules_list.display(), e);
            return false;
        }
    };
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == module)
}

/// A `blacklist <module>` line. Trailing whitespace is allowed, anything
/// else after the module name is not.
fn blacklists(line: &str, module: &str) -> bool {
    let line = line.trim_end();
    line.starts_with("blacklist") && line.ends_with(module)
}

fn file_blacklists(path: &Path, module: &str) -> bool {
    std::fs::read_to_string(path)
        .map(|content| content.lines().any(|line| blacklists(line, module)))
        .unwrap_or(false)
}

fn dir_blacklists(dir: &Path, module: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "conf"))
        .any(|p| file_blacklists(&p, module))
}

/// Check the admin modprobe directory, then the distribution one. A file
/// path in place of the admin directory is scanned directly.
pub fn is_blacklisted(sysfs: &SysfsRoot, modprobe_d: &Path, module: &str) -> bool {
    if modprobe_d.is_file() {
        return file_blacklists(modprobe_d, module);
    }
    dir_blacklists(modprobe_d, module) || dir_blacklists(&sysfs.path("lib/modprobe.d"), module)
}

fn kernel_release() -> Option<String> {
    match nix::sys::utsname::uname() {
        Ok(uts) => Some(uts.release().to_string_lossy().into_owned()),
        Err(e) => {
            warn!("Error: uname failed: {}", e);
            None
        }
    }
}

/// True if a DKMS build of `module` exists for the running kernel.
pub fn is_available(sysfs: &SysfsRoot, module: &str) -> bool {
    let Some(release) = kernel_release() else {
        return false;
    };
    is_available_for(sysfs, &release, module)
}

fn is_available_for(sysfs: &SysfsRoot, release: &str, module: &str) -> bool {
    let dir = format!("lib/modules/{}/updates/dkms", release);
    info!("Looking for {} modules in {}", module, sysfs.path(&dir).display());

    let entries = match sysfs.list_dir(&dir) {
        Ok(e) => e,
        Err(e) => {
            debug!("{}", e);
            return false;
        }
    };
    match entries.iter().find(|name| name.starts_with(module)) {
        Some(name) => {
            info!("Found {} module: {}", module, name);
            true
        }
        None => false,
    }
}

/// The `version` field of the module's modinfo, if it declares one.
pub fn version(module: &str) -> Option<String> {
    let output = std::process::Command::new("modinfo")
        .args(["-F", "version", module])
        .output()
        .map_err(|e| warn!("can't get module info for {}: {}", module, e))
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

/// Cards recorded as `u-d-c-gpu-*` markers in the detection directory.
pub fn find_disabled_cards(dir: &Path) -> Vec<Device> {
    info!("Looking for disabled cards in {}", dir.display());

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Error: can't open {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| boot_state::is_marker_name(name))
        .collect();
    names.sort();

    names
        .iter()
        .filter_map(|name| {
            info!("Adding GPU from file: {}", name);
            let device = boot_state::decode_marker_name(name);
            if device.is_none() {
                warn!("no matches in {}", name);
            }
            device
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let modules = tmp.path().join("modules");
        fs::write(
            &modules,
            "nvidia_drm 69632 2 - Live 0x0000000000000000\nnvidia 35446784 1 nvidia_drm, Live 0x0\n",
        )
        .unwrap();

        assert!(is_loaded(&modules, "nvidia"));
        assert!(is_loaded(&modules, "nvidia_drm"));
        assert!(!is_loaded(&modules, "nouveau"));
        assert!(!is_loaded(&tmp.path().join("missing"), "nvidia"));
    }

    #[test]
    fn test_blacklist_line() {
        assert!(blacklists("blacklist nouveau", "nouveau"));
        assert!(blacklists("blacklist nouveau  \n", "nouveau"));
        assert!(!blacklists("# blacklist nouveau", "nouveau"));
        assert!(!blacklists("blacklist nouveau_extra", "nouveau"));
        assert!(!blacklists("options nouveau modeset=0", "nouveau"));
    }

    #[test]
    fn test_is_blacklisted_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        let etc = tmp.path().join("etc/modprobe.d");
        let lib = tmp.path().join("lib/modprobe.d");
        fs::create_dir_all(&etc).unwrap();
        fs::create_dir_all(&lib).unwrap();

        fs::write(etc.join("blacklist-nouveau.conf"), "blacklist nouveau\n").unwrap();
        fs::write(etc.join("ignored.txt"), "blacklist radeon\n").unwrap();
        fs::write(lib.join("nvidia-graphics-drivers.conf"), "blacklist amdgpu\n").unwrap();

        assert!(is_blacklisted(&sysfs, &etc, "nouveau"));
        assert!(is_blacklisted(&sysfs, &etc, "amdgpu"));
        assert!(!is_blacklisted(&sysfs, &etc, "radeon"));
    }

    #[test]
    fn test_is_blacklisted_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        let file = tmp.path().join("modprobe.conf");
        fs::write(&file, "blacklist radeon\n").unwrap();

        assert!(is_blacklisted(&sysfs, &file, "radeon"));
        assert!(!is_blacklisted(&sysfs, &file, "nouveau"));
    }

    #[test]
    fn test_is_available_for_release() {
        let tmp = tempfile::tempdir().unwrap();
        let sysfs = SysfsRoot::new(tmp.path());
        let dkms = tmp.path().join("lib/modules/6.8.0-40-generic/updates/dkms");
        fs::create_dir_all(&dkms).unwrap();
        fs::write(dkms.join("nvidia.ko.zst"), "").unwrap();

        assert!(is_available_for(&sysfs, "6.8.0-40-generic", "nvidia"));
        assert!(!is_available_for(&sysfs, "6.8.0-40-generic", "amdgpu"));
        assert!(!is_available_for(&sysfs, "5.15.0-1-generic", "nvidia"));
    }

    #[test]
    fn test_find_disabled_cards() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("u-d-c-gpu-0000:01:00.0-0x10de-0x1f91"), "").unwrap();
        fs::write(tmp.path().join("u-d-c-gpu-garbage"), "").unwrap();
        fs::write(tmp.path().join("u-d-c-nvidia-was-loaded"), "").unwrap();

        let cards = find_disabled_cards(tmp.path());
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].bus, 1);
        assert_eq!(cards[0].device_id, 0x1f91);
    }

    #[test]
    fn test_find_disabled_cards_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(find_disabled_cards(&tmp.path().join("nope")).is_empty());
    }
}
