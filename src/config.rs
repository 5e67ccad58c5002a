use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level gpu-manager configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuManagerConfig {
    pub paths: PathsConfig,
    pub session: SessionConfig,
}

/// Every file and directory the boot pass reads or writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Snapshot of the previous boot.
    pub last_boot_file: PathBuf,
    /// Where this boot's snapshot is written. Defaults to `last_boot_file`.
    pub new_boot_file: Option<PathBuf>,
    /// Directory holding `u-d-c-*` markers left by the initramfs/udev hooks.
    pub gpu_detection_path: PathBuf,
    /// Single-line prime preference (`on`, `off`, `on-demand`).
    pub prime_settings: PathBuf,
    /// Marker telling other tools that render offloading is in use.
    pub offloading_conf: PathBuf,
    pub xorg_conf_d: PathBuf,
    pub modprobe_d: PathBuf,
    pub amdgpu_pro_px: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            last_boot_file: PathBuf::from("/var/lib/ubuntu-drivers-common/last_gfx_boot"),
            new_boot_file: None,
            gpu_detection_path: PathBuf::from("/run"),
            prime_settings: PathBuf::from("/etc/prime-discrete"),
            offloading_conf: PathBuf::from("/var/lib/ubuntu-drivers-common/requires_offloading"),
            xorg_conf_d: PathBuf::from("/usr/share/X11/xorg.conf.d"),
            modprobe_d: PathBuf::from("/etc/modprobe.d"),
            amdgpu_pro_px: PathBuf::from("/opt/amdgpu-pro/bin/amdgpu-pro-px"),
            log_file: None,
        }
    }
}

impl PathsConfig {
    pub fn new_boot_file(&self) -> &Path {
        self.new_boot_file.as_deref().unwrap_or(&self.last_boot_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Display server process names, tried in order when a session has to be
    /// terminated to release the discrete GPU.
    pub backends: Vec<String>,
    /// Owner of the login-screen session that may be killed.
    pub greeter_user: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backends: vec!["Xwayland".to_string(), "Xorg".to_string()],
            greeter_user: "gdm".to_string(),
        }
    }
}

const SYSTEM_CONFIG: &str = "/etc/gpu-manager/config.toml";
const SYSTEM_CONFIG_D: &str = "/etc/gpu-manager/config.d";

fn read_toml(path: &Path) -> Option<toml::Value> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            eprintln!(
                "warning: failed to parse config at {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

/// Drop-in files from `dir`, in lexical order.
fn load_drop_ins(dir: &Path) -> Vec<toml::Value> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();
    paths.iter().filter_map(|p| read_toml(p)).collect()
}

/// Recursively merge two TOML values. Tables are merged key-by-key;
/// all other types in `overlay` replace `base`.
fn merge_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load config from a specific path, ignoring the system files.
fn load_from_path(path: &Path) -> GpuManagerConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            eprintln!(
                "warning: failed to parse config at {}: {}",
                path.display(),
                e
            );
            GpuManagerConfig::default()
        }),
        Err(e) => {
            eprintln!(
                "warning: failed to read config at {}: {}",
                path.display(),
                e
            );
            GpuManagerConfig::default()
        }
    }
}

fn load_layered(base: &Path, drop_in_dir: &Path) -> GpuManagerConfig {
    let layers = read_toml(base).into_iter().chain(load_drop_ins(drop_in_dir));
    let merged = layers.reduce(merge_values);

    match merged {
        Some(value) => value.try_into().unwrap_or_else(|e| {
            eprintln!("warning: failed to deserialize config: {}", e);
            GpuManagerConfig::default()
        }),
        None => GpuManagerConfig::default(),
    }
}

/// Load the system config merged with its drop-ins.
/// If `override_path` is provided, use only that file instead.
pub fn load(override_path: Option<&PathBuf>) -> GpuManagerConfig {
    if let Some(path) = override_path {
        return load_from_path(path);
    }
    load_layered(Path::new(SYSTEM_CONFIG), Path::new(SYSTEM_CONFIG_D))
}
