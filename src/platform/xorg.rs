use super::Removal;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PRIME_OUTPUTCLASS: &str = "11-nvidia-prime.conf";
pub const OFFLOAD_SERVERLAYOUT: &str = "11-nvidia-offload.conf";

const HEADER: &str = "# DO NOT EDIT. AUTOMATICALLY GENERATED BY gpu-manager\n\n";

/// The xorg.conf.d directory gpu-manager owns two snippets in.
#[derive(Debug, Clone)]
pub struct XorgConfDir {
    dir: PathBuf,
    multiarch: Option<String>,
}

impl XorgConfDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            multiarch: None,
        }
    }

    pub fn with_multiarch(mut self, multiarch: impl Into<String>) -> Self {
        self.multiarch = Some(multiarch.into());
        self
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn multiarch(&self) -> Option<String> {
        if let Some(ref m) = self.multiarch {
            return Some(m.clone());
        }
        let output = std::process::Command::new("/usr/bin/dpkg-architecture")
            .arg("-qDEB_HOST_MULTIARCH")
            .output()
            .map_err(|e| warn!("Error: can't run dpkg-architecture: {}", e))
            .ok()?;
        let triplet = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (output.status.success() && !triplet.is_empty()).then_some(triplet)
    }

    fn write(&self, name: &str, body: &str) -> bool {
        let path = self.path(name);
        info!("Creating {}", path.display());
        match std::fs::write(&path, format!("{}{}", HEADER, body)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Error while creating {}: {}", path.display(), e);
                false
            }
        }
    }

    /// OutputClass making the NVIDIA GPU the primary one.
    pub fn create_prime_outputclass(&self) -> bool {
        let Some(multiarch) = self.multiarch() else {
            return false;
        };
        self.write(PRIME_OUTPUTCLASS, &prime_outputclass(&multiarch))
    }

    /// ServerLayout allowing NVIDIA GPU screens for render offload.
    pub fn create_offload_serverlayout(&self) -> bool {
        self.write(OFFLOAD_SERVERLAYOUT, OFFLOAD_BODY)
    }

    pub fn remove_prime_outputclass(&self) -> Removal {
        remove(&self.path(PRIME_OUTPUTCLASS))
    }

    pub fn remove_offload_serverlayout(&self) -> Removal {
        remove(&self.path(OFFLOAD_SERVERLAYOUT))
    }
}

fn prime_outputclass(multiarch: &str) -> String {
    format!(
        "Section \"OutputClass\"\n    \
         Identifier \"Nvidia Prime\"\n    \
         MatchDriver \"nvidia-drm\"\n    \
         Driver \"nvidia\"\n    \
         Option \"AllowEmptyInitialConfiguration\"\n    \
         Option \"IgnoreDisplayDevices\" \"CRT\"\n    \
         Option \"PrimaryGPU\" \"Yes\"\n    \
         ModulePath \"/{}/nvidia/xorg\"\n\
         EndSection\n\n",
        multiarch
    )
}

const OFFLOAD_BODY: &str = "Section \"ServerLayout\"\n    \
                            Identifier \"layout\"\n    \
                            Option \"AllowNVIDIAGPUScreens\"\n\
                            EndSection\n\n";

fn remove(path: &Path) -> Removal {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Removing {}", path.display());
            Removal::Removed
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Removal::NotFound,
        Err(e) => {
            warn!("Error removing {}: {}", path.display(), e);
            Removal::Failed
        }
    }
}
