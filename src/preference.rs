use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// How the discrete GPU should be used, as chosen by the user
/// (the single line of `/etc/prime-discrete`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrimeMode {
    On,
    #[default]
    Off,
    OnDemand,
}

impl PrimeMode {
    /// Interpret the first line of the settings file. Matching is a
    /// case-insensitive substring test with `on-demand` checked before `on`;
    /// anything else, including an empty file, means `Off`.
    pub fn parse(content: &str) -> Self {
        let Some(line) = content.lines().next() else {
            return PrimeMode::Off;
        };
        let line = line.to_ascii_lowercase();
        if line.contains("on-demand") {
            PrimeMode::OnDemand
        } else if line.contains("on") {
            PrimeMode::On
        } else {
            PrimeMode::Off
        }
    }

    /// Read the settings file. Missing or unreadable files resolve to `Off`.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let mode = Self::parse(&content);
                info!("Prime mode from {}: {}", path.display(), mode);
                mode
            }
            Err(e) => {
                warn!(
                    "Warning: no settings for prime can be found in {} ({}), assuming off",
                    path.display(),
                    e
                );
                PrimeMode::Off
            }
        }
    }
}

impl fmt::Display for PrimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimeMode::On => write!(f, "on"),
            PrimeMode::Off => write!(f, "off"),
            PrimeMode::OnDemand => write!(f, "on-demand"),
        }
    }
}
