use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sysfs read failed: {path}: {source}")]
    SysfsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("sysfs write failed: {path}: {source}")]
    SysfsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("boot state file {path}: {detail}")]
    BootState { path: PathBuf, detail: String },

    #[error("device enumeration failed: {0}")]
    Detection(String),

    #[error("failed to run {command}: {source}")]
    Command {
        command: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
