//! Log setup for the boot pass.
//!
//! Messages go to the `--log` file when one is given, or to stdout. A log
//! file that cannot be opened falls back to stdout with a warning, since a
//! boot-time tool must never stop over its own log.

use chrono::{DateTime, Local};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default filter for a verbosity level: 0 = info, 1 = debug, 2+ = trace.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "gpu_manager=info",
        1 => "gpu_manager=debug",
        _ => "gpu_manager=trace",
    }
}

/// Name the previous log is moved to, e.g. `gpu-manager.log.093010182026`.
pub fn backup_path(log: &Path, now: DateTime<Local>) -> PathBuf {
    let mut name = log.as_os_str().to_owned();
    name.push(format!(".{}", now.format("%H%M%m%d%Y")));
    PathBuf::from(name)
}

/// Move an existing log out of the way. A missing log is not an error.
pub fn move_log(log: &Path) -> io::Result<Option<PathBuf>> {
    if !log.exists() {
        return Ok(None);
    }
    let backup = backup_path(log, Local::now());
    std::fs::rename(log, &backup)?;
    Ok(Some(backup))
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity.
pub fn init(log_file: Option<&Path>, backup: bool, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let mut problems = Vec::new();
    let file = log_file.and_then(|path| {
        if backup && let Err(e) = move_log(path) {
            problems.push(format!("Warning: moving {} failed ({})", path.display(), e));
        }
        match File::create(path) {
            Ok(file) => Some(file),
            Err(e) => {
                problems.push(format!("Warning: writing to {} failed ({})", path.display(), e));
                None
            }
        }
    });

    match file {
        Some(file) => {
            let fmt_layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_span_events(FmtSpan::NONE)
                .with_writer(Mutex::new(file));

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .init();
        }
        None => {
            let fmt_layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_span_events(FmtSpan::NONE)
                .with_writer(io::stdout);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .init();
        }
    }

    for problem in problems {
        warn!("{}", problem);
    }
}

/// Subscriber for read-only commands: stderr, warnings only unless `-v`.
pub fn init_stderr(verbose: u8) {
    let directive = if verbose == 0 {
        "gpu_manager=warn"
    } else {
        default_directive(verbose)
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
