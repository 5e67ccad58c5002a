use crate::config::GpuManagerConfig;
use crate::run::RunOptions;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gpu-manager",
    about = "Boot-time hybrid graphics configuration for Linux",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Write the log to this file instead of stdout
    #[arg(long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Move the previous log to <log>.<HHMMmmddYYYY> first
    #[arg(long)]
    pub backup_log: bool,

    /// Log module, process and power actions instead of performing them
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file (replaces /etc/gpu-manager/config.toml and its drop-ins)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub paths: PathArgs,

    #[command(flatten)]
    pub fake: FakeArgs,
}

/// Overrides for the configured paths.
#[derive(Args, Debug, Default)]
pub struct PathArgs {
    /// Snapshot of the previous boot
    #[arg(long, global = true, value_name = "FILE")]
    pub last_boot_file: Option<PathBuf>,

    /// Where to write this boot's snapshot (defaults to the last-boot file)
    #[arg(long, value_name = "FILE")]
    pub new_boot_file: Option<PathBuf>,

    /// Directory holding the u-d-c-* detection markers
    #[arg(long, global = true, value_name = "DIR")]
    pub gpu_detection_path: Option<PathBuf>,

    /// Prime preference file
    #[arg(long, global = true, value_name = "FILE")]
    pub prime_settings: Option<PathBuf>,

    #[arg(long = "xorg-conf-d-path", global = true, value_name = "DIR")]
    pub xorg_conf_d: Option<PathBuf>,

    #[arg(long = "modprobe-d-path", global = true, value_name = "PATH")]
    pub modprobe_d: Option<PathBuf>,

    #[arg(long = "amdgpu-pro-px-file", global = true, value_name = "FILE")]
    pub amdgpu_pro_px: Option<PathBuf>,
}

/// Hooks for exercising the boot pass without the matching hardware.
#[derive(Args, Debug, Default)]
pub struct FakeArgs {
    /// Read the current cards from a last-boot formatted file
    #[arg(long, global = true, value_name = "FILE", hide_short_help = true)]
    pub fake_lspci: Option<PathBuf>,

    /// Read loaded modules from this file instead of /proc/modules
    #[arg(long, global = true, value_name = "FILE", hide_short_help = true)]
    pub fake_modules_path: Option<PathBuf>,

    #[arg(long, global = true, conflicts_with = "fake_no_requires_offloading", hide_short_help = true)]
    pub fake_requires_offloading: bool,

    #[arg(long, global = true, hide_short_help = true)]
    pub fake_no_requires_offloading: bool,

    #[arg(long, global = true, conflicts_with = "fake_module_is_not_available", hide_short_help = true)]
    pub fake_module_is_available: bool,

    #[arg(long, global = true, hide_short_help = true)]
    pub fake_module_is_not_available: bool,

    #[arg(long, global = true, hide_short_help = true)]
    pub fake_module_is_versioned: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what the boot pass would see, without changing anything
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (auto-detected if omitted)
        shell: Option<Shell>,
    },
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Cli {
    /// Fold command-line path overrides into the loaded configuration.
    pub fn apply_to(&self, config: &mut GpuManagerConfig) {
        let p = &mut config.paths;
        let args = &self.paths;
        if let Some(path) = &args.last_boot_file {
            p.last_boot_file = path.clone();
        }
        if let Some(path) = &args.new_boot_file {
            p.new_boot_file = Some(path.clone());
        }
        if let Some(path) = &args.gpu_detection_path {
            p.gpu_detection_path = path.clone();
        }
        if let Some(path) = &args.prime_settings {
            p.prime_settings = path.clone();
        }
        if let Some(path) = &args.xorg_conf_d {
            p.xorg_conf_d = path.clone();
        }
        if let Some(path) = &args.modprobe_d {
            p.modprobe_d = path.clone();
        }
        if let Some(path) = &args.amdgpu_pro_px {
            p.amdgpu_pro_px = path.clone();
        }
        if let Some(path) = &self.log {
            p.log_file = Some(path.clone());
        }
    }

    pub fn run_options(&self) -> RunOptions {
        let fake = &self.fake;
        RunOptions {
            fake_lspci: fake.fake_lspci.clone(),
            fake_offloading: flag_pair(fake.fake_requires_offloading, fake.fake_no_requires_offloading),
            fake_module_available: flag_pair(
                fake.fake_module_is_available,
                fake.fake_module_is_not_available,
            ),
            fake_module_versioned: fake.fake_module_is_versioned,
        }
    }
}

/// Print shell completions to stdout.
pub fn print_completions(shell: Option<Shell>) -> anyhow::Result<()> {
    let shell = shell.or_else(Shell::from_env).ok_or_else(|| {
        anyhow::anyhow!(
            "Could not detect shell. Specify one: gpu-manager completions bash|zsh|fish|elvish|powershell"
        )
    })?;
    clap_complete::generate(shell, &mut Cli::command(), "gpu-manager", &mut std::io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_boot_pass_flags() {
        let cli = Cli::try_parse_from([
            "gpu-manager",
            "--log",
            "/var/log/gpu-manager.log",
            "--backup-log",
            "--dry-run",
            "--last-boot-file",
            "/tmp/last",
            "--new-boot-file",
            "/tmp/new",
            "--fake-requires-offloading",
            "--fake-module-is-not-available",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert!(cli.backup_log && cli.dry_run);

        let mut config = GpuManagerConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config.paths.last_boot_file, PathBuf::from("/tmp/last"));
        assert_eq!(config.paths.new_boot_file(), PathBuf::from("/tmp/new"));
        assert_eq!(
            config.paths.log_file,
            Some(PathBuf::from("/var/log/gpu-manager.log"))
        );

        let options = cli.run_options();
        assert_eq!(options.fake_offloading, Some(true));
        assert_eq!(options.fake_module_available, Some(false));
        assert!(!options.fake_module_versioned);
    }

    #[test]
    fn test_conflicting_fakes_rejected() {
        assert!(
            Cli::try_parse_from([
                "gpu-manager",
                "--fake-requires-offloading",
                "--fake-no-requires-offloading",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_status_subcommand() {
        let cli = Cli::try_parse_from(["gpu-manager", "status", "--json", "-v"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Status { json: true })));
        assert_eq!(cli.verbose, 1);
        assert_eq!(cli.run_options().fake_offloading, None);
    }
}
