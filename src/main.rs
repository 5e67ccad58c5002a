use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use gpu_manager::cli::{Cli, Command};
use gpu_manager::config::{self, GpuManagerConfig};
use gpu_manager::platform::LinuxPlatform;
use gpu_manager::run::{self, FAILURE_EXIT_CODE, RunStatus};
use gpu_manager::sysfs::SysfsRoot;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}

fn load_config(cli: &Cli) -> GpuManagerConfig {
    let mut config = config::load(cli.config.as_ref());
    cli.apply_to(&mut config);
    config
}

fn platform(cli: &Cli, config: &GpuManagerConfig) -> LinuxPlatform {
    LinuxPlatform::new(SysfsRoot::system(), config)
        .with_dry_run(cli.dry_run)
        .with_modules_file(cli.fake.fake_modules_path.clone())
}

fn dispatch(cli: Cli) -> Result<u8> {
    match &cli.command {
        None => cmd_boot(&cli),
        Some(Command::Status { json }) => cmd_status(&cli, *json).map(|()| 0),
        Some(Command::Completions { shell }) => {
            gpu_manager::cli::print_completions(*shell).map(|()| 0)
        }
    }
}

fn cmd_boot(cli: &Cli) -> Result<u8> {
    let config = load_config(cli);
    gpu_manager::logging::init(config.paths.log_file.as_deref(), cli.backup_log, cli.verbose);

    if !cli.dry_run && !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root: sudo gpu-manager (or pass --dry-run)");
    }

    let mut platform = platform(cli, &config);
    if platform.is_dry_run() {
        info!("Dry run: no modules, processes or power settings will be touched");
    }

    let sysfs = platform.sysfs().clone();
    match run::run(&sysfs, &config, &mut platform, &cli.run_options()) {
        Ok(status) => {
            if let RunStatus::Completed { outcome, .. } = &status {
                if outcome.is_noop() {
                    info!("No configuration changes made");
                } else {
                    info!("Outcome: {:?}", outcome);
                }
            }
            Ok(status.exit_code())
        }
        Err(e) => {
            // At boot nobody sees stderr, only the log.
            error!("Error: {}", e);
            Ok(FAILURE_EXIT_CODE)
        }
    }
}

fn cmd_status(cli: &Cli, json: bool) -> Result<()> {
    let config = load_config(cli);
    gpu_manager::logging::init_stderr(cli.verbose);

    let sysfs = SysfsRoot::system();
    let platform = platform(cli, &config);
    let report = gpu_manager::status::check(&sysfs, &config, &platform, &cli.run_options())
        .context("failed to gather status")?;

    if json {
        gpu_manager::output::print_status_json(&report)?;
    } else {
        gpu_manager::output::print_status(&report);
    }
    Ok(())
}
