//! Packaging helper: renders the man pages and shell completions the Debian
//! package ships.

use clap::CommandFactory;
use clap_complete::Shell;
use gpu_manager::cli::Cli;
use std::fs;
use std::io;
use std::path::PathBuf;

fn main() -> io::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let man_dir = args.next().map_or_else(|| PathBuf::from("man"), PathBuf::from);
    let completions_dir = args
        .next()
        .map_or_else(|| PathBuf::from("target/completions"), PathBuf::from);

    fs::create_dir_all(&man_dir)?;
    clap_mangen::generate_to(Cli::command(), &man_dir)?;

    fs::create_dir_all(&completions_dir)?;
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        clap_complete::generate_to(shell, &mut Cli::command(), "gpu-manager", &completions_dir)?;
    }

    for dir in [&man_dir, &completions_dir] {
        for entry in fs::read_dir(dir)? {
            println!("Generated {}", entry?.path().display());
        }
    }

    Ok(())
}
