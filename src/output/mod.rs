use crate::device::{Device, OutputState, Snapshot};
use crate::status::{FileStatus, StatusReport};
use colored::Colorize;

const LABEL_W: usize = 22;

fn yes_no(value: bool) -> colored::ColoredString {
    if value { "yes".green() } else { "no".dimmed() }
}

// Box rows are measured by length, so they stay uncoloured.
fn plain(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

fn print_box(title: &str, rows: &[(&str, String)]) {
    let inner_w = rows
        .iter()
        .map(|(l, v)| l.len().max(LABEL_W) + 2 + v.len())
        .max()
        .unwrap_or(40);

    let fill = inner_w.saturating_sub(1 + title.len());
    println!("╭─ {} {}╮", title.bold(), "─".repeat(fill));

    for (label, value) in rows {
        let padded = format!("{:<w$}", label, w = LABEL_W);
        let pad = inner_w.saturating_sub(LABEL_W + 2 + value.len());
        println!("│ {}  {}{} │", padded.dimmed(), value, " ".repeat(pad));
    }

    println!("╰{}╯", "─".repeat(inner_w + 2));
}

fn output_label(output: OutputState) -> &'static str {
    match output {
        OutputState::Connected => "connected",
        OutputState::Disconnected => "disconnected",
        OutputState::Unknown => "unknown",
    }
}

fn print_card(device: &Device) {
    let role = if device.is_boot_display {
        "boot".green().bold()
    } else {
        "    ".normal()
    };
    println!(
        "  {} {:<7} {:04x}:{:04x}  {}  {}",
        role,
        device.vendor.to_string(),
        device.vendor.id(),
        device.device_id,
        device.pci_address(),
        output_label(device.output).dimmed()
    );
}

fn print_snapshot(title: &str, snapshot: Option<&Snapshot>) {
    println!("── {} ", title.bold());
    match snapshot {
        None => println!("  {}", "no record yet".dimmed()),
        Some(s) if s.is_empty() => println!("  {}", "no display controllers".dimmed()),
        Some(s) => s.cards().iter().for_each(print_card),
    }
}

fn file_row(file: &FileStatus) -> String {
    let state = if file.exists { "present" } else { "absent" };
    format!("{} ({})", state, file.path)
}

pub fn print_status(report: &StatusReport) {
    if report.disabled_by_kernel_parameter {
        println!(
            "  {} disabled by the {} kernel parameter",
            "Note:".yellow(),
            crate::detect::DISABLE_PARAM.cyan()
        );
        println!();
    }

    let rows: Vec<(&str, String)> = vec![
        (
            "Boot display",
            report
                .boot_display_vendor()
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("Cards", report.current.len().to_string()),
        ("Changed since boot", plain(report.changed)),
        ("Requires offloading", plain(report.requires_offloading)),
        ("Prime mode", report.prime_mode.to_string()),
        ("Offloading marker", file_row(&report.offloading_marker)),
        ("Prime OutputClass", file_row(&report.prime_config)),
        ("Offload ServerLayout", file_row(&report.offload_config)),
    ];
    print_box("gpu-manager", &rows);
    println!();

    print_snapshot("Current", Some(&report.current));
    print_snapshot("Last boot", report.previous.as_ref());
    println!();

    let flags = &report.flags;
    let modules = [
        ("nvidia", flags.nvidia_loaded, flags.nvidia_blacklisted),
        ("i915/i810", flags.intel_loaded, false),
        ("radeon", flags.radeon_loaded, flags.radeon_blacklisted),
        ("amdgpu", flags.amdgpu_loaded, flags.amdgpu_blacklisted),
        ("nouveau", flags.nouveau_loaded, flags.nouveau_blacklisted),
    ];
    println!("── {} ", "Drivers".bold());
    for (name, loaded, blacklisted) in modules {
        let state = if loaded {
            "loaded".green()
        } else {
            "not loaded".dimmed()
        };
        let note = if blacklisted { " (blacklisted)".red() } else { "".normal() };
        println!("  {:<10} {}{}", name, state, note);
    }
    println!(
        "  {:<10} dkms nvidia {}, dkms amdgpu {}, pro stack {}",
        "",
        yes_no(flags.nvidia_kmod_available),
        yes_no(flags.amdgpu_kmod_available),
        yes_no(flags.amdgpu_is_pro())
    );
}

pub fn print_status_json(report: &StatusReport) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
