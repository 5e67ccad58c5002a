use gpu_manager::boot_state;
use gpu_manager::config::GpuManagerConfig;
use gpu_manager::decide::Outcome;
use gpu_manager::platform::LinuxPlatform;
use gpu_manager::preference::PrimeMode;
use gpu_manager::run::{self, RunOptions, RunStatus};
use gpu_manager::sysfs::SysfsRoot;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use tempfile::TempDir;

const PRIME_CONF: &str = "xorg.conf.d/11-nvidia-prime.conf";
const OFFLOAD_CONF: &str = "xorg.conf.d/11-nvidia-offload.conf";

fn bind(root: &Path, device: &Path, driver: &str) {
    let target = root.join("sys/bus/pci/drivers").join(driver);
    fs::create_dir_all(&target).unwrap();
    symlink(target, device.join("driver")).unwrap();
}

fn pci_function(root: &Path, address: &str, class: &str, vendor: &str, device: &str, boot_vga: bool) {
    let dir = root.join("sys/bus/pci/devices").join(address);
    fs::create_dir_all(dir.join("power")).unwrap();
    fs::write(dir.join("class"), format!("{}\n", class)).unwrap();
    fs::write(dir.join("vendor"), format!("{}\n", vendor)).unwrap();
    fs::write(dir.join("device"), format!("{}\n", device)).unwrap();
    fs::write(dir.join("boot_vga"), if boot_vga { "1\n" } else { "0\n" }).unwrap();
    fs::write(dir.join("power/control"), "on\n").unwrap();
}

/// A laptop with an Intel IGP driving the internal panel and an NVIDIA GPU
/// bound to the proprietary driver.
fn create_optimus_fixture(root: &Path) {
    fs::create_dir_all(root.join("proc")).unwrap();
    fs::write(
        root.join("proc/cmdline"),
        "BOOT_IMAGE=/vmlinuz root=UUID=abc123 ro quiet splash\n",
    )
    .unwrap();

    pci_function(root, "0000:00:02.0", "0x030000", "0x8086", "0x3e9b", true);
    bind(root, &root.join("sys/bus/pci/devices/0000:00:02.0"), "i915");
    pci_function(root, "0000:00:1f.3", "0x040380", "0x8086", "0xa348", false);
    pci_function(root, "0000:01:00.0", "0x030200", "0x10de", "0x1f91", false);
    bind(root, &root.join("sys/bus/pci/devices/0000:01:00.0"), "nvidia");

    let card0 = root.join("sys/class/drm/card0/device");
    fs::create_dir_all(&card0).unwrap();
    bind(root, &card0, "i915");
    for (connector, status) in [("eDP-1", "connected"), ("HDMI-A-1", "disconnected")] {
        let dir = root.join("sys/class/drm").join(format!("card0-{}", connector));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("status"), format!("{}\n", status)).unwrap();
    }

    fs::write(
        root.join("modules"),
        "i915 2428928 12 - Live 0x0000000000000000\n\
         nvidia_drm 77824 2 - Live 0x0000000000000000\n\
         nvidia 35446784 40 nvidia_drm, Live 0x0000000000000000\n",
    )
    .unwrap();

    fs::create_dir_all(root.join("xorg.conf.d")).unwrap();
    fs::create_dir_all(root.join("etc/modprobe.d")).unwrap();
    fs::create_dir_all(root.join("run")).unwrap();
}

fn config_for(root: &Path) -> GpuManagerConfig {
    let mut config = GpuManagerConfig::default();
    config.paths.last_boot_file = root.join("var/lib/ubuntu-drivers-common/last_gfx_boot");
    config.paths.offloading_conf = root.join("var/lib/ubuntu-drivers-common/requires_offloading");
    config.paths.gpu_detection_path = root.join("run");
    config.paths.prime_settings = root.join("etc/prime-discrete");
    config.paths.xorg_conf_d = root.join("xorg.conf.d");
    config.paths.modprobe_d = root.join("etc/modprobe.d");
    config.paths.amdgpu_pro_px = root.join("opt/amdgpu-pro/bin/amdgpu-pro-px");
    config
}

fn boot(tmp: &TempDir, config: &GpuManagerConfig, options: &RunOptions) -> RunStatus {
    let sysfs = SysfsRoot::new(tmp.path());
    let mut platform = LinuxPlatform::new(sysfs.clone(), config)
        .with_dry_run(true)
        .with_modules_file(Some(tmp.path().join("modules")))
        .with_multiarch("x86_64-linux-gnu");
    run::run(&sysfs, config, &mut platform, options).unwrap()
}

fn prime_configured(mode: PrimeMode) -> Outcome {
    Outcome::PrimeConfigured {
        mode,
        offloading_saved: true,
    }
}

#[test]
fn test_first_boot_on_demand() {
    let tmp = TempDir::new().unwrap();
    create_optimus_fixture(tmp.path());
    let config = config_for(tmp.path());
    fs::write(&config.paths.prime_settings, "on-demand\n").unwrap();

    let status = boot(&tmp, &config, &RunOptions::default());
    assert_eq!(
        status,
        RunStatus::Completed {
            outcome: prime_configured(PrimeMode::OnDemand),
            changed: false
        }
    );
    assert_eq!(status.exit_code(), 0);

    let offload = fs::read_to_string(tmp.path().join(OFFLOAD_CONF)).unwrap();
    assert!(offload.contains("AllowNVIDIAGPUScreens"));
    assert!(!tmp.path().join(PRIME_CONF).exists());

    // The snapshot of this boot replaced the first-boot placeholder.
    let saved = fs::read_to_string(&config.paths.last_boot_file).unwrap();
    assert_eq!(saved, "8086:3e9b;0000:00:02:0;1\n10de:1f91;0000:01:00:0;0\n");

    // Dry run leaves power control and the offloading marker alone.
    assert_eq!(
        fs::read_to_string(tmp.path().join("sys/bus/pci/devices/0000:01:00.0/power/control"))
            .unwrap(),
        "on\n"
    );
    assert!(!config.paths.offloading_conf.exists());
}

#[test]
fn test_switching_preference_between_boots() {
    let tmp = TempDir::new().unwrap();
    create_optimus_fixture(tmp.path());
    let config = config_for(tmp.path());

    fs::write(&config.paths.prime_settings, "on-demand\n").unwrap();
    boot(&tmp, &config, &RunOptions::default());

    fs::write(&config.paths.prime_settings, "on\n").unwrap();
    let status = boot(&tmp, &config, &RunOptions::default());
    assert_eq!(
        status,
        RunStatus::Completed {
            outcome: prime_configured(PrimeMode::On),
            changed: false
        }
    );

    let prime = fs::read_to_string(tmp.path().join(PRIME_CONF)).unwrap();
    assert!(prime.starts_with("# DO NOT EDIT. AUTOMATICALLY GENERATED BY gpu-manager"));
    assert!(prime.contains("ModulePath \"/x86_64-linux-gnu/nvidia/xorg\""));
    assert!(!tmp.path().join(OFFLOAD_CONF).exists());

    fs::write(&config.paths.prime_settings, "off\n").unwrap();
    let status = boot(&tmp, &config, &RunOptions::default());
    assert_eq!(
        status,
        RunStatus::Completed {
            outcome: prime_configured(PrimeMode::Off),
            changed: false
        }
    );
    assert!(!tmp.path().join(PRIME_CONF).exists());
    assert!(!tmp.path().join(OFFLOAD_CONF).exists());
}

#[test]
fn test_new_card_is_a_change() {
    let tmp = TempDir::new().unwrap();
    create_optimus_fixture(tmp.path());
    let config = config_for(tmp.path());

    let previous = "8086:3e9b;0000:00:02:0;1\n";
    fs::create_dir_all(config.paths.last_boot_file.parent().unwrap()).unwrap();
    fs::write(&config.paths.last_boot_file, previous).unwrap();

    let status = boot(&tmp, &config, &RunOptions::default());
    assert!(matches!(status, RunStatus::Completed { changed: true, .. }));
}

#[test]
fn test_kernel_parameter_disables_run() {
    let tmp = TempDir::new().unwrap();
    create_optimus_fixture(tmp.path());
    fs::write(tmp.path().join("proc/cmdline"), "ro quiet nogpumanager\n").unwrap();
    let config = config_for(tmp.path());

    let status = boot(&tmp, &config, &RunOptions::default());
    assert_eq!(status, RunStatus::DisabledByKernelParameter);
    assert_eq!(status.exit_code(), 2);
    assert!(!config.paths.last_boot_file.exists());
    assert!(!tmp.path().join(OFFLOAD_CONF).exists());
}

#[test]
fn test_nvidia_only_desktop_drops_offload_layout() {
    let tmp = TempDir::new().unwrap();
    create_optimus_fixture(tmp.path());
    let config = config_for(tmp.path());
    fs::write(tmp.path().join(OFFLOAD_CONF), "stale\n").unwrap();

    let fake = tmp.path().join("fake-lspci");
    fs::write(&fake, "10de:1f91;0000:01:00:0;1\n").unwrap();
    let options = RunOptions {
        fake_lspci: Some(fake),
        ..RunOptions::default()
    };

    let status = boot(&tmp, &config, &options);
    assert_eq!(
        status,
        RunStatus::Completed {
            outcome: Outcome::OffloadLayoutRemoved,
            changed: false
        }
    );
    assert!(!tmp.path().join(OFFLOAD_CONF).exists());
}

#[test]
fn test_passthrough_gpu_is_ignored() {
    let tmp = TempDir::new().unwrap();
    create_optimus_fixture(tmp.path());
    let nvidia = tmp.path().join("sys/bus/pci/devices/0000:01:00.0");
    fs::remove_file(nvidia.join("driver")).unwrap();
    bind(tmp.path(), &nvidia, "pci-stub");
    let config = config_for(tmp.path());

    let status = boot(&tmp, &config, &RunOptions::default());
    assert_eq!(
        status,
        RunStatus::Completed {
            outcome: Outcome::NothingToDo,
            changed: false
        }
    );

    let (saved, _) = boot_state::load_or_create(&config.paths.last_boot_file).unwrap();
    assert_eq!(saved.len(), 1);
}
