use crate::sysfs::SysfsRoot;
use nix::sys::signal::{Signal, kill as send_signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

/// PIDs whose `comm` is exactly `name`, in ascending order.
pub fn pids_by_name(sysfs: &SysfsRoot, name: &str) -> Vec<Pid> {
    let Ok(entries) = sysfs.list_dir("proc") else {
        return Vec::new();
    };
    let mut pids: Vec<i32> = entries
        .iter()
        .filter_map(|entry| entry.parse::<i32>().ok())
        .filter(|pid| {
            sysfs
                .read_optional(format!("proc/{}/comm", pid))
                .ok()
                .flatten()
                .is_some_and(|comm| comm == name)
        })
        .collect();
    pids.sort_unstable();
    pids.into_iter().map(Pid::from_raw).collect()
}

/// Real uid from the `Uid:` line of `/proc/<pid>/status`.
pub fn uid_of(sysfs: &SysfsRoot, pid: Pid) -> Option<u32> {
    let status = sysfs
        .read_optional(format!("proc/{}/status", pid))
        .ok()
        .flatten()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// Account name for `uid` according to `/etc/passwd`.
pub fn user_of(sysfs: &SysfsRoot, uid: u32) -> Option<String> {
    let passwd = sysfs.read_optional("etc/passwd").ok().flatten()?;
    passwd.lines().find_map(|line| {
        let mut fields = line.split(':');
        let name = fields.next()?;
        let entry_uid: u32 = fields.nth(1)?.parse().ok()?;
        (entry_uid == uid).then(|| name.to_string())
    })
}

/// The `backend` process belonging to the greeter account, if any.
pub fn find_greeter_session(sysfs: &SysfsRoot, backend: &str, greeter: &str) -> Option<Pid> {
    let pids = pids_by_name(sysfs, backend);
    if pids.is_empty() {
        info!("Info: no PID found for {}.", backend);
        return None;
    }
    info!("INFO: found PID(s) {:?} for {}.", pids, backend);

    let pid = pids.into_iter().find(|&pid| {
        let Some(uid) = uid_of(sysfs, pid) else {
            return false;
        };
        let user = user_of(sysfs, uid);
        debug!("User: {:?} UID: {}", user, uid);
        user.as_deref() == Some(greeter)
    });

    match pid {
        Some(pid) => info!("INFO: found PID {} for {} main {} session.", pid, greeter, backend),
        None => info!("Info: no {} session of {} found.", backend, greeter),
    }
    pid
}

/// Send SIGKILL to `pid`.
pub fn kill(pid: Pid) -> bool {
    info!("Killing session process {}", pid);
    match send_signal(pid, Signal::SIGKILL) {
        Ok(()) => true,
        Err(e) => {
            warn!("Error: failed to kill {}: {}", pid, e);
            false
        }
    }
}
