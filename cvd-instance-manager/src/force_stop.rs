//! Forced reclamation: kill stray `run_cvd` processes and tidy up their
//! lock files, independent of the instance database. Grounded on
//! `reset_client_utils.cpp` (`IsStillRunCvd`, `SendSignal`,
//! `DeleteLockFile`, `ForcefullyStopGroup`, `KillAllCuttlefishInstances`)
//! and `run_cvd_proc_collector.cpp` (`CollectInfo`'s home-directory
//! grouping, env-derived instance id).
//!
//! This is best-effort and outside the database contract, per spec.md §9:
//! it never touches `cvd-db`, only the lock directory and live processes.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;

use cvd_error::{Action, Error, ErrorSource, Resource, Result};
use cvd_lock::LockManager;
use nix::sys::signal::{self, Signal};
use nix::unistd::{Pid, Uid};

const RUN_CVD_EXE_NAME: &str = "run_cvd";
const CUTTLEFISH_INSTANCE_ENV: &str = "CUTTLEFISH_INSTANCE";
const HOME_ENV: &str = "HOME";

/// One live `run_cvd` process this host knows about.
struct RunCvdProc {
    pid: i32,
    home: String,
    instance_id: u32,
}

fn read_environ(pid: i32) -> Option<HashMap<String, String>> {
    let raw = fs::read(format!("/proc/{pid}/environ")).ok()?;
    let mut env = HashMap::new();
    for entry in raw.split(|b| *b == 0) {
        if entry.is_empty() {
            continue;
        }
        let text = String::from_utf8_lossy(entry);
        if let Some((key, value)) = text.split_once('=') {
            env.insert(key.to_string(), value.to_string());
        }
    }
    Some(env)
}

fn exe_basename(pid: i32) -> Option<String> {
    let target = fs::read_link(format!("/proc/{pid}/exe")).ok()?;
    target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

fn owner_uid(pid: i32) -> Option<u32> {
    fs::metadata(format!("/proc/{pid}")).ok().map(|m| m.uid())
}

/// Enumerates every `/proc/<pid>` that is a `run_cvd` process owned by
/// `uid` (current user when `None`), matching `ExtractAllRunCvdInfo`'s
/// filter-by-exec-name-then-uid order.
fn collect_run_cvd_procs(uid: Option<u32>) -> Result<Vec<RunCvdProc>> {
    let wanted_uid = uid.unwrap_or_else(|| Uid::current().as_raw());
    let mut procs = Vec::new();
    let entries = fs::read_dir("/proc").map_err(|e| {
        Error::new(
            ErrorSource::Io(std::sync::Arc::new(e)),
            Action::Loading,
            Resource::Directory {
                path: "/proc".into(),
            },
        )
    })?;
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        if exe_basename(pid).as_deref() != Some(RUN_CVD_EXE_NAME) {
            continue;
        }
        if owner_uid(pid) != Some(wanted_uid) {
            continue;
        }
        let Some(env) = read_environ(pid) else {
            continue;
        };
        let Some(home) = env.get(HOME_ENV).cloned() else {
            continue;
        };
        let Some(instance_id) = env
            .get(CUTTLEFISH_INSTANCE_ENV)
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };
        procs.push(RunCvdProc {
            pid,
            home,
            instance_id,
        });
    }
    Ok(procs)
}

fn group_by_home(procs: Vec<RunCvdProc>) -> HashMap<String, Vec<RunCvdProc>> {
    let mut groups: HashMap<String, Vec<RunCvdProc>> = HashMap::new();
    for proc in procs {
        groups.entry(proc.home.clone()).or_default().push(proc);
    }
    groups
}

/// `SendSignal` + `DeleteLockFile`: SIGKILL every pid in the group, then
/// best-effort remove each instance's lock file. Logs and continues past
/// individual failures rather than aborting the whole group, matching
/// `ForcefullyStopGroup`.
fn forcefully_stop_group(home: &str, procs: &[RunCvdProc], lock_manager: &LockManager) {
    for proc in procs {
        match signal::kill(Pid::from_raw(proc.pid), Signal::SIGKILL) {
            Ok(()) => tracing::debug!(pid = proc.pid, "sent SIGKILL to stray run_cvd"),
            Err(e) => tracing::error!(pid = proc.pid, error = %e, "failed to SIGKILL run_cvd"),
        }
    }
    for id in procs.iter().map(|p| p.instance_id).collect::<std::collections::BTreeSet<_>>() {
        if let Err(e) = lock_manager.remove_lock_file(id) {
            tracing::error!(
                home,
                instance_id = id,
                error = %e,
                "failed to remove lock file while force-stopping group"
            );
        }
    }
}

/// Kills every `run_cvd` process this user owns and tidies up their lock
/// files, grouped by home directory. Matches `KillAllCuttlefishInstances`'s
/// forced-reclamation half (the `stop_cvd`-retry half lives in
/// `InstanceManager::cvd_clear`, which goes through the database).
pub fn force_stop_all(uid: Option<u32>, lock_manager: &LockManager) -> Result<()> {
    let groups = group_by_home(collect_run_cvd_procs(uid)?);
    for (home, procs) in &groups {
        forcefully_stop_group(home, procs, lock_manager);
    }
    Ok(())
}

/// Kills only the group of `run_cvd` processes that contains `instance_id`,
/// matching `ForcefullyStopGroup(uid_t any_id_in_group)`'s "find the group
/// this id belongs to, then stop the whole group" behavior.
pub fn force_stop_group_containing(instance_id: u32, lock_manager: &LockManager) -> Result<()> {
    let groups = group_by_home(collect_run_cvd_procs(None)?);
    for (home, procs) in &groups {
        if procs.iter().any(|p| p.instance_id == instance_id) {
            forcefully_stop_group(home, procs, lock_manager);
        }
    }
    Ok(())
}
