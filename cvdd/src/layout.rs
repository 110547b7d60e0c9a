//! Where this daemon's own state lives, distinct from §3's "on-disk layout
//! of `cuttlefish_config.json`" (explicitly out of scope beyond computing a
//! path to it from a home directory).

use std::path::{Path, PathBuf};

/// Name of the per-group config file this core looks for under a group's
/// home directory, matching `config_utils.cpp`'s
/// `GetGlobalConfigFileLink` convention (`$HOME/.cuttlefish_config.json`)
/// applied per-group rather than per-user.
pub const CONFIG_FILE_NAME: &str = ".cuttlefish_config.json";

/// Root directory under which this daemon keeps its own state: the
/// instance database, lock files, and (unless a caller supplies an
/// explicit `--home`) default per-group directories. Rooted at the
/// invoking user's `$HOME`, not the system-wide home, so `HOME` overrides
/// (see `cvd_selector::overridden_home_directory`) relocate the whole
/// daemon's state along with selection.
pub fn state_root(home_env: &str) -> PathBuf {
    Path::new(home_env).join(".cvd")
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join("instance_database.json")
}

pub fn lock_dir(root: &Path) -> PathBuf {
    root.join("instance_locks")
}

/// Bound on the instance id namespace `cvd-lock` scans for unused ids.
pub const MAX_INSTANCE_ID: u32 = 64;
