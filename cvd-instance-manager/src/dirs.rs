//! Directory materialization: create-or-symlink the canonical locations a
//! group's record points at, grounded on `instance_manager.cpp`'s
//! `LinkOrMakeDir`/`CreateOrLinkGroupDirectories`/`RemoveGroupDirectory`.
//!
//! `cvd-db`'s [`cvd_db::InstanceGroup`] keeps only the fields spec.md lists
//! under §3 (`home_directory`, `host_artifacts_path`, `product_out_paths`),
//! not the separate `base_dir`/`home` split the original C++ record has.
//! Here the two collapse to one: a group's `home_directory` is both its
//! base directory and its home.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use cvd_db::InstanceGroup;
use cvd_error::{Action, Error, ErrorSource, Resource, Result};

/// Optional real-world targets to symlink into a new group's canonical
/// locations. A `None` slot gets an ordinary directory created in place
/// instead.
#[derive(Debug, Clone, Default)]
pub struct GroupDirectories {
    pub home: Option<PathBuf>,
    pub host_artifacts_path: Option<PathBuf>,
    pub product_out_paths: Vec<Option<PathBuf>>,
}

fn link_or_make_dir(target: Option<&Path>, path: &Path) -> Result<()> {
    match target {
        Some(target) => {
            if !target.is_dir() {
                return Err(Error::new(
                    ErrorSource::Validation(format!(
                        "{} is not an existing directory",
                        target.display()
                    )),
                    Action::Creating,
                    Resource::Directory {
                        path: target.display().to_string(),
                    },
                ));
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(e, path))?;
            }
            symlink(target, path).map_err(|e| io_err(e, path))
        }
        None => fs::create_dir_all(path).map_err(|e| io_err(e, path)),
    }
}

fn io_err(e: std::io::Error, path: &Path) -> Error {
    Error::new(
        ErrorSource::Io(std::sync::Arc::new(e)),
        Action::Creating,
        Resource::Directory {
            path: path.display().to_string(),
        },
    )
}

/// Creates (or symlinks) every directory the group's record names: its
/// home, its host artifacts tree, and one product-output directory per
/// instance. Canonical locations come from `group`, matching spec.md's
/// "the canonical location comes from the group record".
pub fn create_or_link_group_directories(
    group: &InstanceGroup,
    directories: GroupDirectories,
) -> Result<()> {
    link_or_make_dir(directories.home.as_deref(), Path::new(&group.home_directory))?;
    link_or_make_dir(
        directories.host_artifacts_path.as_deref(),
        Path::new(&group.host_artifacts_path),
    )?;
    for (i, product_out) in group.product_out_paths.iter().enumerate() {
        let target = directories.product_out_paths.get(i).and_then(|t| t.as_deref());
        link_or_make_dir(target, Path::new(product_out))?;
    }
    Ok(())
}

/// Recursively removes the group's home directory, but only when it sits
/// under `per_user_root` — never touches a directory outside it, matching
/// `RemoveGroupDirectory`'s same guard.
pub fn remove_group_directory(group: &InstanceGroup, per_user_root: &Path) -> Result<()> {
    let home = Path::new(&group.home_directory);
    if !home.starts_with(per_user_root) {
        tracing::warn!(
            home = %group.home_directory,
            root = %per_user_root.display(),
            "instance group home directory not under the per-user root, leaving it in place",
        );
        return Ok(());
    }
    if home.is_dir() {
        fs::remove_dir_all(home).map_err(|e| io_err(e, home))?;
    }
    Ok(())
}

/// Computes the canonical per-instance product-output directory for
/// instance index `i` within a group rooted at `home_directory`.
pub fn product_out_dir(home_directory: &str, i: usize) -> String {
    format!("{home_directory}/product_out_{i}")
}

/// Computes the canonical host-artifacts directory for a group rooted at
/// `home_directory`.
pub fn host_artifacts_dir(home_directory: &str) -> String {
    format!("{home_directory}/host_artifacts")
}

#[cfg(test)]
mod test {
    use super::*;
    use cvd_db::Instance;

    fn group(home: &str) -> InstanceGroup {
        InstanceGroup {
            name: "cvd_1".into(),
            home_directory: home.into(),
            host_artifacts_path: host_artifacts_dir(home),
            product_out_paths: vec![product_out_dir(home, 0)],
            start_time: String::new(),
            instances: vec![Instance::new(1, "phone")],
        }
    }

    #[test]
    fn creates_plain_directories_when_no_targets_given() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("cvd_1");
        let g = group(home.to_str().unwrap());
        create_or_link_group_directories(&g, GroupDirectories::default()).unwrap();
        assert!(home.is_dir());
        assert!(Path::new(&g.host_artifacts_path).is_dir());
        assert!(Path::new(&g.product_out_paths[0]).is_dir());
    }

    #[test]
    fn symlinks_to_supplied_target() {
        let dir = tempfile::tempdir().unwrap();
        let real_artifacts = dir.path().join("real_artifacts");
        fs::create_dir_all(&real_artifacts).unwrap();
        let home = dir.path().join("cvd_1");
        let g = group(home.to_str().unwrap());
        let directories = GroupDirectories {
            host_artifacts_path: Some(real_artifacts.clone()),
            ..Default::default()
        };
        create_or_link_group_directories(&g, directories).unwrap();
        let linked = Path::new(&g.host_artifacts_path);
        assert!(linked.is_symlink());
        assert_eq!(fs::canonicalize(linked).unwrap(), fs::canonicalize(&real_artifacts).unwrap());
    }

    #[test]
    fn remove_group_directory_refuses_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("elsewhere");
        fs::create_dir_all(&outside).unwrap();
        let g = group(outside.to_str().unwrap());
        let root = dir.path().join("per_user_root");
        remove_group_directory(&g, &root).unwrap();
        assert!(outside.is_dir());
    }

    #[test]
    fn remove_group_directory_removes_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("per_user_root");
        let home = root.join("cvd_1");
        fs::create_dir_all(&home).unwrap();
        let g = group(home.to_str().unwrap());
        remove_group_directory(&g, &root).unwrap();
        assert!(!home.exists());
    }
}
