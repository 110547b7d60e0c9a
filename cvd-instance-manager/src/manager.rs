//! The composition root: [`InstanceManager`] drives [`cvd_lock::LockManager`]
//! and [`cvd_db::InstanceDatabase`] together to implement the five
//! lifecycle operations spec.md §4.4 names. Grounded on
//! `instance_manager.cpp`.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use cvd_db::{Filter, Instance, InstanceDatabase, InstanceGroup, InstanceState};
use cvd_error::{Action, Error, ErrorSource, Resource, Result};
use cvd_lock::{InUseState, InstanceLockFile, LockManager};

use crate::dirs::{create_or_link_group_directories, remove_group_directory, GroupDirectories};
use crate::host_tool_target::stop_bin_name;
use crate::params::{InstanceGroupParams, InstanceParams};
use crate::subprocess::run_to_completion;

const CUTTLEFISH_CONFIG_ENV: &str = "CUTTLEFISH_CONFIG_FILE";

/// An allocated lock paired with the caller's requested name for that slot,
/// the Rust shape of `InstanceManager::InternalInstanceDesc`.
struct InternalInstanceDesc {
    lock_file: InstanceLockFile,
    name: Option<String>,
}

/// Orchestrates group/instance lifecycle operations. Borrows the lock
/// manager and database rather than owning them: per spec.md §3
/// ("Ownership"), both are owned by whatever composition root constructs
/// this (the `cvdd` binary's request dispatcher).
pub struct InstanceManager<'a> {
    lock_manager: &'a LockManager,
    db: &'a InstanceDatabase,
}

impl<'a> InstanceManager<'a> {
    pub fn new(lock_manager: &'a LockManager, db: &'a InstanceDatabase) -> Self {
        InstanceManager { lock_manager, db }
    }

    pub fn has_instance_groups(&self) -> Result<bool> {
        Ok(!self.db.is_empty()?)
    }

    /// The underlying database, for callers (the `cvdd` request dispatcher)
    /// that need to hand it to `cvd_selector` directly.
    pub fn db(&self) -> &InstanceDatabase {
        self.db
    }

    pub fn find_groups(&self, filter: &Filter) -> Result<Vec<InstanceGroup>> {
        self.db.find_groups(filter)
    }

    pub fn find_group(&self, filter: &Filter) -> Result<InstanceGroup> {
        self.db.find_group(filter)
    }

    pub fn find_instance_with_group(&self, filter: &Filter) -> Result<(Instance, InstanceGroup)> {
        self.db.find_instance_with_group(filter)
    }

    pub fn update_instance_group(&self, group: &InstanceGroup) -> Result<()> {
        self.db.update_instance_group(group)
    }

    /// Acquires one lock per requested instance: explicit ids first (in the
    /// order given, with an eager repeats check), then an unused-id scan
    /// for each instance that left its id unset. This ordering is the fix
    /// for the deadlock spec.md §5 calls out: scanning for an unused id
    /// before a later explicit request could otherwise hand out an id that
    /// request needs.
    fn allocate_and_lock_instance_ids(
        &self,
        instances: Vec<InstanceParams>,
    ) -> Result<Vec<InternalInstanceDesc>> {
        let mut requested_ids = BTreeSet::new();
        let mut requested_locks = Vec::new();
        for instance in &instances {
            if let Some(id) = instance.instance_id {
                if !requested_ids.insert(id) {
                    return Err(Error::new(
                        ErrorSource::Validation(format!(
                            "requested instance ids must be distinct, but {id} is repeated"
                        )),
                        Action::Validating,
                        Resource::Instance { id },
                    ));
                }
                requested_locks.push(self.lock_manager.acquire_lock(id)?);
            }
        }

        let mut descs = Vec::with_capacity(instances.len());
        let mut requested_iter = requested_locks.into_iter();
        for instance in instances {
            let lock_file = if instance.instance_id.is_some() {
                requested_iter.next().ok_or_else(|| {
                    Error::internal(
                        "ran out of pre-acquired explicit-id locks",
                        Action::Locking,
                        Resource::Selection,
                    )
                })?
            } else {
                self.lock_manager.acquire_unused_lock()?
            };
            descs.push(InternalInstanceDesc {
                lock_file,
                name: instance.per_instance_name,
            });
        }
        Ok(descs)
    }

    /// Creates a new instance group: allocates ids, materializes
    /// directories, inserts the record, then marks every newly acquired
    /// lock in-use. A failure at any step releases the locks acquired so
    /// far (their `Drop` impls do this automatically) without inserting
    /// anything into the database.
    pub fn create_instance_group(
        &self,
        group_params: InstanceGroupParams,
        directories: GroupDirectories,
    ) -> Result<InstanceGroup> {
        if group_params.instances.len() != directories.product_out_paths.len() {
            return Err(Error::new(
                ErrorSource::Validation(format!(
                    "number of product output directories ({}) doesn't match number of \
                     instances ({})",
                    directories.product_out_paths.len(),
                    group_params.instances.len()
                )),
                Action::Validating,
                Resource::Selection,
            ));
        }

        let descs = self.allocate_and_lock_instance_ids(group_params.instances)?;

        let home_directory = group_params.home_directory;
        let host_artifacts_path = if group_params.host_artifacts_path.is_empty() {
            crate::dirs::host_artifacts_dir(&home_directory)
        } else {
            group_params.host_artifacts_path
        };
        let instances: Vec<Instance> = descs
            .iter()
            .map(|desc| {
                let id = desc.lock_file.instance();
                let name = desc
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("cvd-{id}"));
                Instance::new(id, name)
            })
            .collect();
        let product_out_paths = (0..instances.len())
            .map(|i| crate::dirs::product_out_dir(&home_directory, i))
            .collect();

        let group = InstanceGroup {
            name: group_params.group_name,
            home_directory,
            host_artifacts_path,
            product_out_paths,
            start_time: monotonic_creation_timestamp(),
            instances,
        };

        create_or_link_group_directories(&group, directories)?;

        let group = self.db.add_instance_group(group)?;

        for desc in descs {
            let mut lock_file = desc.lock_file;
            lock_file.set_status(InUseState::InUse)?;
        }

        Ok(group)
    }

    /// Tears down a group: refuses while any instance is non-terminal,
    /// best-effort removes lock files, recursively removes the group's
    /// home directory when it's under `per_user_root`, then removes the
    /// database record. Returns whether the database actually had it.
    pub fn remove_instance_group(
        &self,
        group: InstanceGroup,
        per_user_root: &Path,
    ) -> Result<bool> {
        if group.has_active_instances() {
            return Err(Error::new(
                ErrorSource::Conflict("group still contains active instances".into()),
                Action::Removing,
                Resource::Group {
                    name: group.name.clone(),
                },
            ));
        }
        for instance in &group.instances {
            if instance.id == 0 {
                continue;
            }
            if let Err(e) = self.lock_manager.remove_lock_file(instance.id) {
                tracing::error!(
                    instance_id = instance.id,
                    error = %e,
                    "failed to remove instance id lock"
                );
            }
        }
        remove_group_directory(&group, per_user_root)?;
        self.db.remove_instance_group(&group.name)
    }

    /// Resolves the stop binary name for a group's host artifacts tree.
    pub fn stop_bin(&self, host_artifacts_path: &str) -> &'static str {
        stop_bin_name(Path::new(host_artifacts_path))
    }

    /// Runs the group's stop binary, retrying once without
    /// `--clear_instance_dirs` for older binaries that don't recognize it,
    /// then marks every instance stopped and releases its lock back to
    /// not-in-use. Stop-binary failure (on both tries) is tolerated per
    /// spec.md §7: logged, not propagated.
    pub fn issue_stop_command(&self, config_file_path: &str, mut group: InstanceGroup) -> Result<()> {
        let stop_bin = self.stop_bin(&group.host_artifacts_path);
        let bin_path = format!("{}/bin/{stop_bin}", group.host_artifacts_path);

        let mut with_clear = Command::new(&bin_path);
        with_clear
            .arg("--clear_instance_dirs")
            .env(CUTTLEFISH_CONFIG_ENV, config_file_path);
        if run_to_completion(with_clear, stop_bin).is_err() {
            tracing::warn!(
                bin = stop_bin,
                "stop binary failed with --clear_instance_dirs, retrying without it \
                 (likely an older binary that doesn't recognize the flag)"
            );
            let mut without_clear = Command::new(&bin_path);
            without_clear.env(CUTTLEFISH_CONFIG_ENV, config_file_path);
            if let Err(e) = run_to_completion(without_clear, stop_bin) {
                tracing::warn!(
                    home = %group.home_directory,
                    error = %e,
                    "error stopping instances; this can happen if they're already stopped"
                );
            }
        }

        for instance in group.instances.iter_mut() {
            instance.state = InstanceState::Stopped;
        }
        self.db.update_instance_group(&group)?;

        for instance in &group.instances {
            match self.lock_manager.acquire_lock(instance.id) {
                Ok(mut lock) => {
                    if let Err(e) = lock.set_status(InUseState::NotInUse) {
                        tracing::error!(instance_id = instance.id, error = %e, "failed to mark instance not-in-use");
                    }
                }
                Err(e) => {
                    tracing::error!(instance_id = instance.id, error = %e, "failed to acquire lock to release it");
                }
            }
        }
        Ok(())
    }

    /// Unconditionally tears down every group the database knows about:
    /// stops active ones (best-effort), removes lock files, and removes
    /// group directories. Never fails outright; every per-group problem is
    /// logged and the sweep continues, matching `CvdClear`.
    pub fn cvd_clear(&self, per_user_root: &Path, config_file_name: &str) -> Result<()> {
        let groups = self.db.clear()?;
        for group in groups {
            if group.has_active_instances() {
                match cuttlefish_config_path(&group.home_directory, config_file_name) {
                    Ok(config_path) => {
                        if let Err(e) = self.issue_stop_command(&config_path, group.clone()) {
                            tracing::error!(group = %group.name, error = %e, "failed to stop group during clear");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(group = %group.name, error = %e, "couldn't resolve config path, skipping stop");
                    }
                }
            }
            for instance in &group.instances {
                if instance.id == 0 {
                    continue;
                }
                if let Err(e) = self.lock_manager.remove_lock_file(instance.id) {
                    tracing::error!(instance_id = instance.id, error = %e, "failed to remove lock file during clear");
                }
            }
            if let Err(e) = remove_group_directory(&group, per_user_root) {
                tracing::error!(group = %group.name, error = %e, "failed to remove group directory during clear");
            }
        }
        Ok(())
    }
}

/// Seconds since the Unix epoch, stringified. This workspace carries no
/// calendar/formatting crate (the teacher doesn't need one either), and
/// `start_time` is opaque data to every reader except the selector's menu,
/// which only ever displays it back to the user verbatim.
fn monotonic_creation_timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

fn cuttlefish_config_path(home_directory: &str, config_file_name: &str) -> Result<String> {
    let path = Path::new(home_directory).join(config_file_name);
    if !path.exists() {
        return Err(Error::new(
            ErrorSource::NotFound(format!("no config file at {}", path.display())),
            Action::Loading,
            Resource::File {
                path: path.display().to_string(),
            },
        ));
    }
    Ok(path.display().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::InstanceParams;

    fn setup() -> (tempfile::TempDir, LockManager, InstanceDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let lock_manager = LockManager::new(dir.path().join("locks"), 10).unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        (dir, lock_manager, db)
    }

    #[test]
    fn create_assigns_explicit_and_implicit_ids() {
        let (dir, lock_manager, db) = setup();
        let manager = InstanceManager::new(&lock_manager, &db);
        let home = dir.path().join("home").to_str().unwrap().to_string();
        let params = InstanceGroupParams {
            group_name: "cvd_1".into(),
            home_directory: home,
            host_artifacts_path: String::new(),
            instances: vec![
                InstanceParams {
                    instance_id: Some(3),
                    per_instance_name: Some("a".into()),
                },
                InstanceParams {
                    instance_id: None,
                    per_instance_name: Some("b".into()),
                },
            ],
        };
        let directories = GroupDirectories {
            product_out_paths: vec![None, None],
            ..Default::default()
        };
        let group = manager.create_instance_group(params, directories).unwrap();
        assert_eq!(group.instances.len(), 2);
        assert_eq!(group.instances[0].id, 3);
        assert_ne!(group.instances[1].id, 3);
        assert_eq!(group.instances[1].id, 1);
    }

    #[test]
    fn create_rejects_mismatched_product_dir_count() {
        let (dir, lock_manager, db) = setup();
        let manager = InstanceManager::new(&lock_manager, &db);
        let home = dir.path().join("home").to_str().unwrap().to_string();
        let params = InstanceGroupParams {
            group_name: "cvd_1".into(),
            home_directory: home,
            host_artifacts_path: String::new(),
            instances: vec![InstanceParams::default()],
        };
        let directories = GroupDirectories::default();
        assert!(manager.create_instance_group(params, directories).is_err());
    }

    #[test]
    fn remove_fails_while_instances_active() {
        let (dir, lock_manager, db) = setup();
        let manager = InstanceManager::new(&lock_manager, &db);
        let home = dir.path().join("home").to_str().unwrap().to_string();
        let params = InstanceGroupParams {
            group_name: "cvd_1".into(),
            home_directory: home,
            host_artifacts_path: String::new(),
            instances: vec![InstanceParams::default()],
        };
        let directories = GroupDirectories {
            product_out_paths: vec![None],
            ..Default::default()
        };
        let mut group = manager.create_instance_group(params, directories).unwrap();
        group.instances[0].state = InstanceState::Running;
        manager.update_instance_group(&group).unwrap();

        let err = manager
            .remove_instance_group(group, dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), cvd_error::ErrorKind::LocalResourceAlreadyInUse);
    }

    #[test]
    fn remove_succeeds_once_stopped() {
        let (dir, lock_manager, db) = setup();
        let manager = InstanceManager::new(&lock_manager, &db);
        let home = dir.path().join("home").to_str().unwrap().to_string();
        let params = InstanceGroupParams {
            group_name: "cvd_1".into(),
            home_directory: home,
            host_artifacts_path: String::new(),
            instances: vec![InstanceParams::default()],
        };
        let directories = GroupDirectories {
            product_out_paths: vec![None],
            ..Default::default()
        };
        let group = manager.create_instance_group(params, directories).unwrap();
        assert!(manager.remove_instance_group(group, dir.path()).unwrap());
        assert!(manager.db.is_empty().unwrap());
    }
}
