//! The instance database: CRUD over persisted instance groups, grounded on
//! `instance_database.cpp`.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use cvd_error::{Action, Error, ErrorSource, Resource, Result};

use crate::filter::{group_matches, instance_matches, Filter};
use crate::model::{InstanceGroup, PersistentData};
use crate::store::Viewer;
use crate::validate::{is_valid_group_name, is_valid_instance_name};

const INTERNAL_GROUP_NAME: &str = "cvd";
const UNSET_ID: u32 = 0;

pub struct InstanceDatabase {
    viewer: Viewer,
}

impl InstanceDatabase {
    pub fn new(backing_file: impl AsRef<Path>) -> Self {
        InstanceDatabase {
            viewer: Viewer::new(backing_file.as_ref().to_path_buf()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.viewer
            .with_shared_lock(|data| Ok(data.instance_groups.is_empty()))
    }

    /// Removes every group and returns what was removed, for the caller to
    /// stop/clean up outside the lock.
    pub fn clear(&self) -> Result<Vec<InstanceGroup>> {
        self.viewer.with_exclusive_lock(|data| {
            Ok(std::mem::take(&mut data.instance_groups))
        })
    }

    pub fn add_instance_group(&self, mut group: InstanceGroup) -> Result<InstanceGroup> {
        if !group.name.is_empty() && !is_valid_group_name(&group.name) {
            return Err(Error::new(
                ErrorSource::Validation(format!("group name \"{}\" is ill-formed", group.name)),
                Action::Validating,
                Resource::Group {
                    name: group.name.clone(),
                },
            ));
        }
        for instance in &group.instances {
            if !is_valid_instance_name(&instance.name) {
                return Err(Error::new(
                    ErrorSource::Validation(format!(
                        "instance name \"{}\" is invalid",
                        instance.name
                    )),
                    Action::Validating,
                    Resource::Instance { id: instance.id },
                ));
            }
        }
        self.viewer.with_exclusive_lock(|data| {
            if group.name.is_empty() {
                group.name = gen_unique_group_name(data)?;
            }
            if !find_groups(
                data,
                &Filter {
                    group_name: Some(group.name.clone()),
                    ..Default::default()
                },
            )
            .is_empty()
            {
                return Err(Error::new(
                    ErrorSource::Conflict(format!(
                        "an instance group already exists with name: {}",
                        group.name
                    )),
                    Action::Creating,
                    Resource::Group {
                        name: group.name.clone(),
                    },
                ));
            }
            if !find_groups(
                data,
                &Filter {
                    home: Some(group.home_directory.clone()),
                    ..Default::default()
                },
            )
            .is_empty()
            {
                return Err(Error::new(
                    ErrorSource::Conflict(format!(
                        "an instance group already exists with HOME directory: {}",
                        group.home_directory
                    )),
                    Action::Creating,
                    Resource::Directory {
                        path: group.home_directory.clone(),
                    },
                ));
            }

            let mut ids_to_name: HashMap<u32, String> = HashMap::new();
            for existing in &data.instance_groups {
                for instance in &existing.instances {
                    if instance.id != UNSET_ID {
                        ids_to_name
                            .insert(instance.id, format!("{}/{}", existing.name, instance.name));
                    }
                }
            }
            for instance in &group.instances {
                if instance.id == UNSET_ID {
                    continue;
                }
                if let Some(existing_name) = ids_to_name.get(&instance.id) {
                    return Err(Error::new(
                        ErrorSource::Conflict(format!(
                            "new instance conflicts with existing instance: {} with id {}",
                            existing_name, instance.id
                        )),
                        Action::Creating,
                        Resource::Instance { id: instance.id },
                    ));
                }
            }

            data.instance_groups.push(group.clone());
            Ok(group)
        })
    }

    pub fn update_instance_group(&self, group: &InstanceGroup) -> Result<()> {
        self.viewer.with_exclusive_lock(|data| {
            for existing in data.instance_groups.iter_mut() {
                if existing.name == group.name {
                    *existing = group.clone();
                    return Ok(());
                }
            }
            Err(Error::new(
                ErrorSource::NotFound(format!("group not found (name = {})", group.name)),
                Action::Storing,
                Resource::Group {
                    name: group.name.clone(),
                },
            ))
        })
    }

    /// Returns whether a group with this name was found and removed.
    pub fn remove_instance_group(&self, group_name: &str) -> Result<bool> {
        self.viewer.with_exclusive_lock(|data| {
            let before = data.instance_groups.len();
            data.instance_groups.retain(|g| g.name != group_name);
            Ok(data.instance_groups.len() != before)
        })
    }

    pub fn find_groups(&self, filter: &Filter) -> Result<Vec<InstanceGroup>> {
        self.viewer
            .with_shared_lock(|data| Ok(find_groups(data, filter)))
    }

    /// Exactly one group must match; any other count is an error.
    pub fn find_group(&self, filter: &Filter) -> Result<InstanceGroup> {
        let mut groups = self.find_groups(filter)?;
        match groups.len() {
            1 => Ok(groups.remove(0)),
            0 => Err(Error::new(
                ErrorSource::NotFound("no matching instance group".into()),
                Action::Selecting,
                Resource::Selection,
            )),
            n => Err(Error::new(
                ErrorSource::Ambiguous(format!("{n} matching instance groups")),
                Action::Selecting,
                Resource::Selection,
            )),
        }
    }

    pub fn find_instance_with_group(
        &self,
        filter: &Filter,
    ) -> Result<(crate::model::Instance, InstanceGroup)> {
        if filter.instance_names.len() > 1 {
            return Err(Error::new(
                ErrorSource::Validation(format!(
                    "can't find a single instance when multiple names specified: {}",
                    filter.instance_names.len()
                )),
                Action::Selecting,
                Resource::Selection,
            ));
        }
        self.viewer.with_shared_lock(|data| {
            let mut found = None;
            for group in &data.instance_groups {
                if !group_matches(group, filter) {
                    continue;
                }
                for instance in &group.instances {
                    if !instance_matches(instance, filter) {
                        continue;
                    }
                    if found.is_some() {
                        return Err(Error::new(
                            ErrorSource::Ambiguous("found more than one instance".into()),
                            Action::Selecting,
                            Resource::Selection,
                        ));
                    }
                    found = Some((instance.clone(), group.clone()));
                }
            }
            found.ok_or_else(|| {
                Error::new(
                    ErrorSource::NotFound("found no matching instances".into()),
                    Action::Selecting,
                    Resource::Selection,
                )
            })
        })
    }

    pub fn instance_groups(&self) -> Result<Vec<InstanceGroup>> {
        self.viewer
            .with_shared_lock(|data| Ok(data.instance_groups.clone()))
    }

    /// Appends every group found under the `"Groups"` key of `json` to the
    /// database. Used to seed the database from an externally-produced
    /// snapshot; does not replace what's already there.
    pub fn load_from_json(&self, json: &serde_json::Value) -> Result<()> {
        let array = json.get("Groups").and_then(|v| v.as_array()).ok_or_else(|| {
            Error::new(
                ErrorSource::Validation("expected a \"Groups\" array".into()),
                Action::Loading,
                Resource::Database,
            )
        })?;
        let mut groups = Vec::with_capacity(array.len());
        for value in array {
            let group: InstanceGroup = serde_json::from_value(value.clone()).map_err(|e| {
                Error::new(
                    ErrorSource::Serde(std::sync::Arc::new(e)),
                    Action::Loading,
                    Resource::Database,
                )
            })?;
            groups.push(group);
        }
        self.viewer.with_exclusive_lock(|data| {
            data.instance_groups.extend(groups);
            Ok(())
        })
    }

    pub fn set_acloud_translator_optout(&self, optout: bool) -> Result<()> {
        self.viewer.with_exclusive_lock(|data| {
            data.acloud_translator_optout = optout;
            Ok(())
        })
    }

    pub fn acloud_translator_optout(&self) -> Result<bool> {
        self.viewer
            .with_shared_lock(|data| Ok(data.acloud_translator_optout))
    }
}

fn find_groups(data: &PersistentData, filter: &Filter) -> Vec<InstanceGroup> {
    data.instance_groups
        .iter()
        .filter(|g| group_matches(g, filter))
        .cloned()
        .collect()
}

/// Synthesizes a group name of the form `cvd_{n}`, trying `n` from 1 up to
/// one past the current group count. Bounded this way because there can be
/// at most that many distinct unused names among that many existing groups;
/// exceeding the bound means the name set and the loop disagree about their
/// own size, which is a bug, not a user-facing condition.
fn gen_unique_group_name(data: &PersistentData) -> Result<String> {
    let existing: BTreeSet<&str> = data.instance_groups.iter().map(|g| g.name.as_str()).collect();
    for i in 1..=(existing.len() + 1) {
        let candidate = format!("{INTERNAL_GROUP_NAME}_{i}");
        if !existing.contains(candidate.as_str()) {
            return Ok(candidate);
        }
    }
    Err(Error::new(
        ErrorSource::Internal(format!(
            "can't generate unique group name: a set of size {} contains {} elements",
            existing.len(),
            existing.len() + 1
        )),
        Action::Creating,
        Resource::Database,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Instance;

    fn group(name: &str, home: &str) -> InstanceGroup {
        InstanceGroup {
            name: name.into(),
            home_directory: home.into(),
            host_artifacts_path: String::new(),
            product_out_paths: vec![],
            start_time: String::new(),
            instances: vec![Instance::new(1, "phone")],
        }
    }

    #[test]
    fn add_then_find_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        db.add_instance_group(group("cvd_1", "/home/u/cvd_1")).unwrap();
        let found = db.find_group(&Filter::default()).unwrap();
        assert_eq!(found.name, "cvd_1");
    }

    #[test]
    fn empty_name_is_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        let added = db.add_instance_group(group("", "/home/u/a")).unwrap();
        assert_eq!(added.name, "cvd_1");
        let added2 = db.add_instance_group(group("", "/home/u/b")).unwrap();
        assert_eq!(added2.name, "cvd_2");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        db.add_instance_group(group("cvd_1", "/home/u/a")).unwrap();
        let err = db.add_instance_group(group("cvd_1", "/home/u/b")).unwrap_err();
        assert_eq!(err.kind(), cvd_error::ErrorKind::LocalResourceAlreadyInUse);
    }

    #[test]
    fn duplicate_home_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        db.add_instance_group(group("cvd_1", "/home/u/a")).unwrap();
        let err = db.add_instance_group(group("cvd_2", "/home/u/a")).unwrap_err();
        assert_eq!(err.kind(), cvd_error::ErrorKind::LocalResourceAlreadyInUse);
    }

    #[test]
    fn conflicting_explicit_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        db.add_instance_group(group("cvd_1", "/home/u/a")).unwrap();
        let mut g2 = group("cvd_2", "/home/u/b");
        g2.instances[0].id = 1;
        let err = db.add_instance_group(g2).unwrap_err();
        assert_eq!(err.kind(), cvd_error::ErrorKind::LocalResourceAlreadyInUse);
    }

    #[test]
    fn remove_then_find_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        db.add_instance_group(group("cvd_1", "/home/u/a")).unwrap();
        assert!(db.remove_instance_group("cvd_1").unwrap());
        assert!(db.is_empty().unwrap());
        assert!(!db.remove_instance_group("cvd_1").unwrap());
    }

    #[test]
    fn find_instance_with_group_requires_single_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        let mut filter = Filter::default();
        filter.instance_names.insert("a".into());
        filter.instance_names.insert("b".into());
        assert!(db.find_instance_with_group(&filter).is_err());
    }

    #[test]
    fn acloud_optout_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        assert!(!db.acloud_translator_optout().unwrap());
        db.set_acloud_translator_optout(true).unwrap();
        assert!(db.acloud_translator_optout().unwrap());
    }

    #[test]
    fn load_from_json_appends_groups() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        let json = serde_json::json!({
            "Groups": [
                {
                    "name": "cvd_1",
                    "home_directory": "/home/u/a",
                    "host_artifacts_path": "",
                    "product_out_paths": [],
                    "start_time": "",
                    "instances": []
                }
            ]
        });
        db.load_from_json(&json).unwrap();
        assert_eq!(db.instance_groups().unwrap().len(), 1);
    }
}
