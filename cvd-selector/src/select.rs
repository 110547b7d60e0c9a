//! Top-level `select_group`/`select_instance` entry points, grounded on
//! `selector.cpp`'s functions of the same name.

use std::io::{BufRead, Write};

use cvd_db::{Filter, Instance, InstanceDatabase, InstanceGroup};
use cvd_error::{Action, Error, ErrorSource, Resource, Result};

use crate::build_filter::build_filter_from_selectors;
use crate::env::{system_wide_home, Envs};
use crate::menu::prompt_user_for_group;
use crate::options::SelectorOptions;

fn get_default_group(db: &InstanceDatabase) -> Result<InstanceGroup> {
    let mut all_groups = db.find_groups(&Filter::default())?;
    if all_groups.len() == 1 {
        return Ok(all_groups.remove(0));
    }
    let home = system_wide_home()?;
    db.find_group(&Filter {
        home: Some(home),
        ..Default::default()
    })
}

fn find_group_or_default(filter: &Filter, db: &InstanceDatabase) -> Result<InstanceGroup> {
    if filter.is_empty() {
        get_default_group(db)
    } else {
        db.find_group(filter)
    }
}

fn find_default_instance(db: &InstanceDatabase) -> Result<(Instance, InstanceGroup)> {
    let group = get_default_group(db)?;
    if group.instances.len() != 1 {
        return Err(Error::new(
            ErrorSource::Ambiguous(
                "the default instance is the single instance in the default group".into(),
            ),
            Action::Selecting,
            Resource::Selection,
        ));
    }
    let instance = group.instances[0].clone();
    Ok((instance, group))
}

/// Resolves CLI selector flags plus environment down to exactly one group.
/// Falls back to an interactive menu only when `stdin_is_tty` is true;
/// otherwise an ambiguous selection is an error naming the narrowing
/// arguments the caller needs to supply.
pub fn select_group(
    db: &InstanceDatabase,
    selectors: &SelectorOptions,
    env: &Envs,
    stdin_is_tty: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<InstanceGroup> {
    if db.is_empty()? {
        return Err(Error::new(
            ErrorSource::NotFound("no instance groups available".into()),
            Action::Selecting,
            Resource::Selection,
        ));
    }
    let filter = build_filter_from_selectors(selectors, env)?;
    match find_group_or_default(&filter, db) {
        Ok(group) => Ok(group),
        Err(_) if stdin_is_tty => prompt_user_for_group(db, filter, input, output),
        Err(_) => Err(Error::new(
            ErrorSource::Ambiguous(
                "Multiple groups found. Narrow the selection with selector arguments or run in \
                 an interactive terminal."
                    .into(),
            ),
            Action::Selecting,
            Resource::Selection,
        )),
    }
}

/// Resolves CLI selector flags plus environment down to exactly one
/// (instance, group) pair. Never interactive: a specific instance is either
/// unambiguous from the given inputs or it isn't.
pub fn select_instance(
    db: &InstanceDatabase,
    selectors: &SelectorOptions,
    env: &Envs,
) -> Result<(Instance, InstanceGroup)> {
    let filter = build_filter_from_selectors(selectors, env)?;
    if filter.is_empty() {
        find_default_instance(db)
    } else {
        db.find_instance_with_group(&filter)
    }
}

/// True if file descriptor 0 (stdin) is attached to a terminal.
pub fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(0) != 0 }
}

#[cfg(test)]
mod test {
    use super::*;
    use cvd_db::Instance as DbInstance;

    fn one_group_db() -> (tempfile::TempDir, InstanceDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        db.add_instance_group(InstanceGroup {
            name: "cvd_1".into(),
            home_directory: "/home/u/1".into(),
            host_artifacts_path: String::new(),
            product_out_paths: vec![],
            start_time: String::new(),
            instances: vec![DbInstance::new(1, "phone")],
        })
        .unwrap();
        (dir, db)
    }

    #[test]
    fn single_group_is_the_default() {
        let (_dir, db) = one_group_db();
        let mut input = std::io::Cursor::new(Vec::new());
        let mut output = Vec::new();
        let group = select_group(
            &db,
            &SelectorOptions::default(),
            &Envs::new(),
            false,
            &mut input,
            &mut output,
        )
        .unwrap();
        assert_eq!(group.name, "cvd_1");
    }

    #[test]
    fn empty_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        let mut input = std::io::Cursor::new(Vec::new());
        let mut output = Vec::new();
        assert!(select_group(
            &db,
            &SelectorOptions::default(),
            &Envs::new(),
            false,
            &mut input,
            &mut output
        )
        .is_err());
    }

    #[test]
    fn select_instance_defaults_to_the_only_one() {
        let (_dir, db) = one_group_db();
        let (instance, group) =
            select_instance(&db, &SelectorOptions::default(), &Envs::new()).unwrap();
        assert_eq!(instance.name, "phone");
        assert_eq!(group.name, "cvd_1");
    }

    #[test]
    fn ambiguous_without_tty_names_multiple_groups_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        db.add_instance_group(InstanceGroup {
            name: "cvd_1".into(),
            home_directory: "/home/u/1".into(),
            host_artifacts_path: String::new(),
            product_out_paths: vec![],
            start_time: String::new(),
            instances: vec![DbInstance::new(1, "phone")],
        })
        .unwrap();
        db.add_instance_group(InstanceGroup {
            name: "cvd_2".into(),
            home_directory: "/home/u/2".into(),
            host_artifacts_path: String::new(),
            product_out_paths: vec![],
            start_time: String::new(),
            instances: vec![DbInstance::new(2, "tablet")],
        })
        .unwrap();
        let mut input = std::io::Cursor::new(Vec::new());
        let mut output = Vec::new();
        let err = select_group(
            &db,
            &SelectorOptions::default(),
            &Envs::new(),
            false,
            &mut input,
            &mut output,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Multiple groups found"));
    }
}
