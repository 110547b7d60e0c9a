//! The interactive disambiguation menu shown when a selector is ambiguous
//! and a terminal is available to ask the user. Message text and layout
//! follow the original selector's menu verbatim.

use std::fmt::Write as _;
use std::io::{BufRead, Write};

use cvd_db::{Filter, InstanceDatabase, InstanceGroup};
use cvd_error::{Action, Error, ErrorSource, Resource, Result};

/// Renders the numbered/lettered group-and-instance menu.
pub fn render_menu(groups: &[InstanceGroup]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Multiple instance groups found, please choose one:");
    for (group_idx, group) in groups.iter().enumerate() {
        let _ = writeln!(
            out,
            "  [{}] : {} (created: {})",
            group_idx, group.name, group.start_time
        );
        for (i, instance) in group.instances.iter().enumerate() {
            let letter = (b'a' + i as u8) as char;
            let _ = writeln!(
                out,
                "    <{}> {}-{} (id : {})",
                letter, group.name, instance.name, instance.id
            );
        }
    }
    out
}

/// Shows the menu on `output`, reads selections from `input` until one
/// resolves to a group, and returns it. A line that parses as an integer is
/// treated as a group index; anything else is treated as a group name.
pub fn prompt_user_for_group(
    db: &InstanceDatabase,
    mut filter: Filter,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<InstanceGroup> {
    let groups = db.find_groups(&Filter::default())?;
    let menu = render_menu(&groups);
    let _ = writeln!(output, "{menu}");

    loop {
        let mut line = String::new();
        let n = input.read_line(&mut line).map_err(|e| {
            Error::new(
                ErrorSource::Io(std::sync::Arc::new(e)),
                Action::Selecting,
                Resource::Selection,
            )
        })?;
        if n == 0 {
            return Err(Error::new(
                ErrorSource::NotFound("no selection given (input closed)".into()),
                Action::Selecting,
                Resource::Selection,
            ));
        }
        let trimmed = line.trim();
        let chosen_name = if let Ok(selection) = trimmed.parse::<i64>() {
            let n_groups = groups.len() as i64;
            if selection < 0 || selection >= n_groups {
                let _ = writeln!(
                    output,
                    "\n  Selection {selection} is beyond the range [0, {}]\n",
                    n_groups - 1
                );
                continue;
            }
            groups[selection as usize].name.clone()
        } else {
            trimmed.to_string()
        };

        filter.group_name = Some(chosen_name.clone());
        match db.find_group(&filter) {
            Ok(group) => return Ok(group),
            Err(_) => {
                let _ = writeln!(
                    output,
                    "\n  Failed to find a group whose name is \"{chosen_name}\"\n"
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cvd_db::{Instance, InstanceGroup};

    fn groups() -> Vec<InstanceGroup> {
        vec![
            InstanceGroup {
                name: "cvd_1".into(),
                home_directory: "/home/u/1".into(),
                host_artifacts_path: String::new(),
                product_out_paths: vec![],
                start_time: "t0".into(),
                instances: vec![Instance::new(1, "phone")],
            },
            InstanceGroup {
                name: "cvd_2".into(),
                home_directory: "/home/u/2".into(),
                host_artifacts_path: String::new(),
                product_out_paths: vec![],
                start_time: "t1".into(),
                instances: vec![Instance::new(2, "tablet")],
            },
        ]
    }

    #[test]
    fn menu_lists_groups_and_instances_by_index_and_letter() {
        let menu = render_menu(&groups());
        assert!(menu.contains("[0] : cvd_1"));
        assert!(menu.contains("[1] : cvd_2"));
        assert!(menu.contains("<a> cvd_1-phone (id : 1)"));
    }

    #[test]
    fn prompt_selects_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        for g in groups() {
            db.add_instance_group(g).unwrap();
        }
        let mut input = std::io::Cursor::new(b"1\n".to_vec());
        let mut output = Vec::new();
        let chosen = prompt_user_for_group(&db, Filter::default(), &mut input, &mut output).unwrap();
        assert_eq!(chosen.name, "cvd_2");
    }

    #[test]
    fn prompt_retries_on_out_of_range_then_accepts_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = InstanceDatabase::new(dir.path().join("db.json"));
        for g in groups() {
            db.add_instance_group(g).unwrap();
        }
        let mut input = std::io::Cursor::new(b"99\ncvd_1\n".to_vec());
        let mut output = Vec::new();
        let chosen = prompt_user_for_group(&db, Filter::default(), &mut input, &mut output).unwrap();
        assert_eq!(chosen.name, "cvd_1");
    }
}
