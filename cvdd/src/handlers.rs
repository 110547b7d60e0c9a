//! Subcommand handlers: each resolves a selector, reads or mutates the
//! database, and — for lifecycle commands — drives `cvd-instance-manager`.
//! Mirrors the dispatch-by-command / ask-selector / touch-database shape
//! spec.md §2 describes for a typical request.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use cvd_db::{Filter, InstanceGroup};
use cvd_error::{Action, Error, ErrorSource, Resource};
use cvd_instance_manager::{
    force_stop_all, force_stop_group_containing, GroupDirectories, InstanceGroupParams,
    InstanceManager, InstanceParams,
};
use cvd_selector::{select_group, select_instance, stdin_is_tty};

use crate::layout::CONFIG_FILE_NAME;
use crate::request::{Request, Response};
use crate::status;

fn config_file_path(home_directory: &str) -> String {
    Path::new(home_directory)
        .join(CONFIG_FILE_NAME)
        .display()
        .to_string()
}

pub fn handle_status(manager: &InstanceManager, req: &Request) -> Response {
    match do_status(manager, req) {
        Ok(resp) => resp,
        Err(e) => e.into(),
    }
}

fn do_status(manager: &InstanceManager, req: &Request) -> cvd_error::Result<Response> {
    if !manager.has_instance_groups()? {
        return Ok(Response::internal("no instance groups available"));
    }
    if req.selector_options.instance_names.as_ref().map(|v| v.len()).unwrap_or(0) > 1 {
        return do_group_status(manager, req);
    }
    if req
        .selector_options
        .instance_names
        .as_ref()
        .map(|v| !v.is_empty())
        .unwrap_or(false)
    {
        let (instance, group) = select_instance(manager.db(), &req.selector_options, &req.env)?;
        let config_path = config_file_path(&group.home_directory);
        let json = status::fetch_instance_status(&group, &instance, &config_path);
        return Ok(Response::ok_with_json(serde_json::Value::Array(vec![json])));
    }
    do_group_status(manager, req)
}

fn do_group_status(manager: &InstanceManager, req: &Request) -> cvd_error::Result<Response> {
    let mut stdin = BufReader::new(std::io::stdin());
    let mut stdout = BufWriter::new(std::io::stdout());
    let group = select_group(
        manager.db(),
        &req.selector_options,
        &req.env,
        stdin_is_tty(),
        &mut stdin,
        &mut stdout,
    )?;
    let config_path = config_file_path(&group.home_directory);
    let json = status::group_status_array(&group, &config_path);
    Ok(Response::ok_with_json(json))
}

pub fn handle_fleet(manager: &InstanceManager) -> Response {
    match do_fleet(manager) {
        Ok(resp) => resp,
        Err(e) => e.into(),
    }
}

fn do_fleet(manager: &InstanceManager) -> cvd_error::Result<Response> {
    let groups = manager.find_groups(&Filter::default())?;
    let mut out = Vec::with_capacity(groups.len());
    for group in &groups {
        let config_path = config_file_path(&group.home_directory);
        out.push(status::group_status_array(group, &config_path));
    }
    Ok(Response::ok_with_json(serde_json::json!({ "groups": out })))
}

pub fn handle_stop(manager: &InstanceManager, req: &Request) -> Response {
    match do_stop(manager, req) {
        Ok(resp) => resp,
        Err(e) => e.into(),
    }
}

fn do_stop(manager: &InstanceManager, req: &Request) -> cvd_error::Result<Response> {
    let mut stdin = BufReader::new(std::io::stdin());
    let mut stdout = BufWriter::new(std::io::stdout());
    let group = select_group(
        manager.db(),
        &req.selector_options,
        &req.env,
        stdin_is_tty(),
        &mut stdin,
        &mut stdout,
    )?;
    let config_path = config_file_path(&group.home_directory);
    manager.issue_stop_command(&config_path, group)?;
    Ok(Response::ok())
}

pub fn handle_remove(manager: &InstanceManager, req: &Request, per_user_root: &Path) -> Response {
    match do_remove(manager, req, per_user_root) {
        Ok(resp) => resp,
        Err(e) => e.into(),
    }
}

fn do_remove(
    manager: &InstanceManager,
    req: &Request,
    per_user_root: &Path,
) -> cvd_error::Result<Response> {
    let mut stdin = BufReader::new(std::io::stdin());
    let mut stdout = BufWriter::new(std::io::stdout());
    let group = select_group(
        manager.db(),
        &req.selector_options,
        &req.env,
        stdin_is_tty(),
        &mut stdin,
        &mut stdout,
    )?;
    let name = group.name.clone();
    manager.remove_instance_group(group, per_user_root)?;
    Ok(Response::ok_with_message(format!("removed group {name}")))
}

pub fn handle_clear(manager: &InstanceManager, per_user_root: &Path) -> Response {
    match manager.cvd_clear(per_user_root, CONFIG_FILE_NAME) {
        Ok(()) => Response::ok_with_message("stopped all known instances"),
        Err(e) => e.into(),
    }
}

/// `instance_id` narrows the kill to the one group of `run_cvd` processes
/// that contains it (`ForcefullyStopGroup(any_id_in_group)`); omitted, every
/// `run_cvd` process this user owns is killed (`KillAllCuttlefishInstances`).
pub fn handle_reset(
    manager: &InstanceManager,
    lock_manager: &cvd_lock::LockManager,
    instance_id: Option<u32>,
) -> Response {
    let _ = manager;
    match instance_id {
        Some(id) => match force_stop_group_containing(id, lock_manager) {
            Ok(()) => Response::ok_with_message(format!(
                "sent SIGKILL to the run_cvd group containing instance {id}"
            )),
            Err(e) => e.into(),
        },
        None => match force_stop_all(None, lock_manager) {
            Ok(()) => {
                Response::ok_with_message("sent SIGKILL to every run_cvd process owned by this user")
            }
            Err(e) => e.into(),
        },
    }
}

/// Parses one `--instance_id` value into a request for a single instance:
/// `"auto"` or `"auto:name"` asks for an allocated id, anything else is
/// parsed as an explicit numeric id, optionally followed by `:name`.
fn parse_instance_spec(raw: &str) -> cvd_error::Result<InstanceParams> {
    let (id_part, name_part) = match raw.split_once(':') {
        Some((id, name)) => (id, Some(name.to_string())),
        None => (raw, None),
    };
    let instance_id = if id_part == "auto" {
        None
    } else {
        Some(id_part.parse::<u32>().map_err(|_| {
            Error::new(
                ErrorSource::Validation(format!("\"{id_part}\" is not a valid instance id")),
                Action::Validating,
                Resource::Selection,
            )
        })?)
    };
    Ok(InstanceParams {
        instance_id,
        per_instance_name: name_part,
    })
}

/// Environment variables naming a pre-built host-tools tree to fall back to
/// when a `create` request doesn't supply `--host_artifacts_path`
/// explicitly, in the order spec.md §6 lists them.
const HOST_OUT_ENV_FALLBACKS: [&str; 2] = ["ANDROID_HOST_OUT", "ANDROID_SOONG_HOST_OUT"];

pub fn handle_create(
    manager: &InstanceManager,
    req: &Request,
    group_name: Option<&str>,
    home: &str,
    host_artifacts_path: Option<&str>,
    instance_specs: &[String],
) -> Response {
    match do_create(manager, req, group_name, home, host_artifacts_path, instance_specs) {
        Ok(group) => Response::ok_with_message(format!("created group {}", group.name)),
        Err(e) => e.into(),
    }
}

fn do_create(
    manager: &InstanceManager,
    req: &Request,
    group_name: Option<&str>,
    home: &str,
    host_artifacts_path: Option<&str>,
    instance_specs: &[String],
) -> cvd_error::Result<InstanceGroup> {
    let instances = if instance_specs.is_empty() {
        vec![InstanceParams::default()]
    } else {
        instance_specs
            .iter()
            .map(|s| parse_instance_spec(s))
            .collect::<cvd_error::Result<Vec<_>>>()?
    };
    let n = instances.len();
    let group_params = InstanceGroupParams {
        group_name: group_name.unwrap_or_default().to_string(),
        home_directory: home.to_string(),
        host_artifacts_path: String::new(),
        instances,
    };
    let host_out_target = host_artifacts_path.map(String::from).or_else(|| {
        HOST_OUT_ENV_FALLBACKS
            .iter()
            .find_map(|var| req.env.get(*var).cloned())
    });
    let directories = GroupDirectories {
        home: None,
        host_artifacts_path: host_out_target.map(PathBuf::from),
        product_out_paths: vec![None; n],
    };
    manager.create_instance_group(group_params, directories)
}
