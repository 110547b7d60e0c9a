//! Binary entry point: builds the `clap` command tree, dispatches by
//! subcommand, and reports the resulting [`Response`] to the user.
//!
//! Grounded on `arti::main`/`arti::main_main`'s split between a fallible
//! inner function and a thin `main` that turns its `Err` into a process
//! exit: the `clap::Error` downcast-and-exit path in particular, so
//! `--help`/`--version` and usage errors keep clap's own formatting and
//! exit codes instead of being wrapped in this binary's own error report.

mod cli;
mod handlers;
mod layout;
mod logging;
mod request;
mod status;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;

use cvd_db::InstanceDatabase;
use cvd_instance_manager::InstanceManager;
use cvd_lock::LockManager;
use cvd_selector::SelectorOptions;

use layout::{db_path, lock_dir, state_root, MAX_INSTANCE_ID};
use request::{Request, Response, Status};

fn main() {
    match main_main() {
        Ok(status) => std::process::exit(if status == Status::Ok { 0 } else { 1 }),
        Err(e) => match e.downcast_ref::<clap::Error>() {
            Some(clap_err) => clap_err.clone().exit(),
            None => {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        },
    }
}

/// Inner function to allow convenient error handling, matching `arti`'s
/// `main`/`main_main` split.
fn main_main() -> Result<Status> {
    let matches = cli::build_cli().try_get_matches()?;
    logging::init(matches.get_one::<String>("log_level").map(|s| s.as_str()));

    let env: HashMap<String, String> = std::env::vars().collect();
    let home_env = env
        .get("HOME")
        .cloned()
        .context("HOME is not set in the environment")?;
    let root = state_root(&home_env);

    let lock_manager = LockManager::new(lock_dir(&root), MAX_INSTANCE_ID)
        .context("initializing the instance lock directory")?;
    let db = InstanceDatabase::new(db_path(&root));
    let manager = InstanceManager::new(&lock_manager, &db);

    let selector_options = selector_options_from(&matches);
    let (command, sub_matches) = matches
        .subcommand()
        .context("a subcommand is required")?;

    let request = Request {
        command: command.to_string(),
        args: Vec::new(),
        env,
        working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        selector_options,
    };

    let response = match command {
        "status" => handlers::handle_status(&manager, &request),
        "fleet" => handlers::handle_fleet(&manager),
        "stop" => handlers::handle_stop(&manager, &request),
        "remove" => handlers::handle_remove(&manager, &request, &root),
        "clear" => handlers::handle_clear(&manager, &root),
        "reset" => handle_reset(&manager, &lock_manager, sub_matches)?,
        "create" => handle_create(&manager, &request, sub_matches),
        other => anyhow::bail!("unrecognized subcommand: {other}"),
    };

    report(response)
}

fn handle_create(
    manager: &InstanceManager,
    request: &Request,
    sub_matches: &ArgMatches,
) -> Response {
    let home = sub_matches
        .get_one::<String>("home")
        .map(|s| s.as_str())
        .unwrap_or_default();
    let host_artifacts_path = sub_matches
        .get_one::<String>("host_artifacts_path")
        .map(|s| s.as_str());
    let instance_specs: Vec<String> = sub_matches
        .get_many::<String>("instance_id")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let group_name = request.selector_options.group_name.as_deref();
    handlers::handle_create(manager, request, group_name, home, host_artifacts_path, &instance_specs)
}

fn handle_reset(
    manager: &InstanceManager,
    lock_manager: &LockManager,
    sub_matches: &ArgMatches,
) -> Result<Response> {
    let instance_id = sub_matches
        .get_one::<String>("instance_id")
        .map(|raw| raw.parse::<u32>().with_context(|| format!("\"{raw}\" is not a valid instance id")))
        .transpose()?;
    Ok(handlers::handle_reset(manager, lock_manager, instance_id))
}

fn selector_options_from(matches: &ArgMatches) -> SelectorOptions {
    SelectorOptions {
        group_name: matches.get_one::<String>("group_name").cloned(),
        instance_names: matches
            .get_many::<String>("instance_name")
            .map(|values| values.cloned().collect()),
    }
}

/// Prints a response's message or JSON to stdout/stderr and folds its
/// status into this process's exit code. No partial JSON ever reaches
/// stdout on error, matching spec.md §7.
fn report(response: Response) -> Result<Status> {
    match response.status {
        Status::Ok => {
            if let Some(json) = &response.json {
                println!("{json}");
            }
            if let Some(message) = &response.message {
                eprintln!("{message}");
            }
        }
        Status::Internal => {
            if let Some(message) = &response.message {
                eprintln!("Error: {message}");
            }
        }
    }
    Ok(response.status)
}
