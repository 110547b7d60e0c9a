//! Builder-API `clap` command tree, matching the non-derive style
//! `arti::main_main` uses for its own top-level `App`/`Command` (workspace
//! `clap` carries the `cargo` feature rather than `derive` for the same
//! reason: one hand-built command tree rather than one struct-derive per
//! subcommand).

use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("cvdd")
        .about("Local control-plane daemon for cvdctl-managed virtual device instances")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("error, warn, info, debug, or trace"),
        )
        .arg(
            Arg::new("group_name")
                .long("group_name")
                .value_name("NAME")
                .global(true)
                .help("selects the instance group with this name"),
        )
        .arg(
            Arg::new("instance_name")
                .long("instance_name")
                .value_name("NAME")
                .action(ArgAction::Append)
                .global(true)
                .help("selects the instance(s) with this name; may be repeated"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("status")
                .about("query status of a single instance group or instance"),
        )
        .subcommand(
            Command::new("fleet").about("query status of every known instance group"),
        )
        .subcommand(Command::new("stop").about("stop the selected instance group"))
        .subcommand(
            Command::new("create")
                .about("create a new instance group")
                .arg(
                    Arg::new("home")
                        .long("home")
                        .value_name("PATH")
                        .required(true)
                        .help("home directory for the new group"),
                )
                .arg(
                    Arg::new("host_artifacts_path")
                        .long("host_artifacts_path")
                        .value_name("PATH")
                        .help("directory containing start_cvd/stop_cvd; symlinked into place"),
                )
                .arg(
                    Arg::new("instance_id")
                        .long("instance_id")
                        .value_name("ID")
                        .action(ArgAction::Append)
                        .help(
                            "explicit id for the Nth instance (pair with --instance_name by \
                             position); omit an instance's id to auto-allocate one",
                        ),
                ),
        )
        .subcommand(Command::new("remove").about("remove the selected instance group"))
        .subcommand(
            Command::new("clear").about("unconditionally stop and remove every instance group"),
        )
        .subcommand(
            Command::new("reset")
                .about("forcefully kill stray run_cvd processes outside the database")
                .arg(
                    Arg::new("instance_id")
                        .long("instance_id")
                        .value_name("ID")
                        .help(
                            "only kill the group of run_cvd processes containing this instance \
                             id; omit to kill every run_cvd process this user owns",
                        ),
                ),
        )
}
