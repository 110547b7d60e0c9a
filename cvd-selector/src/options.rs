//! The caller-supplied half of a selection query, before the environment is
//! folded in.

/// Selector flags a `cvdd` subcommand accepts (`--group_name`,
/// `--instance_name`, repeated).
#[derive(Debug, Clone, Default)]
pub struct SelectorOptions {
    pub group_name: Option<String>,
    pub instance_names: Option<Vec<String>>,
}
