//! Turns CLI selector flags, the environment, and (when connected to a
//! terminal) an interactive prompt into exactly one group or
//! (instance, group) pair.
//!
//! Grounded on the original `cli/selector/selector.cpp`.

mod build_filter;
mod env;
mod menu;
mod options;
mod select;

pub use build_filter::build_filter_from_selectors;
pub use env::{overridden_home_directory, system_wide_home, Envs, CUTTLEFISH_INSTANCE_ENV, HOME_ENV};
pub use menu::{prompt_user_for_group, render_menu};
pub use options::SelectorOptions;
pub use select::{select_group, select_instance, stdin_is_tty};
