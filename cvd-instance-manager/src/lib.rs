//! Orchestrates the lifecycle operations built on top of [`cvd_lock`] and
//! [`cvd_db`]: creating, stopping and removing instance groups, plus the
//! best-effort forced-reclamation path that runs outside the database.
//!
//! Grounded on the original `instance_manager.cpp` (group lifecycle) and
//! `reset_client_utils.cpp` (forced reclamation).

mod dirs;
mod force_stop;
mod host_tool_target;
mod manager;
mod params;
mod subprocess;

pub use dirs::GroupDirectories;
pub use force_stop::{force_stop_all, force_stop_group_containing};
pub use host_tool_target::stop_bin_name;
pub use manager::InstanceManager;
pub use params::{InstanceGroupParams, InstanceParams};
