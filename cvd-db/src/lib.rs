//! The persisted instance database: groups of virtual device instances,
//! keyed by group name and home directory, with a small set of global
//! flags alongside them.
//!
//! Grounded on `tor-persist` for the locked-file access pattern and on the
//! original `instance_database.cpp` for exact CRUD semantics.

mod db;
mod filter;
mod model;
mod store;
mod validate;

pub use db::InstanceDatabase;
pub use filter::Filter;
pub use model::{Instance, InstanceGroup, InstanceState, PersistentData};
pub use validate::{is_valid_group_name, is_valid_instance_name};
