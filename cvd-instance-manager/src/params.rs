//! Caller-supplied inputs to [`crate::InstanceManager::create_instance_group`].

/// One requested instance: an explicit id pins it to that lock; `None`
/// asks [`crate::InstanceManager`] to allocate the lowest free one.
#[derive(Debug, Clone, Default)]
pub struct InstanceParams {
    pub instance_id: Option<u32>,
    pub per_instance_name: Option<String>,
}

/// The group-level half of a create request: everything except which
/// directories to materialize (see [`crate::GroupDirectories`] for that).
#[derive(Debug, Clone, Default)]
pub struct InstanceGroupParams {
    /// Empty asks the database to synthesize a name on insert.
    pub group_name: String,
    pub home_directory: String,
    pub host_artifacts_path: String,
    pub instances: Vec<InstanceParams>,
}
