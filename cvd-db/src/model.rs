//! The persisted shape of the instance database.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single virtual device instance, as last reported by
/// the instance manager. Purely advisory here: the database doesn't enforce
/// transitions between these, it just remembers the last one it was told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Unknown,
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl Default for InstanceState {
    fn default() -> Self {
        InstanceState::Unknown
    }
}

/// A single virtual device instance within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub state: InstanceState,
}

impl Instance {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Instance {
            id,
            name: name.into(),
            state: InstanceState::Created,
        }
    }
}

/// A group of instances sharing one `HOME` directory and one set of build
/// artifacts. Mirrors `LocalInstanceGroup`'s persisted fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    pub home_directory: String,
    #[serde(default)]
    pub host_artifacts_path: String,
    #[serde(default)]
    pub product_out_paths: Vec<String>,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl InstanceGroup {
    /// True if any instance is in a non-terminal lifecycle state: one
    /// where it's actively starting, running, or in the middle of
    /// stopping. `Created` (never started) and `Stopped`/`Unknown` are
    /// terminal with respect to this check; they don't block removal.
    pub fn has_active_instances(&self) -> bool {
        self.instances.iter().any(|i| {
            matches!(
                i.state,
                InstanceState::Starting | InstanceState::Running | InstanceState::Stopping
            )
        })
    }
}

/// The entire on-disk state: every known group, plus a small set of global
/// flags unrelated to any particular group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentData {
    #[serde(default, rename = "Groups")]
    pub instance_groups: Vec<InstanceGroup>,

    #[serde(default)]
    pub acloud_translator_optout: bool,
}
