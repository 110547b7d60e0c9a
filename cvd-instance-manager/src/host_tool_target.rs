//! The platform-specific stop binary name, consulted by
//! [`crate::InstanceManager::stop_bin`]. Grounded on `instance_manager.cpp`'s
//! call to `HostToolTarget(...).GetStopBinName()`; the host-tool-target
//! resolution logic itself did not survive distillation, so this reproduces
//! only its externally visible contract: given a host artifacts tree,
//! name the binary that stops a group's instances.

use std::path::Path;

/// The conventional stop binary shipped in every `host_artifacts_path/bin`
/// tree this core has encountered.
const STOP_CVD: &str = "stop_cvd";

/// Returns the stop binary name for the given host artifacts tree. Always
/// `stop_cvd` today; takes the path so a future host-tool-target resolver
/// that picks between binary flavors by inspecting the tree has somewhere
/// to hook in without changing every call site.
pub fn stop_bin_name(_host_artifacts_path: &Path) -> &'static str {
    STOP_CVD
}
