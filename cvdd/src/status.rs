//! Status JSON assembly: invokes the per-instance status binary, applies
//! the `webrtc_device_id` back-compat shim spec.md §9 calls out, and
//! assembles group/fleet-level arrays in instance order.
//!
//! Grounded on `status_fetcher.cpp`'s `FetchOneInstanceStatus` for the
//! per-instance subprocess invocation and the exact shim logic.

use std::process::Command;

use cvd_db::{Instance, InstanceGroup};

const STATUS_BIN: &str = "cvd_internal_status";
const CUTTLEFISH_INSTANCE_ENV: &str = "CUTTLEFISH_INSTANCE";
const HOME_ENV: &str = "HOME";
const CUTTLEFISH_CONFIG_ENV: &str = "CUTTLEFISH_CONFIG_FILE";

/// Runs the status binary for one instance and returns its JSON object,
/// with `instance_name` forced to `instance.name` and `webrtc_device_id`
/// injected from the (pre-overwrite) `instance_name` if the binary didn't
/// report one itself. Never fails outright: an unparseable or empty
/// response becomes a `{"warning": ...}` object, matching the original's
/// handling of old binaries that print nothing.
pub fn fetch_instance_status(
    group: &InstanceGroup,
    instance: &Instance,
    config_file_path: &str,
) -> serde_json::Value {
    let bin_path = format!("{}/bin/{STATUS_BIN}", group.host_artifacts_path);
    let output = Command::new(&bin_path)
        .env(HOME_ENV, &group.home_directory)
        .env(CUTTLEFISH_INSTANCE_ENV, instance.id.to_string())
        .env(CUTTLEFISH_CONFIG_ENV, config_file_path)
        .output();

    let mut value = match output {
        Ok(out) if out.status.success() && !out.stdout.is_empty() => {
            match serde_json::from_slice::<serde_json::Value>(&out.stdout) {
                Ok(serde_json::Value::Array(mut items)) if !items.is_empty() => items.remove(0),
                Ok(other) => other,
                Err(_) => warning_value(),
            }
        }
        _ => warning_value(),
    };

    apply_webrtc_shim(&mut value, &instance.name);
    value
}

fn warning_value() -> serde_json::Value {
    serde_json::json!({"warning": "cvd-status-unsupported device"})
}

/// Injects `webrtc_device_id = instance_name` when the status object
/// reports an `instance_name` but no `webrtc_device_id` of its own (a
/// historical bug in some status binaries, per spec.md §9), then
/// overwrites `instance_name` with the caller-supplied name. Order
/// matters: the shim must read the *original* `instance_name` before it's
/// replaced.
fn apply_webrtc_shim(value: &mut serde_json::Value, per_instance_name: &str) {
    if let serde_json::Value::Object(map) = value {
        if !map.contains_key("webrtc_device_id") {
            if let Some(name) = map.get("instance_name").cloned() {
                map.insert("webrtc_device_id".to_string(), name);
            }
        }
        map.insert(
            "instance_name".to_string(),
            serde_json::Value::String(per_instance_name.to_string()),
        );
    }
}

/// One JSON array element per instance, in the group's stored order,
/// matching spec.md §6's "group-status arrays preserve the group's
/// instance order".
pub fn group_status_array(group: &InstanceGroup, config_file_path: &str) -> serde_json::Value {
    let items: Vec<serde_json::Value> = group
        .instances
        .iter()
        .map(|instance| fetch_instance_status(group, instance, config_file_path))
        .collect();
    serde_json::Value::Array(items)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shim_injects_webrtc_device_id_when_absent() {
        let mut value = serde_json::json!({"instance_name": "old-name"});
        apply_webrtc_shim(&mut value, "phone");
        assert_eq!(value["webrtc_device_id"], "old-name");
        assert_eq!(value["instance_name"], "phone");
    }

    #[test]
    fn shim_leaves_existing_webrtc_device_id_alone() {
        let mut value = serde_json::json!({"instance_name": "old-name", "webrtc_device_id": "keep-me"});
        apply_webrtc_shim(&mut value, "phone");
        assert_eq!(value["webrtc_device_id"], "keep-me");
        assert_eq!(value["instance_name"], "phone");
    }

    #[test]
    fn shim_is_a_noop_on_non_object_values() {
        let mut value = serde_json::json!("not an object");
        apply_webrtc_shim(&mut value, "phone");
        assert_eq!(value, serde_json::json!("not an object"));
    }
}
