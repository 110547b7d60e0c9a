//! Matching instance groups and instances against a query.

use std::collections::BTreeSet;

use crate::model::{Instance, InstanceGroup};

/// A query over the database. Every field left `None`/empty is ignored;
/// an all-`None` filter matches everything (see [`Filter::is_empty`]).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub home: Option<String>,
    pub group_name: Option<String>,
    pub instance_id: Option<u32>,
    pub instance_names: BTreeSet<String>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.home.is_none()
            && self.group_name.is_none()
            && self.instance_id.is_none()
            && self.instance_names.is_empty()
    }
}

/// Whether the instance fields of `filter` match `instance`. Does not check
/// the group the instance belongs to; callers are expected to have already
/// checked that with [`group_matches`].
pub fn instance_matches(instance: &Instance, filter: &Filter) -> bool {
    (filter.instance_id.is_none() || filter.instance_id == Some(instance.id))
        && (filter.instance_names.is_empty() || filter.instance_names.contains(&instance.name))
}

/// Whether `filter` matches `group`, including whether the group contains
/// instances matching the instance-related fields.
pub fn group_matches(group: &InstanceGroup, filter: &Filter) -> bool {
    if let Some(home) = &filter.home {
        if home != &group.home_directory {
            return false;
        }
    }
    if let Some(name) = &filter.group_name {
        if name != &group.name {
            return false;
        }
    }
    if let Some(id) = filter.instance_id {
        if !group.instances.iter().any(|i| i.id == id) {
            return false;
        }
    }
    for wanted in &filter.instance_names {
        if !group.instances.iter().any(|i| &i.name == wanted) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Instance;

    fn group() -> InstanceGroup {
        InstanceGroup {
            name: "cvd_1".into(),
            home_directory: "/home/u/cvd_1".into(),
            host_artifacts_path: String::new(),
            product_out_paths: vec![],
            start_time: String::new(),
            instances: vec![Instance::new(1, "phone"), Instance::new(2, "tablet")],
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = Filter::default();
        assert!(f.is_empty());
        assert!(group_matches(&group(), &f));
    }

    #[test]
    fn group_name_mismatch_excludes() {
        let mut f = Filter::default();
        f.group_name = Some("other".into());
        assert!(!group_matches(&group(), &f));
    }

    #[test]
    fn requires_all_named_instances_present() {
        let mut f = Filter::default();
        f.instance_names.insert("phone".into());
        f.instance_names.insert("watch".into());
        assert!(!group_matches(&group(), &f));
    }

    #[test]
    fn instance_id_filters_individual_instance() {
        let g = group();
        let mut f = Filter::default();
        f.instance_id = Some(2);
        assert!(!instance_matches(&g.instances[0], &f));
        assert!(instance_matches(&g.instances[1], &f));
    }
}
