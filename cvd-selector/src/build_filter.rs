//! Folds [`SelectorOptions`] and the environment into a [`cvd_db::Filter`].

use std::collections::HashSet;

use cvd_db::{is_valid_group_name, is_valid_instance_name, Filter};
use cvd_error::{Action, Error, ErrorSource, Resource, Result};

use crate::env::{overridden_home_directory, Envs, CUTTLEFISH_INSTANCE_ENV};
use crate::options::SelectorOptions;

/// Builds a filter from explicit selector flags layered over environment
/// variables. `CUTTLEFISH_INSTANCE`, when present, narrows to that instance
/// id the same way an explicit `--instance_name` would narrow to a name.
pub fn build_filter_from_selectors(selectors: &SelectorOptions, env: &Envs) -> Result<Filter> {
    if let Some(name) = &selectors.group_name {
        if !is_valid_group_name(name) {
            return Err(Error::new(
                ErrorSource::Validation(format!("group name \"{name}\" is ill-formed")),
                Action::Validating,
                Resource::Selection,
            ));
        }
    }
    let mut filter = Filter {
        home: overridden_home_directory(env),
        group_name: selectors.group_name.clone(),
        ..Default::default()
    };
    if let Some(names) = &selectors.instance_names {
        let mut seen = HashSet::with_capacity(names.len());
        for name in names {
            if !is_valid_instance_name(name) {
                return Err(Error::new(
                    ErrorSource::Validation(format!("instance name \"{name}\" is ill-formed")),
                    Action::Validating,
                    Resource::Selection,
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::new(
                    ErrorSource::Validation(format!(
                        "instance name \"{name}\" was given more than once"
                    )),
                    Action::Validating,
                    Resource::Selection,
                ));
            }
            filter.instance_names.insert(name.clone());
        }
    }
    if let Some(raw) = env.get(CUTTLEFISH_INSTANCE_ENV) {
        let id: u32 = raw.parse().map_err(|_| {
            Error::new(
                ErrorSource::Validation(format!(
                    "{CUTTLEFISH_INSTANCE_ENV}=\"{raw}\" is not a valid instance id"
                )),
                Action::Validating,
                Resource::Selection,
            )
        })?;
        filter.instance_id = Some(id);
    }
    Ok(filter)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cuttlefish_instance_env_narrows_to_id() {
        let mut env = Envs::new();
        env.insert(CUTTLEFISH_INSTANCE_ENV.to_string(), "3".to_string());
        let filter = build_filter_from_selectors(&SelectorOptions::default(), &env).unwrap();
        assert_eq!(filter.instance_id, Some(3));
    }

    #[test]
    fn invalid_cuttlefish_instance_env_is_an_error() {
        let mut env = Envs::new();
        env.insert(CUTTLEFISH_INSTANCE_ENV.to_string(), "not-a-number".to_string());
        assert!(build_filter_from_selectors(&SelectorOptions::default(), &env).is_err());
    }

    #[test]
    fn home_env_overrides_filter_home() {
        let mut env = Envs::new();
        env.insert("HOME".to_string(), "/home/other".to_string());
        let filter = build_filter_from_selectors(&SelectorOptions::default(), &env).unwrap();
        assert_eq!(filter.home.as_deref(), Some("/home/other"));
    }

    #[test]
    fn repeated_instance_name_is_rejected() {
        let selectors = SelectorOptions {
            group_name: None,
            instance_names: Some(vec!["phone".to_string(), "phone".to_string()]),
        };
        assert!(build_filter_from_selectors(&selectors, &Envs::new()).is_err());
    }

    #[test]
    fn distinct_instance_names_are_accepted() {
        let selectors = SelectorOptions {
            group_name: None,
            instance_names: Some(vec!["phone".to_string(), "tablet".to_string()]),
        };
        let filter = build_filter_from_selectors(&selectors, &Envs::new()).unwrap();
        assert_eq!(filter.instance_names.len(), 2);
    }

    #[test]
    fn ill_formed_group_name_is_rejected() {
        let selectors = SelectorOptions {
            group_name: Some("1bad-name".to_string()),
            instance_names: None,
        };
        assert!(build_filter_from_selectors(&selectors, &Envs::new()).is_err());
    }

    #[test]
    fn ill_formed_instance_name_is_rejected() {
        let selectors = SelectorOptions {
            group_name: None,
            instance_names: Some(vec!["-bad".to_string()]),
        };
        assert!(build_filter_from_selectors(&selectors, &Envs::new()).is_err());
    }
}
