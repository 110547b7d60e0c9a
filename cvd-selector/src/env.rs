//! Environment-derived selector inputs.

use std::collections::HashMap;
use std::ffi::CStr;

use cvd_error::{Action, Error, ErrorSource, Resource, Result};

/// A snapshot of the environment variables relevant to selection, decoupled
/// from `std::env` so callers (and tests) can hand in an arbitrary map
/// instead of the process's real environment.
pub type Envs = HashMap<String, String>;

pub const HOME_ENV: &str = "HOME";
pub const CUTTLEFISH_INSTANCE_ENV: &str = "CUTTLEFISH_INSTANCE";

/// `$HOME` as seen in the request's environment, but only when it differs
/// from the real invoking user's home directory in the passwd database.
/// When the caller didn't override `HOME` (the common case), this returns
/// `None` so the filter stays empty and default-group selection kicks in,
/// rather than spuriously narrowing every request to the one group that
/// happens to live under the system-wide home.
pub fn overridden_home_directory(env: &Envs) -> Option<String> {
    overridden_home_directory_against(env, system_wide_home().ok().as_deref())
}

fn overridden_home_directory_against(env: &Envs, system_home: Option<&str>) -> Option<String> {
    let home = env.get(HOME_ENV)?;
    match system_home {
        Some(sys) if sys == home => None,
        _ => Some(home.clone()),
    }
}

/// The home directory of the real invoking user from the passwd database,
/// ignoring any `$HOME` override. Used to break ties among several groups
/// when no other selector narrows the choice.
pub fn system_wide_home() -> Result<String> {
    unsafe {
        let uid = libc::getuid();
        let mut buf = vec![0u8; 16384];
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let ret = libc::getpwuid_r(
            uid,
            &mut pwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        );
        if ret != 0 || result.is_null() {
            return Err(Error::new(
                ErrorSource::NotFound("no passwd entry for current user".into()),
                Action::Loading,
                Resource::Selection,
            ));
        }
        let home = CStr::from_ptr(pwd.pw_dir).to_string_lossy().into_owned();
        Ok(home)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_home_env_is_no_override() {
        let env = Envs::new();
        assert_eq!(overridden_home_directory_against(&env, Some("/home/real")), None);
    }

    #[test]
    fn home_matching_system_home_is_no_override() {
        let mut env = Envs::new();
        env.insert(HOME_ENV.to_string(), "/home/real".to_string());
        assert_eq!(overridden_home_directory_against(&env, Some("/home/real")), None);
    }

    #[test]
    fn home_differing_from_system_home_is_an_override() {
        let mut env = Envs::new();
        env.insert(HOME_ENV.to_string(), "/home/other".to_string());
        assert_eq!(
            overridden_home_directory_against(&env, Some("/home/real")),
            Some("/home/other".to_string())
        );
    }
}
