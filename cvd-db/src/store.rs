//! The locked backing-file viewer: the Rust shape of `PersistentData`'s C++
//! `viewer_` member, grounded on `tor-persist`'s `FsStateMgr` for the
//! load/store-under-lock discipline.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use cvd_error::{Action, Error, ErrorSource, Resource, Result};

use crate::model::PersistentData;

/// Wraps one JSON backing file with an advisory OS lock on a sidecar
/// `.lock` file. `fslock` only provides an exclusive lock, not a
/// shared/exclusive distinction, so readers take the same lock writers do;
/// this serializes concurrent readers but never produces a torn read.
pub struct Viewer {
    data_path: PathBuf,
    lock_path: PathBuf,
}

impl Viewer {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        let data_path = data_path.into();
        let mut lock_path = data_path.clone();
        let mut file_name = lock_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        file_name.push(".lock");
        lock_path.set_file_name(file_name);
        Viewer {
            data_path,
            lock_path,
        }
    }

    fn locked<T>(&self, action: Action, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::new(
                    ErrorSource::Io(std::sync::Arc::new(e)),
                    Action::Creating,
                    Resource::Directory {
                        path: parent.display().to_string(),
                    },
                )
            })?;
        }
        let mut lock = fslock::LockFile::open(&self.lock_path).map_err(|e| {
            Error::new(
                ErrorSource::Io(std::sync::Arc::new(e)),
                action,
                Resource::Database,
            )
        })?;
        lock.lock().map_err(|e| {
            Error::new(
                ErrorSource::Io(std::sync::Arc::new(e)),
                action,
                Resource::Database,
            )
        })?;
        let result = f();
        let _ = lock.unlock();
        result
    }

    fn load(&self) -> Result<PersistentData> {
        match fs::read(&self.data_path) {
            Ok(bytes) if bytes.is_empty() => Ok(PersistentData::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::new(
                    ErrorSource::Serde(std::sync::Arc::new(e)),
                    Action::Loading,
                    Resource::Database,
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistentData::default()),
            Err(e) => Err(Error::new(
                ErrorSource::Io(std::sync::Arc::new(e)),
                Action::Loading,
                Resource::Database,
            )),
        }
    }

    fn store(&self, data: &PersistentData) -> Result<()> {
        let json = serde_json::to_vec_pretty(data).map_err(|e| {
            Error::new(
                ErrorSource::Serde(std::sync::Arc::new(e)),
                Action::Storing,
                Resource::Database,
            )
        })?;
        write_atomic(&self.data_path, &json)
    }

    /// Read-only access under the lock. Never writes the file back, even if
    /// the closure mutates its argument (it only borrows immutably).
    pub fn with_shared_lock<T>(
        &self,
        f: impl FnOnce(&PersistentData) -> Result<T>,
    ) -> Result<T> {
        self.locked(Action::Loading, || {
            let data = self.load()?;
            f(&data)
        })
    }

    /// Read-modify-write access under the lock. The closure's result is
    /// stored back only if it returns `Ok`.
    pub fn with_exclusive_lock<T>(
        &self,
        f: impl FnOnce(&mut PersistentData) -> Result<T>,
    ) -> Result<T> {
        self.locked(Action::Storing, || {
            let mut data = self.load()?;
            let result = f(&mut data)?;
            self.store(&data)?;
            Ok(result)
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        Error::new(
            ErrorSource::Io(std::sync::Arc::new(e)),
            Action::Storing,
            Resource::Database,
        )
    })?;
    tmp.write_all(bytes).map_err(|e| {
        Error::new(
            ErrorSource::Io(std::sync::Arc::new(e)),
            Action::Storing,
            Resource::Database,
        )
    })?;
    tmp.persist(path).map_err(|e| {
        Error::new(
            ErrorSource::Io(std::sync::Arc::new(e.error)),
            Action::Storing,
            Resource::Database,
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::InstanceGroup;

    #[test]
    fn round_trips_through_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = Viewer::new(dir.path().join("db.json"));
        viewer
            .with_exclusive_lock(|data| {
                data.instance_groups.push(InstanceGroup {
                    name: "cvd_1".into(),
                    home_directory: "/home/u".into(),
                    host_artifacts_path: String::new(),
                    product_out_paths: vec![],
                    start_time: String::new(),
                    instances: vec![],
                });
                Ok(())
            })
            .unwrap();
        let names = viewer
            .with_shared_lock(|data| {
                Ok(data
                    .instance_groups
                    .iter()
                    .map(|g| g.name.clone())
                    .collect::<Vec<_>>())
            })
            .unwrap();
        assert_eq!(names, vec!["cvd_1".to_string()]);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = Viewer::new(dir.path().join("missing.json"));
        let empty = viewer.with_shared_lock(|data| Ok(data.instance_groups.len())).unwrap();
        assert_eq!(empty, 0);
    }

    #[test]
    fn failed_closure_does_not_write_back() {
        let dir = tempfile::tempdir().unwrap();
        let viewer = Viewer::new(dir.path().join("db.json"));
        let _ = viewer.with_exclusive_lock(|data| {
            data.acloud_translator_optout = true;
            Err(Error::new(
                ErrorSource::Internal("boom".into()),
                Action::Storing,
                Resource::Database,
            ))
        });
        let optout = viewer
            .with_shared_lock(|data| Ok(data.acloud_translator_optout))
            .unwrap();
        assert!(!optout);
    }
}
