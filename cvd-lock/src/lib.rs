//! Per-instance advisory locking.
//!
//! Each instance id in the dense `1..=max_id` namespace gets a lock file
//! named `{id}.lock` under a configured directory. Holding the OS lock on
//! that file is necessary but not sufficient to know an id is free for
//! reuse: the file also carries a one-byte "in use" flag, written while the
//! OS lock is held, so a lock that's merely unheld right now (crash, or a
//! caller that released without marking anything) isn't mistaken for one
//! that was never claimed.
//!
//! Grounded on `fslock-guard`'s guard type for the Rust shape, and on the
//! call sites in the original instance manager (`AcquireLock`,
//! `AcquireUnusedLock`, `RemoveLockFile`) for the operation surface.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use cvd_error::{Action, Error, ErrorSource, Resource, Result};

/// Whether an instance id is currently claimed by a running instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InUseState {
    InUse,
    NotInUse,
}

impl InUseState {
    fn to_byte(self) -> u8 {
        match self {
            InUseState::InUse => b'1',
            InUseState::NotInUse => b'0',
        }
    }

    fn from_byte(b: u8) -> InUseState {
        match b {
            b'1' => InUseState::InUse,
            _ => InUseState::NotInUse,
        }
    }
}

/// Owns the directory instance lock files live in, and the size of the id
/// namespace to scan when a caller wants any unused id.
pub struct LockManager {
    dir: PathBuf,
    max_id: u32,
}

impl LockManager {
    /// `max_id` bounds the dense `1..=max_id` id namespace `acquire_unused_lock`
    /// scans. The directory is created if missing.
    pub fn new(dir: impl Into<PathBuf>, max_id: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::new(
                ErrorSource::Io(std::sync::Arc::new(e)),
                Action::Creating,
                Resource::Directory {
                    path: dir.display().to_string(),
                },
            )
        })?;
        Ok(LockManager { dir, max_id })
    }

    fn path_for(&self, id: u32) -> PathBuf {
        self.dir.join(format!("{id}.lock"))
    }

    /// Lock a specific id. Fails with `LocalResourceAlreadyInUse` if another
    /// process already holds it, regardless of the persisted in-use byte:
    /// an explicit id request is a request for *that* id, not "any free id".
    pub fn acquire_lock(&self, id: u32) -> Result<InstanceLockFile> {
        let path = self.path_for(id);
        let mut file = open_lock_file(&path, id)?;
        let got = file.try_lock().map_err(|e| io_err(e, id))?;
        if !got {
            return Err(Error::new(
                ErrorSource::WouldBlock,
                Action::Locking,
                Resource::LockFile { id },
            ));
        }
        Ok(InstanceLockFile { id, file, path })
    }

    /// Scan ids `1..=max_id` in order and return the first one that is both
    /// lockable and not marked in-use. This ordering (lowest id first) is
    /// load-bearing: callers that request a batch of unused ids rely on it
    /// to hand out a deterministic, reproducible set.
    pub fn acquire_unused_lock(&self) -> Result<InstanceLockFile> {
        for id in 1..=self.max_id {
            let path = self.path_for(id);
            let mut file = open_lock_file(&path, id)?;
            let got = file.try_lock().map_err(|e| io_err(e, id))?;
            if !got {
                continue;
            }
            let state = read_status(&path, id)?;
            if state == InUseState::InUse {
                // Someone holds the id logically even though we could grab
                // the OS lock for an instant (e.g. they released it between
                // operations). Not free; release and keep scanning.
                let _ = file.unlock();
                continue;
            }
            return Ok(InstanceLockFile { id, file, path });
        }
        Err(Error::new(
            ErrorSource::NotFound("no unused instance id available".into()),
            Action::Locking,
            Resource::Selection,
        ))
    }

    /// Best-effort removal of a lock file. Matches the original's
    /// `RemoveLockFile`/`DeleteLockFile`: failures are reported, not
    /// swallowed, but callers in cleanup paths (`CvdClear`, forced
    /// reclamation) are expected to log and continue rather than abort.
    pub fn remove_lock_file(&self, id: u32) -> Result<()> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::new(
                ErrorSource::Io(std::sync::Arc::new(e)),
                Action::Deleting,
                Resource::LockFile { id },
            )),
        }
    }
}

fn open_lock_file(path: &Path, id: u32) -> Result<fslock::LockFile> {
    fslock::LockFile::open(path).map_err(|e| io_err(e, id))
}

fn io_err(e: io::Error, id: u32) -> Error {
    Error::new(
        ErrorSource::Io(std::sync::Arc::new(e)),
        Action::Locking,
        Resource::LockFile { id },
    )
}

fn read_status(path: &Path, id: u32) -> Result<InUseState> {
    match fs::File::open(path) {
        Ok(mut f) => {
            let mut buf = [0u8; 1];
            match f.read(&mut buf) {
                Ok(1) => Ok(InUseState::from_byte(buf[0])),
                _ => Ok(InUseState::NotInUse),
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(InUseState::NotInUse),
        Err(e) => Err(Error::new(
            ErrorSource::Io(std::sync::Arc::new(e)),
            Action::Loading,
            Resource::LockFile { id },
        )),
    }
}

/// A held lock on one instance id. Dropping it releases the OS lock (via
/// `fslock::LockFile`'s own `Drop`) without changing the persisted in-use
/// byte: whether an id stays "in use" after a handle goes away is a
/// decision for the caller to make explicitly via `set_status`, not an
/// accident of scope.
pub struct InstanceLockFile {
    id: u32,
    file: fslock::LockFile,
    path: PathBuf,
}

impl InstanceLockFile {
    /// The instance id this handle locks.
    pub fn instance(&self) -> u32 {
        self.id
    }

    /// Persist the in-use byte while still holding the OS lock.
    pub fn set_status(&mut self, state: InUseState) -> Result<()> {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| io_err(e, self.id))?;
        f.write_all(&[state.to_byte()]).map_err(|e| io_err(e, self.id))?;
        f.flush().map_err(|e| io_err(e, self.id))
    }

    /// Read back the persisted in-use byte.
    pub fn status(&self) -> Result<InUseState> {
        read_status(&self.path, self.id)
    }
}
