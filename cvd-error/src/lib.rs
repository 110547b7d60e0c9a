//! Error types shared across the cvdctl workspace.
//!
//! Every crate in this workspace returns `cvd_error::Result<T>` from its
//! public operations. The design mirrors a `kind` + `report` split: callers
//! that want to branch on failure mode match on [`ErrorKind`] via
//! [`HasKind`], while callers that just want to log or print use the
//! [`Error`]'s `Display` impl, which renders the underlying cause together
//! with what we were doing and which resource we were doing it to.

use std::fmt;
use std::sync::Arc;

use derive_more::Display;

/// A coarse classification of what went wrong.
///
/// Kept deliberately small: a handful of kinds that every crate in this
/// workspace can map its failures onto, rather than one kind per call site.
/// Add a new variant only when a caller needs to branch on it specifically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Caller-supplied input (a group name, instance name, filter) did not
    /// meet the required grammar or constraints.
    #[display(fmt = "invalid input")]
    InvalidInput,

    /// The requested resource (instance id, lock, group) is already held or
    /// already exists, and the caller asked for exclusive use of it.
    #[display(fmt = "local resource already in use")]
    LocalResourceAlreadyInUse,

    /// A lookup found zero matches where the caller expected at least one.
    #[display(fmt = "not found")]
    NotFound,

    /// A lookup or selection found more matches than the caller could use.
    #[display(fmt = "ambiguous selection")]
    AmbiguousSelection,

    /// Reading or writing the on-disk instance database failed for reasons
    /// unrelated to its content (permissions, missing directory, I/O error).
    #[display(fmt = "persistent state access failed")]
    PersistentStateAccessFailed,

    /// The on-disk instance database was read successfully but its content
    /// could not be parsed into the expected shape.
    #[display(fmt = "persistent state corrupted")]
    PersistentStateCorrupted,

    /// A caller used an API in a way its contract forbids (e.g. storing
    /// without holding the write lock).
    #[display(fmt = "bad API usage")]
    BadApiUsage,

    /// An external helper binary (`start_cvd`, `stop_cvd`, ...) could not be
    /// spawned or returned a failing exit status.
    #[display(fmt = "external tool failed")]
    ExternalToolFailed,

    /// Something our own invariants should have prevented happened anyway.
    /// Always a bug in this workspace, never a consequence of bad input.
    #[display(fmt = "internal error")]
    Internal,
}

/// Types that can report which [`ErrorKind`] they belong to.
pub trait HasKind {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// What we were doing when the error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Action {
    #[display(fmt = "loading")]
    Loading,
    #[display(fmt = "storing")]
    Storing,
    #[display(fmt = "deleting")]
    Deleting,
    #[display(fmt = "locking")]
    Locking,
    #[display(fmt = "unlocking")]
    Unlocking,
    #[display(fmt = "creating")]
    Creating,
    #[display(fmt = "removing")]
    Removing,
    #[display(fmt = "starting")]
    Starting,
    #[display(fmt = "stopping")]
    Stopping,
    #[display(fmt = "selecting")]
    Selecting,
    #[display(fmt = "validating")]
    Validating,
}

/// What we were doing it to.
#[derive(Debug, Clone, Display)]
pub enum Resource {
    #[display(fmt = "the instance database")]
    Database,
    #[display(fmt = "lock file for instance {id}")]
    LockFile { id: u32 },
    #[display(fmt = "directory {path}")]
    Directory { path: String },
    #[display(fmt = "file {path}")]
    File { path: String },
    #[display(fmt = "group {name}")]
    Group { name: String },
    #[display(fmt = "instance {id}")]
    Instance { id: u32 },
    #[display(fmt = "external tool {name}")]
    Tool { name: String },
    #[display(fmt = "a filter selection")]
    Selection,
}

/// The underlying cause of an [`Error`], before `action`/`resource` context
/// is attached.
#[derive(Debug, thiserror::Error)]
pub enum ErrorSource {
    #[error("{0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error("{0}")]
    Serde(#[source] Arc<serde_json::Error>),

    #[error("lock is held by another process or caller")]
    WouldBlock,

    #[error("no write lock is held")]
    NoLock,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Ambiguous(String),

    #[error("{0}")]
    ExternalTool(String),

    #[error("{0}")]
    Internal(String),
}

/// A workspace error: a cause, paired with what we were doing and to which
/// resource, so a log line is self-explanatory without a backtrace.
#[derive(Debug)]
pub struct Error {
    source: ErrorSource,
    action: Action,
    resource: Resource,
}

impl Error {
    /// Build an error from its three parts.
    pub fn new(source: ErrorSource, action: Action, resource: Resource) -> Self {
        Error {
            source,
            action,
            resource,
        }
    }

    /// Build an internal-bug error. Use this for invariant violations this
    /// workspace's own logic should have prevented.
    pub fn internal(msg: impl Into<String>, action: Action, resource: Resource) -> Self {
        Error::new(ErrorSource::Internal(msg.into()), action, resource)
    }

    /// The underlying cause.
    pub fn source_detail(&self) -> &ErrorSource {
        &self.source
    }

    /// What we were doing.
    pub fn action(&self) -> Action {
        self.action
    }

    /// What we were doing it to.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {} {}", self.source, self.action, self.resource)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match &self.source {
            ErrorSource::Io(_) => ErrorKind::PersistentStateAccessFailed,
            ErrorSource::Serde(_) => match self.action {
                Action::Storing => ErrorKind::Internal,
                _ => ErrorKind::PersistentStateCorrupted,
            },
            ErrorSource::WouldBlock => ErrorKind::LocalResourceAlreadyInUse,
            ErrorSource::NoLock => ErrorKind::BadApiUsage,
            ErrorSource::Validation(_) => ErrorKind::InvalidInput,
            ErrorSource::Conflict(_) => ErrorKind::LocalResourceAlreadyInUse,
            ErrorSource::NotFound(_) => ErrorKind::NotFound,
            ErrorSource::Ambiguous(_) => ErrorKind::AmbiguousSelection,
            ErrorSource::ExternalTool(_) => ErrorKind::ExternalToolFailed,
            ErrorSource::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Helpers for attaching `action`/`resource` context to a raw `std::io::Error`
/// or `serde_json::Error` at the point it's produced, matching the way
/// `tor-persist`'s `FsStateMgr` wraps its I/O.
pub trait ResultExt<T> {
    /// Attach context to an I/O failure.
    fn io_context(self, action: Action, resource: Resource) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn io_context(self, action: Action, resource: Resource) -> Result<T> {
        self.map_err(|e| Error::new(ErrorSource::Io(Arc::new(e)), action, resource))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, serde_json::Error> {
    fn io_context(self, action: Action, resource: Resource) -> Result<T> {
        self.map_err(|e| Error::new(ErrorSource::Serde(Arc::new(e)), action, resource))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_reads_as_a_sentence() {
        let err = Error::new(
            ErrorSource::NotFound("no such group".into()),
            Action::Selecting,
            Resource::Group {
                name: "cvd_1".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "no such group while selecting group cvd_1"
        );
    }

    #[test]
    fn kind_maps_would_block_to_already_in_use() {
        let err = Error::new(
            ErrorSource::WouldBlock,
            Action::Locking,
            Resource::LockFile { id: 3 },
        );
        assert_eq!(err.kind(), ErrorKind::LocalResourceAlreadyInUse);
    }

    #[test]
    fn kind_maps_serde_during_store_to_internal() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::new(
            ErrorSource::Serde(Arc::new(json_err)),
            Action::Storing,
            Resource::Database,
        );
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
