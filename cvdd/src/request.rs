//! The in-process request/response envelope spec.md §6 describes, carried
//! from the CLI front-end into the handlers in this binary.

use std::collections::HashMap;
use std::path::PathBuf;

use cvd_selector::SelectorOptions;

/// Everything a handler needs to act on one subcommand invocation.
pub struct Request {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_directory: PathBuf,
    pub selector_options: SelectorOptions,
}

/// `OK` or `INTERNAL`, matching spec.md §6's response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Internal,
}

/// What a handler hands back to the CLI front-end: a status, an optional
/// human-readable message, and (for status queries) a JSON payload.
pub struct Response {
    pub status: Status,
    pub message: Option<String>,
    pub json: Option<serde_json::Value>,
}

impl Response {
    pub fn ok() -> Self {
        Response {
            status: Status::Ok,
            message: None,
            json: None,
        }
    }

    pub fn ok_with_json(json: serde_json::Value) -> Self {
        Response {
            status: Status::Ok,
            message: None,
            json: Some(json),
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Response {
            status: Status::Ok,
            message: Some(message.into()),
            json: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Response {
            status: Status::Internal,
            message: Some(message.into()),
            json: None,
        }
    }
}

impl From<cvd_error::Error> for Response {
    fn from(err: cvd_error::Error) -> Self {
        // No partial JSON ever reaches stdout on error, per spec.md §7.
        Response::internal(err.to_string())
    }
}
