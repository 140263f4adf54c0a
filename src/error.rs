// MIT License
// Copyright 2023--present optirpc developers

//! Error taxonomy shared by every layer of the crate.
//!
//! Errors are plain values: nothing here retries. The only retry loop in the
//! crate is the readiness probe in [`Connection::new`](crate::Connection::new).

use std::time::Duration;

use thiserror::Error;

use crate::kind::EntityKind;
use crate::status::optirpc_status_t;

/// Errors returned by collections, links, the resolver, the assembler and jobs.
#[derive(Error, Debug)]
pub enum Error {
    /// The channel could not be opened or the connection was closed.
    #[error("transport to '{target}' unavailable: {reason}")]
    TransportUnavailable { target: String, reason: String },

    /// The readiness deadline or a per-call deadline expired.
    #[error("'{target}' did not answer within {after:?}")]
    Timeout { target: String, after: Duration },

    /// The server's domain validation refused the request. Fields are the
    /// server's own, unmodified.
    #[error("server rejected the request: {name} (code {code}): {message}")]
    RemoteRejected {
        code: u32,
        name: String,
        message: String,
    },

    /// The key is not present in the addressed collection.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: EntityKind, key: String },

    /// A link was used through a collection that did not produce it.
    #[error("link is not on this {expected} collection (link belongs to a {found} collection)")]
    WrongCollection {
        expected: EntityKind,
        found: EntityKind,
    },

    /// The link was deleted and no longer carries a key.
    #[error("{kind} link was deleted and has no key")]
    DetachedLink { kind: EntityKind },

    /// No collection known to the registry holds the key.
    #[error("key '{key}' not found in any collection")]
    KeyNotFoundInAnyCollection { key: String },

    /// A merge would produce two entries with the same name.
    #[error("naming conflict on '{name}' from '{origin}': {conflict}")]
    NamingConflict {
        name: String,
        origin: String,
        conflict: String,
    },

    /// Reference expansion re-entered a key it is still expanding.
    #[error("reference cycle through key '{key}'")]
    CycleDetected { key: String },

    /// A simulation instance names a sensor or source the scene lacks.
    #[error("simulation '{simulation}' references unknown {list} '{reference}'")]
    DanglingNameReference {
        simulation: String,
        reference: String,
        list: &'static str,
    },

    /// Two instances of one scene list share a name.
    #[error("duplicate {list} instance name '{name}'")]
    DuplicateInstanceName { list: &'static str, name: String },

    /// The string does not follow the geo-path grammar.
    #[error("invalid geo path '{path}': {reason}")]
    InvalidGeoPath { path: String, reason: &'static str },

    /// A payload could not be encoded or decoded.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Status code for this error, used in wire faults and the C ABI.
    pub fn status(&self) -> optirpc_status_t {
        optirpc_status_t::from(self)
    }

    /// Stable name of the error category, sent as `Fault.name` when the
    /// error is not already a server fault.
    pub fn category(&self) -> &'static str {
        match self {
            Error::TransportUnavailable { .. } => "TransportUnavailable",
            Error::Timeout { .. } => "Timeout",
            Error::RemoteRejected { .. } => "RemoteRejected",
            Error::NotFound { .. } => "NotFound",
            Error::WrongCollection { .. } => "WrongCollection",
            Error::DetachedLink { .. } => "DetachedLink",
            Error::KeyNotFoundInAnyCollection { .. } => "KeyNotFoundInAnyCollection",
            Error::NamingConflict { .. } => "NamingConflict",
            Error::CycleDetected { .. } => "CycleDetected",
            Error::DanglingNameReference { .. } => "DanglingNameReference",
            Error::DuplicateInstanceName { .. } => "DuplicateInstanceName",
            Error::InvalidGeoPath { .. } => "InvalidGeoPath",
            Error::Codec(_) => "Codec",
        }
    }

    /// Split into the `(code, name, message)` triple carried by a wire fault.
    pub fn to_fault(&self) -> (u32, String, String) {
        match self {
            Error::RemoteRejected {
                code,
                name,
                message,
            } => (*code, name.clone(), message.clone()),
            other => (
                other.status().code(),
                other.category().to_string(),
                other.to_string(),
            ),
        }
    }

    /// Rebuild an error from a wire fault raised while addressing
    /// `kind`/`key`. `NotFound` faults regain their local form; every other
    /// fault is surfaced as [`Error::RemoteRejected`] with the server's fields.
    pub fn from_fault(code: u32, name: String, message: String, kind: EntityKind, key: &str) -> Self {
        if optirpc_status_t::from_code(code) == Some(optirpc_status_t::OPTIRPC_NOT_FOUND) {
            return Error::NotFound {
                kind,
                key: key.to_string(),
            };
        }
        Error::RemoteRejected {
            code,
            name,
            message,
        }
    }

    /// `true` for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
