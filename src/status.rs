// MIT License
// Copyright 2023--present optirpc developers

//! Status codes and C-side error reporting.
//!
//! This module provides three components that work together:
//!
//! 1. **[`optirpc_status_t`]**: An integer-valued enum returned from every
//!    `extern "C"` function. `OPTIRPC_SUCCESS` (0) means the call succeeded;
//!    any other value names an error category of [`crate::Error`]. The same
//!    numeric values travel on the wire as `Fault.code`, so a fault raised by
//!    a server maps back onto the same category on the client.
//!
//! 2. **Thread-local error message**: On failure, a human-readable
//!    description is stored in a thread-local `CString`. The C caller
//!    retrieves it with [`optirpc_last_error()`]. The pointer is valid until
//!    the next `optirpc_*` call on the same thread.
//!
//! 3. **[`catch_unwind`]**: A wrapper used inside every `extern "C"`
//!    function to catch Rust panics before they unwind across the FFI
//!    boundary. Caught panics become `OPTIRPC_INTERNAL_ERROR` with the panic
//!    message stored for retrieval.
//!
//! ## Usage from C
//!
//! ```c
//! optirpc_status_t s = optirpc_collection_read(conn, OPTIRPC_KIND_SPECTRUM, key, &json);
//! if (s != OPTIRPC_SUCCESS) {
//!     fprintf(stderr, "optirpc error: %s\n", optirpc_last_error());
//! }
//! ```

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use crate::error::Error;

/// Status codes returned by all C API functions and carried in wire faults.
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum optirpc_status_t {
    /// Operation completed successfully.
    OPTIRPC_SUCCESS = 0,
    /// An invalid parameter was passed (null pointer, bad JSON, bad geo path).
    OPTIRPC_INVALID_PARAMETER = 1,
    /// An internal error occurred (e.g. a Rust panic was caught).
    OPTIRPC_INTERNAL_ERROR = 2,
    /// The transport is unavailable or timed out.
    OPTIRPC_RPC_ERROR = 3,
    /// The key does not exist in the addressed collection.
    OPTIRPC_NOT_FOUND = 4,
    /// The server rejected the payload during domain validation.
    OPTIRPC_REJECTED = 5,
    /// A link was used against a collection it does not belong to.
    OPTIRPC_WRONG_COLLECTION = 6,
    /// No registered collection recognizes the key.
    OPTIRPC_UNKNOWN_KEY = 7,
    /// Two instances or sub-parts would share a name.
    OPTIRPC_NAMING_CONFLICT = 8,
    /// Reference expansion re-entered a key that is being expanded.
    OPTIRPC_CYCLE_DETECTED = 9,
    /// A simulation names a sensor or source that is not in the scene.
    OPTIRPC_DANGLING_REFERENCE = 10,
}

impl optirpc_status_t {
    /// Wire representation used in `Fault.code`.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Inverse of [`code`](Self::code). Unknown codes map to `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        use optirpc_status_t::*;
        Some(match code {
            0 => OPTIRPC_SUCCESS,
            1 => OPTIRPC_INVALID_PARAMETER,
            2 => OPTIRPC_INTERNAL_ERROR,
            3 => OPTIRPC_RPC_ERROR,
            4 => OPTIRPC_NOT_FOUND,
            5 => OPTIRPC_REJECTED,
            6 => OPTIRPC_WRONG_COLLECTION,
            7 => OPTIRPC_UNKNOWN_KEY,
            8 => OPTIRPC_NAMING_CONFLICT,
            9 => OPTIRPC_CYCLE_DETECTED,
            10 => OPTIRPC_DANGLING_REFERENCE,
            _ => return None,
        })
    }
}

impl From<&Error> for optirpc_status_t {
    fn from(err: &Error) -> Self {
        use optirpc_status_t::*;
        match err {
            Error::TransportUnavailable { .. } | Error::Timeout { .. } => OPTIRPC_RPC_ERROR,
            Error::RemoteRejected { .. } => OPTIRPC_REJECTED,
            Error::NotFound { .. } | Error::DetachedLink { .. } => OPTIRPC_NOT_FOUND,
            Error::WrongCollection { .. } => OPTIRPC_WRONG_COLLECTION,
            Error::KeyNotFoundInAnyCollection { .. } => OPTIRPC_UNKNOWN_KEY,
            Error::NamingConflict { .. } | Error::DuplicateInstanceName { .. } => {
                OPTIRPC_NAMING_CONFLICT
            }
            Error::CycleDetected { .. } => OPTIRPC_CYCLE_DETECTED,
            Error::DanglingNameReference { .. } => OPTIRPC_DANGLING_REFERENCE,
            Error::InvalidGeoPath { .. } | Error::Codec(_) => OPTIRPC_INVALID_PARAMETER,
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

/// Store an error message in the thread-local slot.
pub(crate) fn set_last_error(msg: &str) {
    LAST_ERROR.with(|cell| {
        let c = CString::new(msg.replace('\0', "\\0")).unwrap_or_default();
        *cell.borrow_mut() = c;
    });
}

/// Record `err` in the last-error slot and return its status code.
pub(crate) fn report(context: &str, err: &Error) -> optirpc_status_t {
    set_last_error(&format!("{context}: {err}"));
    optirpc_status_t::from(err)
}

/// Retrieve a pointer to the last error message for the current thread.
///
/// The pointer is valid until the next call to any `optirpc_*` function
/// on the same thread.
///
/// # Safety
/// This is intended to be called from C. The returned pointer must not
/// be freed by the caller.
#[no_mangle]
pub unsafe extern "C" fn optirpc_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| cell.borrow().as_ptr())
}

/// Execute a closure, catching any panics and converting them to status codes.
///
/// On success, returns the closure's status. On panic, stores the panic
/// message in the thread-local error slot and returns `OPTIRPC_INTERNAL_ERROR`.
pub(crate) fn catch_unwind<F>(f: F) -> optirpc_status_t
where
    F: FnOnce() -> optirpc_status_t + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(e) => {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = e.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            set_last_error(&msg);
            optirpc_status_t::OPTIRPC_INTERNAL_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::EntityKind;

    #[test]
    fn test_set_and_get_last_error() {
        set_last_error("test error");
        let ptr = unsafe { optirpc_last_error() };
        let msg = unsafe { std::ffi::CStr::from_ptr(ptr) };
        assert_eq!(msg.to_str().unwrap(), "test error");
    }

    #[test]
    fn test_catch_unwind_success() {
        let status = catch_unwind(|| optirpc_status_t::OPTIRPC_SUCCESS);
        assert_eq!(status, optirpc_status_t::OPTIRPC_SUCCESS);
    }

    #[test]
    fn test_catch_unwind_panic() {
        let status = catch_unwind(|| panic!("boom"));
        assert_eq!(status, optirpc_status_t::OPTIRPC_INTERNAL_ERROR);
        let ptr = unsafe { optirpc_last_error() };
        let msg = unsafe { std::ffi::CStr::from_ptr(ptr) };
        assert_eq!(msg.to_str().unwrap(), "boom");
    }

    #[test]
    fn codes_round_trip_through_the_wire_value() {
        for code in 0..=10 {
            let status = optirpc_status_t::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(optirpc_status_t::from_code(99), None);
    }

    #[test]
    fn report_stores_context_and_maps_category() {
        let err = Error::NotFound {
            kind: EntityKind::Spectrum,
            key: "abc".into(),
        };
        let status = report("optirpc_collection_read", &err);
        assert_eq!(status, optirpc_status_t::OPTIRPC_NOT_FOUND);
        let ptr = unsafe { optirpc_last_error() };
        let msg = unsafe { std::ffi::CStr::from_ptr(ptr) }.to_str().unwrap();
        assert!(msg.starts_with("optirpc_collection_read: "));
        assert!(msg.contains("abc"));
    }
}
