// MIT License
// Copyright 2023--present optirpc developers

//! Public C API entry points.
//!
//! Each submodule exposes `extern "C"` functions that cbindgen collects into
//! `include/optirpc.h`. All functions in this module follow three
//! invariants:
//!
//! 1. **Return [`optirpc_status_t`]** (or a pointer / void for constructors
//!    and destructors).
//! 2. **Wrap the body in [`catch_unwind`](crate::status::catch_unwind)** to
//!    prevent panics from crossing the FFI boundary.
//! 3. **Validate pointer arguments** and call
//!    [`set_last_error`](crate::status::set_last_error) before returning a
//!    non-success status.
//!
//! Messages cross the boundary as NUL-terminated JSON. Strings handed to
//! the caller are owned by the caller and released with
//! [`optirpc_string_free`].
//!
//! ## Submodules
//!
//! - [`connection`]: Lifecycle of `optirpc_connection_t`: in-memory or
//!   remote, health probe, close, free.
//! - [`collection`]: CRUD on any collection by `optirpc_kind_t`, plus key
//!   lookup and reference expansion.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::status::{optirpc_status_t, set_last_error};

pub mod collection;
pub mod connection;

/// Borrow a C string argument as UTF-8.
///
/// # Safety
/// `ptr` must be `NULL` or point to a NUL-terminated string that outlives
/// the returned slice.
pub(crate) unsafe fn str_arg<'a>(
    ptr: *const c_char,
    func: &str,
    name: &str,
) -> Result<&'a str, optirpc_status_t> {
    if ptr.is_null() {
        set_last_error(&format!("{func}: {name} is NULL"));
        return Err(optirpc_status_t::OPTIRPC_INVALID_PARAMETER);
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|e| {
        set_last_error(&format!("{func}: {name} is not valid UTF-8: {e}"));
        optirpc_status_t::OPTIRPC_INVALID_PARAMETER
    })
}

/// Hand `s` to C. Returns `NULL` (and records why) if `s` contains a NUL.
pub(crate) fn into_c_string(s: String, func: &str) -> Result<*mut c_char, optirpc_status_t> {
    CString::new(s).map(CString::into_raw).map_err(|e| {
        set_last_error(&format!("{func}: result contains an interior NUL: {e}"));
        optirpc_status_t::OPTIRPC_INTERNAL_ERROR
    })
}

/// Free a string returned by any `optirpc_*` function.
///
/// If `s` is `NULL`, this is a no-op.
///
/// # Safety
/// `s` must have been returned by this library and not freed before.
#[no_mangle]
pub unsafe extern "C" fn optirpc_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}
