// MIT License
// Copyright 2023--present optirpc developers

//! C API for the connection handle lifecycle.
//!
//! ```c
//! optirpc_connection_t *conn = optirpc_connection_connect("localhost", 50051, 60000);
//! if (conn == NULL) { fprintf(stderr, "%s\n", optirpc_last_error()); }
//! /* ... optirpc_collection_* calls ... */
//! optirpc_connection_free(conn);
//! ```

use crate::connection::Connection;
use crate::memory::MemoryDatabase;
use crate::status::{catch_unwind, optirpc_status_t, report, set_last_error};

/// Opaque connection handle.
#[allow(non_camel_case_types)]
pub type optirpc_connection_t = Connection;

/// Create a connection to a fresh in-process database.
///
/// Returns a heap-allocated handle, or `NULL` on failure. The caller must
/// eventually call `optirpc_connection_free`.
#[no_mangle]
pub extern "C" fn optirpc_connection_new_memory() -> *mut optirpc_connection_t {
    match Connection::memory(MemoryDatabase::new()) {
        Ok(conn) => Box::into_raw(Box::new(conn)),
        Err(e) => {
            set_last_error(&format!("optirpc_connection_new_memory: {e}"));
            std::ptr::null_mut()
        }
    }
}

/// Connect to a server at `host:port`, waiting up to `timeout_ms`
/// milliseconds for it to report ready.
///
/// Returns a heap-allocated handle, or `NULL` on failure.
///
/// # Safety
/// `host` must be `NULL` or a valid NUL-terminated string.
#[cfg(feature = "rpc")]
#[no_mangle]
pub unsafe extern "C" fn optirpc_connection_connect(
    host: *const std::os::raw::c_char,
    port: u16,
    timeout_ms: u64,
) -> *mut optirpc_connection_t {
    let host = match unsafe { super::str_arg(host, "optirpc_connection_connect", "host") } {
        Ok(h) => h,
        Err(_) => return std::ptr::null_mut(),
    };
    let config = crate::connection::ConnectionConfig {
        host: host.to_string(),
        port,
        connect_timeout: std::time::Duration::from_millis(timeout_ms),
        ..Default::default()
    };
    match Connection::connect(&config) {
        Ok(conn) => Box::into_raw(Box::new(conn)),
        Err(e) => {
            set_last_error(&format!("optirpc_connection_connect: {e}"));
            std::ptr::null_mut()
        }
    }
}

/// Run one readiness probe, writing the answer to `ready`.
///
/// # Safety
/// `conn` must be a live handle and `ready` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn optirpc_connection_healthy(
    conn: *const optirpc_connection_t,
    ready: *mut bool,
) -> optirpc_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        if conn.is_null() {
            set_last_error("optirpc_connection_healthy: conn is NULL");
            return optirpc_status_t::OPTIRPC_INVALID_PARAMETER;
        }
        if ready.is_null() {
            set_last_error("optirpc_connection_healthy: ready is NULL");
            return optirpc_status_t::OPTIRPC_INVALID_PARAMETER;
        }
        match unsafe { &*conn }.healthy() {
            Ok(r) => {
                unsafe { *ready = r };
                optirpc_status_t::OPTIRPC_SUCCESS
            }
            Err(e) => report("optirpc_connection_healthy", &e),
        }
    }))
}

/// Close the connection. The handle stays valid but every further call
/// through it fails with `OPTIRPC_RPC_ERROR`.
///
/// # Safety
/// `conn` must be `NULL` or a live handle.
#[no_mangle]
pub unsafe extern "C" fn optirpc_connection_close(conn: *const optirpc_connection_t) {
    if !conn.is_null() {
        unsafe { &*conn }.close();
    }
}

/// Free a connection handle.
///
/// If `conn` is `NULL`, this is a no-op. After this call, `conn` must not
/// be used again.
///
/// # Safety
/// `conn` must be `NULL` or a handle not freed before.
#[no_mangle]
pub unsafe extern "C" fn optirpc_connection_free(conn: *mut optirpc_connection_t) {
    if !conn.is_null() {
        drop(unsafe { Box::from_raw(conn) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_connection_is_healthy() {
        let conn = optirpc_connection_new_memory();
        assert!(!conn.is_null());
        let mut ready = false;
        let status = unsafe { optirpc_connection_healthy(conn, &mut ready) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_SUCCESS);
        assert!(ready);
        unsafe { optirpc_connection_free(conn) };
    }

    #[test]
    fn closed_connection_reports_rpc_error() {
        let conn = optirpc_connection_new_memory();
        unsafe { optirpc_connection_close(conn) };
        let mut ready = false;
        let status = unsafe { optirpc_connection_healthy(conn, &mut ready) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_RPC_ERROR);
        unsafe { optirpc_connection_free(conn) };
    }

    #[test]
    fn null_handles_are_rejected() {
        let mut ready = false;
        let status = unsafe { optirpc_connection_healthy(std::ptr::null(), &mut ready) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_INVALID_PARAMETER);
        unsafe { optirpc_connection_free(std::ptr::null_mut()) };
    }
}
