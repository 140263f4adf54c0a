// MIT License
// Copyright 2023--present optirpc developers

//! C API for collections, key lookup and reference expansion.
//!
//! Payloads are JSON documents in the layout of [`crate::messages`]:
//!
//! ```c
//! char *key = NULL;
//! optirpc_collection_create(conn, OPTIRPC_KIND_SOP_TEMPLATE,
//!     "{\"name\":\"Mirror_90\",\"mirror\":{\"reflectance\":90}}", &key);
//! char *json = NULL;
//! optirpc_collection_read(conn, OPTIRPC_KIND_SOP_TEMPLATE, key, &json);
//! optirpc_string_free(json);
//! optirpc_string_free(key);
//! ```

use std::os::raw::c_char;

use serde_json::Value;

use super::connection::optirpc_connection_t;
use super::{into_c_string, str_arg};
use crate::error::Error;
use crate::kind::EntityKind;
use crate::registry::KeyResolver;
use crate::resolver::{self, Resolver};
use crate::status::{catch_unwind, optirpc_status_t, report, set_last_error};

/// Collection selector, in wire order.
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum optirpc_kind_t {
    OPTIRPC_KIND_SPECTRUM = 0,
    OPTIRPC_KIND_INTENSITY_TEMPLATE = 1,
    OPTIRPC_KIND_SOP_TEMPLATE = 2,
    OPTIRPC_KIND_VOP_TEMPLATE = 3,
    OPTIRPC_KIND_SOURCE_TEMPLATE = 4,
    OPTIRPC_KIND_SENSOR_TEMPLATE = 5,
    OPTIRPC_KIND_SIMULATION_TEMPLATE = 6,
    OPTIRPC_KIND_PART = 7,
    OPTIRPC_KIND_BODY = 8,
    OPTIRPC_KIND_FACE = 9,
    OPTIRPC_KIND_SCENE = 10,
    OPTIRPC_KIND_JOB = 11,
}

impl From<optirpc_kind_t> for EntityKind {
    fn from(kind: optirpc_kind_t) -> Self {
        EntityKind::ALL[kind as usize]
    }
}

impl From<EntityKind> for optirpc_kind_t {
    fn from(kind: EntityKind) -> Self {
        use optirpc_kind_t::*;
        match kind {
            EntityKind::Spectrum => OPTIRPC_KIND_SPECTRUM,
            EntityKind::IntensityTemplate => OPTIRPC_KIND_INTENSITY_TEMPLATE,
            EntityKind::SopTemplate => OPTIRPC_KIND_SOP_TEMPLATE,
            EntityKind::VopTemplate => OPTIRPC_KIND_VOP_TEMPLATE,
            EntityKind::SourceTemplate => OPTIRPC_KIND_SOURCE_TEMPLATE,
            EntityKind::SensorTemplate => OPTIRPC_KIND_SENSOR_TEMPLATE,
            EntityKind::SimulationTemplate => OPTIRPC_KIND_SIMULATION_TEMPLATE,
            EntityKind::Part => OPTIRPC_KIND_PART,
            EntityKind::Body => OPTIRPC_KIND_BODY,
            EntityKind::Face => OPTIRPC_KIND_FACE,
            EntityKind::Scene => OPTIRPC_KIND_SCENE,
            EntityKind::Job => OPTIRPC_KIND_JOB,
        }
    }
}

/// Early-return the status of a failed argument check.
macro_rules! arg {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(status) => return status,
        }
    };
}

/// Early-return a reported crate error.
macro_rules! call {
    ($func:expr, $e:expr) => {
        match $e {
            Ok(v) => v,
            Err(err) => return report($func, &err),
        }
    };
}

unsafe fn conn_arg<'a>(
    conn: *const optirpc_connection_t,
    func: &str,
) -> Result<&'a optirpc_connection_t, optirpc_status_t> {
    if conn.is_null() {
        set_last_error(&format!("{func}: conn is NULL"));
        return Err(optirpc_status_t::OPTIRPC_INVALID_PARAMETER);
    }
    Ok(unsafe { &*conn })
}

fn out_arg<T>(out: *mut T, func: &str) -> Result<(), optirpc_status_t> {
    if out.is_null() {
        set_last_error(&format!("{func}: output pointer is NULL"));
        return Err(optirpc_status_t::OPTIRPC_INVALID_PARAMETER);
    }
    Ok(())
}

fn parse_json(json: &str) -> Result<Value, Error> {
    Ok(serde_json::from_str(json)?)
}

/// Store a new entity and return its key in `*out_key`.
///
/// # Safety
/// `conn` must be a live handle, `json` a NUL-terminated string and
/// `out_key` a valid pointer. The returned key must be released with
/// `optirpc_string_free`.
#[no_mangle]
pub unsafe extern "C" fn optirpc_collection_create(
    conn: *const optirpc_connection_t,
    kind: optirpc_kind_t,
    json: *const c_char,
    out_key: *mut *mut c_char,
) -> optirpc_status_t {
    const F: &str = "optirpc_collection_create";
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        let conn = arg!(unsafe { conn_arg(conn, F) });
        let json = arg!(unsafe { str_arg(json, F, "json") });
        arg!(out_arg(out_key, F));

        let payload = call!(F, parse_json(json));
        let collection = call!(F, conn.raw_collection(kind.into()));
        let link = call!(F, collection.create(payload));
        unsafe { *out_key = arg!(into_c_string(link.into_key(), F)) };
        optirpc_status_t::OPTIRPC_SUCCESS
    }))
}

/// Read the entity `key` as JSON into `*out_json`.
///
/// # Safety
/// See `optirpc_collection_create`.
#[no_mangle]
pub unsafe extern "C" fn optirpc_collection_read(
    conn: *const optirpc_connection_t,
    kind: optirpc_kind_t,
    key: *const c_char,
    out_json: *mut *mut c_char,
) -> optirpc_status_t {
    const F: &str = "optirpc_collection_read";
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        let conn = arg!(unsafe { conn_arg(conn, F) });
        let key = arg!(unsafe { str_arg(key, F, "key") });
        arg!(out_arg(out_json, F));

        let collection = call!(F, conn.raw_collection(kind.into()));
        let value = call!(F, collection.read_key(key));
        let json = call!(F, resolver::to_pretty_string(&value));
        unsafe { *out_json = arg!(into_c_string(json, F)) };
        optirpc_status_t::OPTIRPC_SUCCESS
    }))
}

/// Replace the stored entity `key` with `json`.
///
/// # Safety
/// See `optirpc_collection_create`.
#[no_mangle]
pub unsafe extern "C" fn optirpc_collection_update(
    conn: *const optirpc_connection_t,
    kind: optirpc_kind_t,
    key: *const c_char,
    json: *const c_char,
) -> optirpc_status_t {
    const F: &str = "optirpc_collection_update";
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        let conn = arg!(unsafe { conn_arg(conn, F) });
        let key = arg!(unsafe { str_arg(key, F, "key") });
        let json = arg!(unsafe { str_arg(json, F, "json") });

        let payload = call!(F, parse_json(json));
        let collection = call!(F, conn.raw_collection(kind.into()));
        call!(F, collection.update(&collection.link(key), payload));
        optirpc_status_t::OPTIRPC_SUCCESS
    }))
}

/// Delete the entity `key`.
///
/// # Safety
/// See `optirpc_collection_create`.
#[no_mangle]
pub unsafe extern "C" fn optirpc_collection_delete(
    conn: *const optirpc_connection_t,
    kind: optirpc_kind_t,
    key: *const c_char,
) -> optirpc_status_t {
    const F: &str = "optirpc_collection_delete";
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        let conn = arg!(unsafe { conn_arg(conn, F) });
        let key = arg!(unsafe { str_arg(key, F, "key") });

        let collection = call!(F, conn.raw_collection(kind.into()));
        call!(F, collection.delete(&collection.link(key)));
        optirpc_status_t::OPTIRPC_SUCCESS
    }))
}

/// List every key of a collection as a JSON array of strings.
///
/// # Safety
/// See `optirpc_collection_create`.
#[no_mangle]
pub unsafe extern "C" fn optirpc_collection_list(
    conn: *const optirpc_connection_t,
    kind: optirpc_kind_t,
    out_json: *mut *mut c_char,
) -> optirpc_status_t {
    const F: &str = "optirpc_collection_list";
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        let conn = arg!(unsafe { conn_arg(conn, F) });
        arg!(out_arg(out_json, F));

        let collection = call!(F, conn.raw_collection(kind.into()));
        let keys: Vec<String> = call!(F, collection.list())
            .into_iter()
            .map(|link| link.into_key())
            .collect();
        let json = call!(F, serde_json::to_string(&keys).map_err(Error::from));
        unsafe { *out_json = arg!(into_c_string(json, F)) };
        optirpc_status_t::OPTIRPC_SUCCESS
    }))
}

/// Find which collection holds `key`.
///
/// # Safety
/// `conn` must be a live handle, `key` a NUL-terminated string and
/// `out_kind` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn optirpc_registry_lookup(
    conn: *const optirpc_connection_t,
    key: *const c_char,
    out_kind: *mut optirpc_kind_t,
) -> optirpc_status_t {
    const F: &str = "optirpc_registry_lookup";
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        let conn = arg!(unsafe { conn_arg(conn, F) });
        let key = arg!(unsafe { str_arg(key, F, "key") });
        arg!(out_arg(out_kind, F));

        let registry = call!(F, conn.registry());
        let link = call!(F, registry.lookup(key));
        unsafe { *out_kind = link.kind().into() };
        optirpc_status_t::OPTIRPC_SUCCESS
    }))
}

/// Read `key` with every reference replaced by the entity it names, as
/// pretty JSON in `*out_json`.
///
/// # Safety
/// See `optirpc_collection_create`.
#[no_mangle]
pub unsafe extern "C" fn optirpc_expand_key(
    conn: *const optirpc_connection_t,
    key: *const c_char,
    out_json: *mut *mut c_char,
) -> optirpc_status_t {
    const F: &str = "optirpc_expand_key";
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        let conn = arg!(unsafe { conn_arg(conn, F) });
        let key = arg!(unsafe { str_arg(key, F, "key") });
        arg!(out_arg(out_json, F));

        let registry = call!(F, conn.registry());
        let expanded = call!(F, Resolver::new(registry).expand_key(key));
        let json = call!(F, resolver::to_pretty_string(&expanded));
        unsafe { *out_json = arg!(into_c_string(json, F)) };
        optirpc_status_t::OPTIRPC_SUCCESS
    }))
}

#[cfg(test)]
mod tests {
    use std::ffi::{CStr, CString};

    use super::*;
    use crate::c_api::connection::{optirpc_connection_free, optirpc_connection_new_memory};
    use crate::c_api::optirpc_string_free;
    use optirpc_kind_t::*;

    unsafe fn take(s: *mut c_char) -> String {
        let owned = unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_string();
        unsafe { optirpc_string_free(s) };
        owned
    }

    #[test]
    fn crud_through_the_c_surface() {
        let conn = optirpc_connection_new_memory();
        let json = CString::new(r#"{"name":"Mirror_90","mirror":{"reflectance":90.0}}"#).unwrap();
        let mut key = std::ptr::null_mut();
        let status =
            unsafe { optirpc_collection_create(conn, OPTIRPC_KIND_SOP_TEMPLATE, json.as_ptr(), &mut key) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_SUCCESS);
        let key = CString::new(unsafe { take(key) }).unwrap();

        let mut kind = OPTIRPC_KIND_JOB;
        let status = unsafe { optirpc_registry_lookup(conn, key.as_ptr(), &mut kind) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_SUCCESS);
        assert_eq!(kind, OPTIRPC_KIND_SOP_TEMPLATE);

        let mut out = std::ptr::null_mut();
        let status =
            unsafe { optirpc_collection_read(conn, OPTIRPC_KIND_SOP_TEMPLATE, key.as_ptr(), &mut out) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_SUCCESS);
        let read: Value = serde_json::from_str(&unsafe { take(out) }).unwrap();
        assert_eq!(read["mirror"]["reflectance"], 90.0);

        let status =
            unsafe { optirpc_collection_delete(conn, OPTIRPC_KIND_SOP_TEMPLATE, key.as_ptr()) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_SUCCESS);
        let status =
            unsafe { optirpc_collection_read(conn, OPTIRPC_KIND_SOP_TEMPLATE, key.as_ptr(), &mut out) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_NOT_FOUND);

        unsafe { optirpc_connection_free(conn) };
    }

    #[test]
    fn rejected_payload_reports_the_server_status() {
        let conn = optirpc_connection_new_memory();
        let json = CString::new(r#"{"name":"Bad","mirror":{"reflectance":150.0}}"#).unwrap();
        let mut key = std::ptr::null_mut();
        let status =
            unsafe { optirpc_collection_create(conn, OPTIRPC_KIND_SOP_TEMPLATE, json.as_ptr(), &mut key) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_REJECTED);
        assert!(key.is_null());
        unsafe { optirpc_connection_free(conn) };
    }

    #[test]
    fn list_returns_a_json_array() {
        let conn = optirpc_connection_new_memory();
        let json = CString::new(r#"{"name":"s"}"#).unwrap();
        let mut key = std::ptr::null_mut();
        unsafe { optirpc_collection_create(conn, OPTIRPC_KIND_SCENE, json.as_ptr(), &mut key) };
        let key = unsafe { take(key) };

        let mut out = std::ptr::null_mut();
        let status = unsafe { optirpc_collection_list(conn, OPTIRPC_KIND_SCENE, &mut out) };
        assert_eq!(status, optirpc_status_t::OPTIRPC_SUCCESS);
        let keys: Vec<String> = serde_json::from_str(&unsafe { take(out) }).unwrap();
        assert_eq!(keys, vec![key]);
        unsafe { optirpc_connection_free(conn) };
    }

    #[test]
    fn kinds_map_in_wire_order() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from(optirpc_kind_t::from(kind)), kind);
        }
    }
}
