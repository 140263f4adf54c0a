// MIT License
// Copyright 2023--present optirpc developers

//! Cap'n Proto RPC server that dispatches incoming `Database` calls to a
//! [`Backend`].

use std::net::SocketAddr;
use std::os::raw::c_char;
use std::sync::Arc;
use std::thread;

use capnp::capability::Promise;
use capnp::Error as CapnpError;
use capnp_rpc::{pry, rpc_twoparty_capnp, twoparty, RpcSystem};
use futures::AsyncReadExt;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::task::LocalSet;
use tracing::{debug, error, info};

use crate::backend::Backend;
use crate::c_api::connection::optirpc_connection_t;
use crate::error::{Error, Result};
use crate::rpc::optics_capnp::{database, fault};
use crate::rpc::{kind_from_wire, state_to_wire};
use crate::status::{catch_unwind, optirpc_status_t, report, set_last_error};

/// RPC server state wrapping a backend.
struct DatabaseServer {
    backend: Arc<dyn Backend>,
}

fn write_fault(mut fault: fault::Builder<'_>, err: &Error) {
    let (code, name, message) = err.to_fault();
    fault.set_code(code);
    fault.set_name(name.as_str());
    fault.set_message(message.as_str());
}

fn parse(payload: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(payload)?)
}

fn encode<T: Serialize>(value: Result<T>) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&value?)?)
}

impl database::Server for DatabaseServer {
    fn health(
        &mut self,
        _: database::HealthParams,
        mut results: database::HealthResults,
    ) -> Promise<(), CapnpError> {
        match self.backend.health() {
            Ok(ready) => {
                results.get().set_ready(ready);
                Promise::ok(())
            }
            Err(e) => Promise::err(CapnpError::failed(e.to_string())),
        }
    }

    fn create(
        &mut self,
        params: database::CreateParams,
        mut results: database::CreateResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let kind = kind_from_wire(pry!(params.get_kind()));
        let outcome =
            parse(pry!(params.get_payload())).and_then(|payload| self.backend.create(kind, payload));
        match outcome {
            Ok(key) => results.get().set_key(key.as_str()),
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }

    fn read(
        &mut self,
        params: database::ReadParams,
        mut results: database::ReadResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let kind = kind_from_wire(pry!(params.get_kind()));
        let key = pry!(pry!(params.get_key()).to_str());
        match encode(self.backend.read(kind, key)) {
            Ok(bytes) => results.get().set_payload(&bytes[..]),
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }

    fn update(
        &mut self,
        params: database::UpdateParams,
        mut results: database::UpdateResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let kind = kind_from_wire(pry!(params.get_kind()));
        let key = pry!(pry!(params.get_key()).to_str());
        let outcome = parse(pry!(params.get_payload()))
            .and_then(|payload| self.backend.update(kind, key, payload));
        if let Err(e) = outcome {
            write_fault(results.get().init_fault(), &e);
        }
        Promise::ok(())
    }

    fn delete(
        &mut self,
        params: database::DeleteParams,
        mut results: database::DeleteResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let kind = kind_from_wire(pry!(params.get_kind()));
        let key = pry!(pry!(params.get_key()).to_str());
        if let Err(e) = self.backend.delete(kind, key) {
            write_fault(results.get().init_fault(), &e);
        }
        Promise::ok(())
    }

    fn list(
        &mut self,
        params: database::ListParams,
        mut results: database::ListResults,
    ) -> Promise<(), CapnpError> {
        let kind = kind_from_wire(pry!(pry!(params.get()).get_kind()));
        match self.backend.list(kind) {
            Ok(keys) => {
                let mut list = results.get().init_keys(keys.len() as u32);
                for (i, key) in keys.iter().enumerate() {
                    list.set(i as u32, key.as_str());
                }
            }
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }

    fn load_file(
        &mut self,
        params: database::LoadFileParams,
        mut results: database::LoadFileResults,
    ) -> Promise<(), CapnpError> {
        let params = pry!(params.get());
        let key = pry!(pry!(params.get_key()).to_str());
        let file_uri = pry!(pry!(params.get_file_uri()).to_str());
        let password = pry!(pry!(params.get_password()).to_str());
        let password = (!password.is_empty()).then_some(password);
        if let Err(e) = self.backend.load_file(key, file_uri, password) {
            write_fault(results.get().init_fault(), &e);
        }
        Promise::ok(())
    }

    fn job_start(
        &mut self,
        params: database::JobStartParams,
        mut results: database::JobStartResults,
    ) -> Promise<(), CapnpError> {
        let key = pry!(pry!(pry!(params.get()).get_key()).to_str());
        if let Err(e) = self.backend.job_start(key) {
            write_fault(results.get().init_fault(), &e);
        }
        Promise::ok(())
    }

    fn job_stop(
        &mut self,
        params: database::JobStopParams,
        mut results: database::JobStopResults,
    ) -> Promise<(), CapnpError> {
        let key = pry!(pry!(pry!(params.get()).get_key()).to_str());
        if let Err(e) = self.backend.job_stop(key) {
            write_fault(results.get().init_fault(), &e);
        }
        Promise::ok(())
    }

    fn job_state(
        &mut self,
        params: database::JobStateParams,
        mut results: database::JobStateResults,
    ) -> Promise<(), CapnpError> {
        let key = pry!(pry!(pry!(params.get()).get_key()).to_str());
        match self.backend.job_state(key) {
            Ok(state) => results.get().set_state(state_to_wire(state)),
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }

    fn job_results(
        &mut self,
        params: database::JobResultsParams,
        mut results: database::JobResultsResults,
    ) -> Promise<(), CapnpError> {
        let key = pry!(pry!(pry!(params.get()).get_key()).to_str());
        match encode(self.backend.job_results(key)) {
            Ok(bytes) => results.get().set_payload(&bytes[..]),
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }

    fn job_error(
        &mut self,
        params: database::JobErrorParams,
        mut results: database::JobErrorResults,
    ) -> Promise<(), CapnpError> {
        let key = pry!(pry!(pry!(params.get()).get_key()).to_str());
        match self.backend.job_error(key) {
            Ok(message) => results.get().set_message(message.as_str()),
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }

    fn job_progress(
        &mut self,
        params: database::JobProgressParams,
        mut results: database::JobProgressResults,
    ) -> Promise<(), CapnpError> {
        let key = pry!(pry!(pry!(params.get()).get_key()).to_str());
        match encode(self.backend.job_progress(key)) {
            Ok(bytes) => results.get().set_payload(&bytes[..]),
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }

    fn job_ray_paths(
        &mut self,
        params: database::JobRayPathsParams,
        mut results: database::JobRayPathsResults,
    ) -> Promise<(), CapnpError> {
        let key = pry!(pry!(pry!(params.get()).get_key()).to_str());
        match encode(self.backend.job_ray_paths(key)) {
            Ok(bytes) => results.get().set_payload(&bytes[..]),
            Err(e) => write_fault(results.get().init_fault(), &e),
        }
        Promise::ok(())
    }
}

/// In-process capability dispatching to `backend`.
pub fn new_client(backend: Arc<dyn Backend>) -> database::Client {
    capnp_rpc::new_client(DatabaseServer { backend })
}

fn transport(target: &str, reason: impl std::fmt::Display) -> Error {
    Error::TransportUnavailable {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

/// Accept connections on `listener` forever, one RPC system per peer.
///
/// Must be polled inside a `LocalSet`.
pub async fn serve_listener(listener: TcpListener, backend: Arc<dyn Backend>) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    let database = new_client(backend);

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| transport(&local_addr, format!("accept failed: {e}")))?;
        let _ = stream.set_nodelay(true);
        debug!(peer = %peer, "accepted");

        let (reader, writer) =
            tokio_util::compat::TokioAsyncReadCompatExt::compat(stream).split();
        let network = twoparty::VatNetwork::new(
            futures::io::BufReader::new(reader),
            futures::io::BufWriter::new(writer),
            rpc_twoparty_capnp::Side::Server,
            Default::default(),
        );
        let rpc_system = RpcSystem::new(Box::new(network), Some(database.clone().client));
        tokio::task::spawn_local(rpc_system);
    }
}

/// Serve `backend` on `host:port`, blocking the current thread.
pub fn serve(backend: Arc<dyn Backend>, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let runtime =
        Runtime::new().map_err(|e| transport(&addr, format!("failed to create runtime: {e}")))?;
    let local = LocalSet::new();
    local.block_on(&runtime, async {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| transport(&addr, format!("failed to bind: {e}")))?;
        info!(addr = %addr, "serving");
        serve_listener(listener, backend).await
    })
}

/// Bind `host:port` (port 0 picks a free one) and serve `backend` from a
/// background thread. Returns the bound address.
pub fn spawn(backend: Arc<dyn Backend>, host: &str, port: u16) -> Result<SocketAddr> {
    let addr = format!("{host}:{port}");
    let listener = std::net::TcpListener::bind(&addr)
        .map_err(|e| transport(&addr, format!("failed to bind: {e}")))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| transport(&addr, e))?;
    let bound = listener.local_addr().map_err(|e| transport(&addr, e))?;

    thread::Builder::new()
        .name(format!("optirpc-server-{bound}"))
        .spawn(move || {
            let runtime = match Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(addr = %bound, "failed to create runtime: {e}");
                    return;
                }
            };
            let local = LocalSet::new();
            local.block_on(&runtime, async move {
                let listener = match TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(e) => {
                        error!(addr = %bound, "failed to adopt listener: {e}");
                        return;
                    }
                };
                info!(addr = %bound, "serving");
                if let Err(e) = serve_listener(listener, backend).await {
                    error!(addr = %bound, "server stopped: {e}");
                }
            });
        })
        .map_err(|e| transport(&addr, format!("failed to spawn server thread: {e}")))?;
    Ok(bound)
}

/// Start an RPC server listening on `host:port`, serving the database
/// behind `conn`.
///
/// This function blocks the current thread. It creates its own tokio runtime.
///
/// # Safety
/// `conn` must be a valid pointer obtained from an `optirpc_connection_*`
/// constructor and must remain valid for the lifetime of the server.
#[no_mangle]
pub unsafe extern "C" fn optirpc_rpc_server_start(
    conn: *const optirpc_connection_t,
    host: *const c_char,
    port: u16,
) -> optirpc_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        if conn.is_null() {
            set_last_error("optirpc_rpc_server_start: conn is NULL");
            return optirpc_status_t::OPTIRPC_INVALID_PARAMETER;
        }
        if host.is_null() {
            set_last_error("optirpc_rpc_server_start: host is NULL");
            return optirpc_status_t::OPTIRPC_INVALID_PARAMETER;
        }

        let conn_ref = unsafe { &*conn };
        let host_str = match unsafe { std::ffi::CStr::from_ptr(host) }.to_str() {
            Ok(s) => s,
            Err(e) => {
                set_last_error(&format!("invalid host string: {e}"));
                return optirpc_status_t::OPTIRPC_INVALID_PARAMETER;
            }
        };

        match serve(conn_ref.shared_backend(), host_str, port) {
            Ok(()) => optirpc_status_t::OPTIRPC_SUCCESS,
            Err(e) => report("optirpc_rpc_server_start", &e),
        }
    }))
}
