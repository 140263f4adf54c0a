// MIT License
// Copyright 2023--present optirpc developers

//! Blocking [`Backend`] over Cap'n Proto RPC.
//!
//! Every call opens a TCP connection, runs one request inside a `LocalSet`
//! (required because `capnp_rpc::RpcSystem` is `!Send`) and tears the
//! connection down again. Transport failures become
//! [`Error::TransportUnavailable`]; faults in a reply become the error the
//! server described.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use capnp_rpc::{rpc_twoparty_capnp, twoparty, RpcSystem};
use futures::AsyncReadExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::task::LocalSet;
use tracing::trace;

use crate::backend::Backend;
use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};
use crate::job::{JobProgress, JobResult, JobState, RayPath};
use crate::kind::EntityKind;
use crate::rpc::optics_capnp::{database, fault};
use crate::rpc::{kind_to_wire, state_from_wire};

/// Outer error: the exchange itself failed. Inner error: the server
/// answered with a fault.
type Reply<T> = capnp::Result<Result<T>>;

/// RPC client for one `host:port`.
pub struct RpcClient {
    runtime: Runtime,
    addr: String,
    timeout: Duration,
}

fn read_fault(fault: fault::Reader<'_>, kind: EntityKind, key: &str) -> capnp::Result<Error> {
    Ok(Error::from_fault(
        fault.get_code(),
        fault.get_name()?.to_str()?.to_string(),
        fault.get_message()?.to_str()?.to_string(),
        kind,
        key,
    ))
}

macro_rules! bail_on_fault {
    ($reply:expr, $kind:expr, $key:expr) => {
        if $reply.has_fault() {
            return Ok(Err(read_fault($reply.get_fault()?, $kind, $key)?));
        }
    };
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

impl RpcClient {
    /// Create a client for `config.host:config.port`.
    ///
    /// No connection is made here; the first call (normally the readiness
    /// probe run by [`Connection::connect`](crate::Connection::connect))
    /// opens one.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let addr = config.target();
        let runtime = Runtime::new().map_err(|e| Error::TransportUnavailable {
            target: addr.clone(),
            reason: format!("failed to create tokio runtime: {e}"),
        })?;
        Ok(Self {
            runtime,
            addr,
            timeout: config.rpc_timeout,
        })
    }

    fn transport(&self, reason: impl fmt::Display) -> Error {
        Error::TransportUnavailable {
            target: self.addr.clone(),
            reason: reason.to_string(),
        }
    }

    async fn connect(&self) -> capnp::Result<database::Client> {
        let stream = tokio::net::TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;

        let (reader, writer) =
            tokio_util::compat::TokioAsyncReadCompatExt::compat(stream).split();
        let network = twoparty::VatNetwork::new(
            futures::io::BufReader::new(reader),
            futures::io::BufWriter::new(writer),
            rpc_twoparty_capnp::Side::Client,
            Default::default(),
        );

        let mut rpc_system = RpcSystem::new(Box::new(network), None);
        let client: database::Client = rpc_system.bootstrap(rpc_twoparty_capnp::Side::Server);
        tokio::task::spawn_local(rpc_system);
        Ok(client)
    }

    /// Run one exchange to completion under the per-call deadline.
    fn run<T, F, Fut>(&self, op: &str, exchange: F) -> Result<T>
    where
        F: FnOnce(database::Client) -> Fut,
        Fut: Future<Output = Reply<T>>,
    {
        trace!(target_addr = %self.addr, op, "rpc call");
        let local = LocalSet::new();
        let outcome = local.block_on(&self.runtime, async {
            let call = async {
                let client = self.connect().await?;
                exchange(client).await
            };
            tokio::time::timeout(self.timeout, call).await
        });
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(self.transport(e)),
            Err(_) => Err(Error::Timeout {
                target: self.addr.clone(),
                after: self.timeout,
            }),
        }
    }
}

impl Backend for RpcClient {
    fn target(&self) -> String {
        self.addr.clone()
    }

    fn health(&self) -> Result<bool> {
        self.run("health", |client| async move {
            let response = client.health_request().send().promise.await?;
            Ok(Ok(response.get()?.get_ready()))
        })
    }

    fn create(&self, kind: EntityKind, payload: Value) -> Result<String> {
        let bytes = serde_json::to_vec(&payload)?;
        self.run("create", |client| async move {
            let mut request = client.create_request();
            request.get().set_kind(kind_to_wire(kind));
            request.get().set_payload(&bytes[..]);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, kind, "");
            Ok(Ok(reply.get_key()?.to_str()?.to_string()))
        })
    }

    fn read(&self, kind: EntityKind, key: &str) -> Result<Value> {
        self.run("read", |client| async move {
            let mut request = client.read_request();
            request.get().set_kind(kind_to_wire(kind));
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, kind, key);
            Ok(decode(reply.get_payload()?))
        })
    }

    fn update(&self, kind: EntityKind, key: &str, payload: Value) -> Result<()> {
        let bytes = serde_json::to_vec(&payload)?;
        self.run("update", |client| async move {
            let mut request = client.update_request();
            request.get().set_kind(kind_to_wire(kind));
            request.get().set_key(key);
            request.get().set_payload(&bytes[..]);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, kind, key);
            Ok(Ok(()))
        })
    }

    fn delete(&self, kind: EntityKind, key: &str) -> Result<()> {
        self.run("delete", |client| async move {
            let mut request = client.delete_request();
            request.get().set_kind(kind_to_wire(kind));
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, kind, key);
            Ok(Ok(()))
        })
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<String>> {
        self.run("list", |client| async move {
            let mut request = client.list_request();
            request.get().set_kind(kind_to_wire(kind));
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, kind, "");
            let keys = reply.get_keys()?;
            let mut out = Vec::with_capacity(keys.len() as usize);
            for key in keys.iter() {
                out.push(key?.to_str()?.to_string());
            }
            Ok(Ok(out))
        })
    }

    fn load_file(&self, scene_key: &str, file_uri: &str, password: Option<&str>) -> Result<()> {
        self.run("loadFile", |client| async move {
            let mut request = client.load_file_request();
            request.get().set_key(scene_key);
            request.get().set_file_uri(file_uri);
            request.get().set_password(password.unwrap_or(""));
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Scene, scene_key);
            Ok(Ok(()))
        })
    }

    fn job_start(&self, key: &str) -> Result<()> {
        self.run("jobStart", |client| async move {
            let mut request = client.job_start_request();
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Job, key);
            Ok(Ok(()))
        })
    }

    fn job_stop(&self, key: &str) -> Result<()> {
        self.run("jobStop", |client| async move {
            let mut request = client.job_stop_request();
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Job, key);
            Ok(Ok(()))
        })
    }

    fn job_state(&self, key: &str) -> Result<JobState> {
        self.run("jobState", |client| async move {
            let mut request = client.job_state_request();
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Job, key);
            Ok(Ok(state_from_wire(reply.get_state()?)))
        })
    }

    fn job_results(&self, key: &str) -> Result<Vec<JobResult>> {
        self.run("jobResults", |client| async move {
            let mut request = client.job_results_request();
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Job, key);
            Ok(decode(reply.get_payload()?))
        })
    }

    fn job_error(&self, key: &str) -> Result<String> {
        self.run("jobError", |client| async move {
            let mut request = client.job_error_request();
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Job, key);
            Ok(Ok(reply.get_message()?.to_str()?.to_string()))
        })
    }

    fn job_progress(&self, key: &str) -> Result<JobProgress> {
        self.run("jobProgress", |client| async move {
            let mut request = client.job_progress_request();
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Job, key);
            Ok(decode(reply.get_payload()?))
        })
    }

    fn job_ray_paths(&self, key: &str) -> Result<Vec<RayPath>> {
        self.run("jobRayPaths", |client| async move {
            let mut request = client.job_ray_paths_request();
            request.get().set_key(key);
            let response = request.send().promise.await?;
            let reply = response.get()?;
            bail_on_fault!(reply, EntityKind::Job, key);
            Ok(decode(reply.get_payload()?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let config = ConnectionConfig {
            host: "127.0.0.1".into(),
            port: 1,
            rpc_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let client = RpcClient::new(&config).unwrap();
        assert_eq!(client.target(), "127.0.0.1:1");
        assert!(matches!(
            client.list(EntityKind::Spectrum).unwrap_err(),
            Error::TransportUnavailable { .. }
        ));
    }
}
