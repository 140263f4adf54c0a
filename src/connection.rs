// MIT License
// Copyright 2023--present optirpc developers

//! Connection to one database endpoint.
//!
//! A [`Connection`] owns a single [`Backend`] and hands out one collection
//! per [`EntityKind`]. The same collection instance is returned for a kind
//! every time, which is what lets a [`Link`](crate::link::Link) check that it
//! is used through the collection that produced it. There is no global
//! default connection: every component receives one explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::collection::{Collection, RawCollection};
use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::memory::MemoryDatabase;
use crate::messages::{
    Body, Face, IntensityTemplate, Job, Message, Part, Scene, SensorTemplate, SimulationTemplate,
    SopTemplate, SourceTemplate, Spectrum, VopTemplate,
};
use crate::registry::{KeyMemo, ProbingRegistry};

/// Where and how to reach a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for the server to become healthy.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Delay between two readiness probes.
    #[serde(with = "millis")]
    pub health_poll_interval: Duration,
    /// Deadline for a single call once connected.
    #[serde(with = "millis")]
    pub rpc_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 50051,
            connect_timeout: Duration::from_secs(60),
            health_poll_interval: Duration::from_millis(100),
            rpc_timeout: Duration::from_secs(300),
        }
    }
}

impl ConnectionConfig {
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Durations are written as integer milliseconds in configuration files.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// The backend plus its open/closed flag, shared by every collection of a
/// connection.
pub(crate) struct Channel {
    backend: Arc<dyn Backend>,
    target: String,
    closed: AtomicBool,
    keys: Arc<KeyMemo>,
}

impl Channel {
    pub(crate) fn backend(&self) -> Result<&dyn Backend> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        Ok(self.backend.as_ref())
    }

    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    /// Drop a deleted key from the registry memo.
    pub(crate) fn forget(&self, key: &str) {
        self.keys.forget(key);
    }

    fn closed_error(&self) -> Error {
        Error::TransportUnavailable {
            target: self.target.clone(),
            reason: "connection closed".to_string(),
        }
    }
}

struct Inner {
    channel: Arc<Channel>,
    collections: [RawCollection; 12],
    registry: ProbingRegistry,
}

/// Handle to one database. Cheap to clone; clones share collections.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Wrap `backend`, probing its health every
    /// `config.health_poll_interval` until it answers ready.
    ///
    /// Fails with [`Error::Timeout`] once `config.connect_timeout` has
    /// elapsed, or with [`Error::TransportUnavailable`] when the last probe
    /// before the deadline failed at the transport level.
    pub fn new(backend: Arc<dyn Backend>, config: &ConnectionConfig) -> Result<Self> {
        let target = backend.target();
        wait_until_healthy(backend.as_ref(), &target, config)?;
        info!(target = %target, "connected");

        let keys = Arc::new(KeyMemo::default());
        let channel = Arc::new(Channel {
            backend,
            target,
            closed: AtomicBool::new(false),
            keys: keys.clone(),
        });
        let collections = EntityKind::ALL.map(|kind| RawCollection::new(kind, channel.clone()));
        let registry = ProbingRegistry::new(collections.clone(), keys);
        Ok(Self {
            inner: Arc::new(Inner {
                channel,
                collections,
                registry,
            }),
        })
    }

    /// Connection to an in-process [`MemoryDatabase`].
    pub fn memory(db: MemoryDatabase) -> Result<Self> {
        Self::new(Arc::new(db), &ConnectionConfig::default())
    }

    /// Connection to a Cap'n Proto server at `config.host:config.port`.
    #[cfg(feature = "rpc")]
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let client = crate::rpc::client::RpcClient::new(config)?;
        Self::new(Arc::new(client), config)
    }

    pub fn target(&self) -> &str {
        &self.inner.channel.target
    }

    /// Single readiness probe.
    pub fn healthy(&self) -> Result<bool> {
        self.inner.channel.backend()?.health()
    }

    /// Close the connection for every clone. Further calls fail with
    /// [`Error::TransportUnavailable`].
    pub fn close(&self) {
        if !self.inner.channel.closed.swap(true, Ordering::AcqRel) {
            info!(target = %self.target(), "connection closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.channel.closed.load(Ordering::Acquire)
    }

    /// The backend behind this connection, ignoring the closed flag.
    #[cfg(feature = "rpc")]
    pub(crate) fn shared_backend(&self) -> Arc<dyn Backend> {
        self.inner.channel.backend.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        self.inner.channel.backend().map(|_| ())
    }

    /// Untyped collection for `kind`.
    pub fn raw_collection(&self, kind: EntityKind) -> Result<RawCollection> {
        self.ensure_open()?;
        Ok(self.inner.collections[kind.index()].clone())
    }

    /// Typed collection for message `M`.
    pub fn collection<M: Message>(&self) -> Result<Collection<M>> {
        Ok(Collection::new(self.raw_collection(M::KIND)?))
    }

    /// Key resolver probing every collection of this connection.
    pub fn registry(&self) -> Result<&ProbingRegistry> {
        self.ensure_open()?;
        Ok(&self.inner.registry)
    }

    pub fn spectrums(&self) -> Result<Collection<Spectrum>> {
        self.collection()
    }

    pub fn intensity_templates(&self) -> Result<Collection<IntensityTemplate>> {
        self.collection()
    }

    pub fn sop_templates(&self) -> Result<Collection<SopTemplate>> {
        self.collection()
    }

    pub fn vop_templates(&self) -> Result<Collection<VopTemplate>> {
        self.collection()
    }

    pub fn source_templates(&self) -> Result<Collection<SourceTemplate>> {
        self.collection()
    }

    pub fn sensor_templates(&self) -> Result<Collection<SensorTemplate>> {
        self.collection()
    }

    pub fn simulation_templates(&self) -> Result<Collection<SimulationTemplate>> {
        self.collection()
    }

    pub fn parts(&self) -> Result<Collection<Part>> {
        self.collection()
    }

    pub fn bodies(&self) -> Result<Collection<Body>> {
        self.collection()
    }

    pub fn faces(&self) -> Result<Collection<Face>> {
        self.collection()
    }

    pub fn scenes(&self) -> Result<Collection<Scene>> {
        self.collection()
    }

    pub fn jobs(&self) -> Result<Collection<Job>> {
        self.collection()
    }
}

fn wait_until_healthy(backend: &dyn Backend, target: &str, config: &ConnectionConfig) -> Result<()> {
    // `None` when the timeout is too large to represent: wait forever.
    let deadline = Instant::now().checked_add(config.connect_timeout);
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let failure = match backend.health() {
            Ok(true) => {
                debug!(target = %target, attempts, "server ready");
                return Ok(());
            }
            Ok(false) => None,
            Err(e) => Some(e),
        };

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!(target = %target, attempts, "server not ready before deadline");
            return Err(match failure {
                Some(Error::TransportUnavailable { reason, .. }) => Error::TransportUnavailable {
                    target: target.to_string(),
                    reason,
                },
                _ => Error::Timeout {
                    target: target.to_string(),
                    after: config.connect_timeout,
                },
            });
        }
        thread::sleep(config.health_poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(timeout_ms: u64) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(timeout_ms),
            health_poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[test]
    fn unavailable_server_times_out() {
        let db = MemoryDatabase::new();
        db.set_available(false);
        let err = Connection::new(Arc::new(db), &fast_config(30)).err().unwrap();
        assert!(matches!(err, Error::Timeout { .. }), "{err}");
    }

    #[test]
    fn server_becoming_ready_is_picked_up() {
        let db = MemoryDatabase::new();
        db.set_available(false);
        let flip = db.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flip.set_available(true);
        });
        let conn = Connection::new(Arc::new(db), &fast_config(2_000)).unwrap();
        handle.join().unwrap();
        assert!(conn.healthy().unwrap());
    }

    #[test]
    fn huge_connect_timeout_means_no_deadline() {
        let config = ConnectionConfig {
            connect_timeout: Duration::MAX,
            health_poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let db = MemoryDatabase::new();
        db.set_available(false);
        let flip = db.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flip.set_available(true);
        });
        let conn = Connection::new(Arc::new(db), &config).unwrap();
        handle.join().unwrap();
        assert!(conn.healthy().unwrap());
    }

    #[test]
    fn same_collection_instance_per_kind() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let a = conn.spectrums().unwrap();
        let b = conn.clone().spectrums().unwrap();
        assert!(a.raw().same_as(b.raw()));
        assert!(!a.raw().same_as(conn.faces().unwrap().raw()));
    }

    #[test]
    fn closed_connection_refuses_collections() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let spectra = conn.spectrums().unwrap();
        conn.close();
        assert!(matches!(
            conn.scenes().err().unwrap(),
            Error::TransportUnavailable { .. }
        ));
        assert!(matches!(
            spectra.list().unwrap_err(),
            Error::TransportUnavailable { .. }
        ));
    }

    #[test]
    fn config_reads_milliseconds() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "port": 6000, "connect_timeout": 1500 }"#).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.connect_timeout, Duration::from_millis(1500));
        assert_eq!(config.rpc_timeout, Duration::from_secs(300));
        assert_eq!(config.target(), "localhost:6000");
    }
}
