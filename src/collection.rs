// MIT License
// Copyright 2023--present optirpc developers

//! Per-kind CRUD stubs.
//!
//! A collection is a stateless proxy: nothing is cached, every call is one
//! round trip. Collections compare by identity (the connection hands out one
//! instance per kind), and every operation taking a link first checks that
//! the link was produced by this very instance.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::backend::Backend;
use crate::connection::Channel;
use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::link::{AnyLink, Link};
use crate::messages::Message;

struct CollectionCore {
    kind: EntityKind,
    channel: Arc<Channel>,
}

/// Untyped collection over JSON payloads.
#[derive(Clone)]
pub struct RawCollection {
    core: Arc<CollectionCore>,
}

impl RawCollection {
    pub(crate) fn new(kind: EntityKind, channel: Arc<Channel>) -> Self {
        Self {
            core: Arc::new(CollectionCore { kind, channel }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.core.kind
    }

    /// Object identity.
    pub fn same_as(&self, other: &RawCollection) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.core) as usize
    }

    pub(crate) fn backend(&self) -> Result<&dyn Backend> {
        self.core.channel.backend()
    }

    /// Link to an existing key. No round trip.
    pub fn link(&self, key: impl Into<String>) -> AnyLink {
        AnyLink::new(self.clone(), key.into())
    }

    /// Reject links produced elsewhere, then links without a key.
    pub(crate) fn check(&self, owner: &RawCollection, key: &str) -> Result<()> {
        if !self.same_as(owner) {
            return Err(Error::WrongCollection {
                expected: self.kind(),
                found: owner.kind(),
            });
        }
        if key.is_empty() {
            return Err(Error::DetachedLink { kind: self.kind() });
        }
        Ok(())
    }

    pub fn create(&self, payload: Value) -> Result<AnyLink> {
        let key = self.backend()?.create(self.kind(), payload)?;
        debug!(kind = %self.kind(), key = %key, "created");
        Ok(self.link(key))
    }

    pub fn read(&self, link: &AnyLink) -> Result<Value> {
        self.check(link.collection(), link.key())?;
        self.read_key(link.key())
    }

    /// Read by bare key, as done while probing for a key's owner.
    pub fn read_key(&self, key: &str) -> Result<Value> {
        if key.is_empty() {
            return Err(Error::DetachedLink { kind: self.kind() });
        }
        trace!(kind = %self.kind(), key = %key, "read");
        self.backend()?.read(self.kind(), key)
    }

    pub fn update(&self, link: &AnyLink, payload: Value) -> Result<()> {
        self.check(link.collection(), link.key())?;
        self.backend()?.update(self.kind(), link.key(), payload)?;
        debug!(kind = %self.kind(), key = %link.key(), "updated");
        Ok(())
    }

    /// Delete the entity. Entities it references are left alone.
    pub fn delete(&self, link: &AnyLink) -> Result<()> {
        self.check(link.collection(), link.key())?;
        self.backend()?.delete(self.kind(), link.key())?;
        self.core.channel.forget(link.key());
        debug!(kind = %self.kind(), key = %link.key(), "deleted");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<AnyLink>> {
        let keys = self.backend()?.list(self.kind())?;
        Ok(keys.into_iter().map(|k| self.link(k)).collect())
    }
}

impl fmt::Debug for RawCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCollection")
            .field("kind", &self.kind())
            .field("target", &self.core.channel.target())
            .finish()
    }
}

/// Typed CRUD stub for messages of type `M`.
pub struct Collection<M> {
    raw: RawCollection,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for Collection<M> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Collection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl<M: Message> Collection<M> {
    pub(crate) fn new(raw: RawCollection) -> Self {
        debug_assert_eq!(raw.kind(), M::KIND);
        Self {
            raw,
            _message: PhantomData,
        }
    }

    /// Untyped view sharing this collection's identity.
    pub fn raw(&self) -> &RawCollection {
        &self.raw
    }

    pub fn kind(&self) -> EntityKind {
        M::KIND
    }

    /// Link to an existing key. No round trip.
    pub fn link(&self, key: impl Into<String>) -> Link<M> {
        Link::new(self.clone(), key.into())
    }

    /// Store `message` and return a link to the new key. Server-side
    /// validation failures come back as [`Error::RemoteRejected`].
    pub fn create(&self, message: &M) -> Result<Link<M>> {
        let link = self.raw.create(serde_json::to_value(message)?)?;
        Ok(self.link(link.into_key()))
    }

    pub fn read(&self, link: &Link<M>) -> Result<M> {
        self.raw.check(link.collection().raw(), link.key())?;
        let value = self.raw.read_key(link.key())?;
        Ok(serde_json::from_value(value)?)
    }

    /// Overwrite the stored message. Last writer wins.
    pub fn update(&self, link: &Link<M>, message: &M) -> Result<()> {
        self.raw.check(link.collection().raw(), link.key())?;
        self.raw
            .backend()?
            .update(M::KIND, link.key(), serde_json::to_value(message)?)?;
        debug!(kind = %M::KIND, key = %link.key(), "updated");
        Ok(())
    }

    pub fn delete(&self, link: &Link<M>) -> Result<()> {
        self.raw.check(link.collection().raw(), link.key())?;
        self.raw.backend()?.delete(M::KIND, link.key())?;
        self.raw.core.channel.forget(link.key());
        debug!(kind = %M::KIND, key = %link.key(), "deleted");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Link<M>>> {
        let keys = self.raw.backend()?.list(M::KIND)?;
        Ok(keys.into_iter().map(|k| self.link(k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::memory::MemoryDatabase;
    use crate::messages::{Spectrum, SopTemplate};

    fn conn() -> Connection {
        Connection::memory(MemoryDatabase::new()).unwrap()
    }

    #[test]
    fn create_read_round_trip() {
        let spectra = conn().spectrums().unwrap();
        let original = Spectrum::monochromatic("green", 555.0);
        let link = spectra.create(&original).unwrap();
        assert!(!link.key().is_empty());
        assert_eq!(spectra.read(&link).unwrap(), original);
    }

    #[test]
    fn list_returns_every_key_in_creation_order() {
        let sops = conn().sop_templates().unwrap();
        let a = sops.create(&SopTemplate::mirror("a", 10.0)).unwrap();
        let b = sops.create(&SopTemplate::mirror("b", 20.0)).unwrap();
        assert_eq!(sops.list().unwrap(), vec![a, b]);
    }

    #[test]
    fn link_from_another_connection_is_rejected_locally() {
        let first = conn();
        let second = conn();
        let link = first
            .spectrums()
            .unwrap()
            .create(&Spectrum::blackbody("bb", 3000.0))
            .unwrap();
        let other = second.spectrums().unwrap();
        assert!(matches!(
            other.read(&link).unwrap_err(),
            Error::WrongCollection { .. }
        ));
        assert!(matches!(
            other.update(&link, &Spectrum::default()).unwrap_err(),
            Error::WrongCollection { .. }
        ));
        assert!(matches!(
            other.delete(&link).unwrap_err(),
            Error::WrongCollection { .. }
        ));
        // untouched on the owning side
        assert_eq!(link.get().unwrap().name, "bb");
    }

    #[test]
    fn raw_link_of_another_kind_is_rejected() {
        let conn = conn();
        let scene = conn.raw_collection(EntityKind::Scene).unwrap();
        let spectra = conn.raw_collection(EntityKind::Spectrum).unwrap();
        let link = scene.create(serde_json::json!({ "name": "s" })).unwrap();
        match spectra.read(&link).unwrap_err() {
            Error::WrongCollection { expected, found } => {
                assert_eq!(expected, EntityKind::Spectrum);
                assert_eq!(found, EntityKind::Scene);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_key_is_not_found() {
        let spectra = conn().spectrums().unwrap();
        let err = spectra.read(&spectra.link("nope")).unwrap_err();
        assert!(err.is_not_found());
    }
}
