// MIT License
// Copyright 2023--present optirpc developers

//! Key to collection resolution.
//!
//! Keys carry no type tag, so finding the owner of a bare key means asking
//! collections one after the other. [`ProbingRegistry`] does this in a fixed
//! order and remembers the answer in a memo shared by every registry of the
//! connection. Deleting through the connection drops the key from the memo,
//! and a memo hit that no longer reads back is probed again. Other strategies
//! (a tagged key format, a server-side lookup) plug in through
//! [`KeyResolver`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, trace};

use crate::collection::RawCollection;
use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::link::AnyLink;

/// Finds the collection holding a key.
pub trait KeyResolver: Send + Sync {
    fn lookup(&self, key: &str) -> Result<AnyLink>;

    /// Lookup followed by a read. Implementations that already read the
    /// entity while looking it up should return that payload.
    fn fetch(&self, key: &str) -> Result<(AnyLink, Value)> {
        let link = self.lookup(key)?;
        let value = link.get()?;
        Ok((link, value))
    }
}

/// Probe order used unless [`ProbingRegistry::with_order`] says otherwise:
/// optical properties first since they are the most referenced, then the
/// remaining templates, geometry, scenes and jobs.
pub const DEFAULT_PROBE_ORDER: [EntityKind; 12] = [
    EntityKind::SopTemplate,
    EntityKind::VopTemplate,
    EntityKind::Spectrum,
    EntityKind::IntensityTemplate,
    EntityKind::SourceTemplate,
    EntityKind::SensorTemplate,
    EntityKind::SimulationTemplate,
    EntityKind::Part,
    EntityKind::Body,
    EntityKind::Face,
    EntityKind::Scene,
    EntityKind::Job,
];

/// Owner of each key resolved so far, shared per connection.
#[derive(Default)]
pub(crate) struct KeyMemo {
    owners: Mutex<HashMap<String, EntityKind>>,
}

impl KeyMemo {
    fn guard(&self) -> MutexGuard<'_, HashMap<String, EntityKind>> {
        self.owners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self, key: &str) -> Option<EntityKind> {
        self.guard().get(key).copied()
    }

    pub(crate) fn insert(&self, key: &str, kind: EntityKind) {
        self.guard().insert(key.to_string(), kind);
    }

    pub(crate) fn forget(&self, key: &str) {
        self.guard().remove(key);
    }

    pub(crate) fn clear(&self) {
        self.guard().clear();
    }
}

/// Resolver that reads the key from each collection in turn.
///
/// One read per candidate kind in the worst case; the kind that answered is
/// memoized so later lookups of the same key cost nothing.
pub struct ProbingRegistry {
    collections: [RawCollection; 12],
    order: Vec<EntityKind>,
    memo: Arc<KeyMemo>,
}

impl ProbingRegistry {
    pub(crate) fn new(collections: [RawCollection; 12], memo: Arc<KeyMemo>) -> Self {
        Self {
            collections,
            order: DEFAULT_PROBE_ORDER.to_vec(),
            memo,
        }
    }

    /// Same collections and memo, probed in `order`. Kinds left out are
    /// never probed nor answered from the memo.
    pub fn with_order(&self, order: &[EntityKind]) -> Self {
        let mut seen = Vec::with_capacity(order.len());
        for kind in order {
            if !seen.contains(kind) {
                seen.push(*kind);
            }
        }
        Self {
            collections: self.collections.clone(),
            order: seen,
            memo: self.memo.clone(),
        }
    }

    pub fn order(&self) -> &[EntityKind] {
        &self.order
    }

    /// Drop the memoized owner of `key`. Deletes made through this
    /// connection do it already.
    pub fn forget(&self, key: &str) {
        self.memo.forget(key);
    }

    pub fn clear(&self) {
        self.memo.clear();
    }

    /// Memoized owner of `key`, if it was looked up before and its kind is
    /// part of this registry's order.
    pub fn cached_kind(&self, key: &str) -> Option<EntityKind> {
        self.memo.get(key).filter(|kind| self.order.contains(kind))
    }

    fn collection(&self, kind: EntityKind) -> &RawCollection {
        &self.collections[kind.index()]
    }

    fn probe(&self, key: &str) -> Result<(AnyLink, Value)> {
        if key.is_empty() {
            return Err(Error::KeyNotFoundInAnyCollection { key: String::new() });
        }
        for &kind in &self.order {
            let collection = self.collection(kind);
            match collection.read_key(key) {
                Ok(value) => {
                    debug!(key = %key, kind = %kind, "key resolved");
                    self.memo.insert(key, kind);
                    return Ok((collection.link(key), value));
                }
                Err(e) if e.is_not_found() => trace!(key = %key, kind = %kind, "not here"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::KeyNotFoundInAnyCollection {
            key: key.to_string(),
        })
    }
}

impl KeyResolver for ProbingRegistry {
    fn lookup(&self, key: &str) -> Result<AnyLink> {
        if let Some(kind) = self.cached_kind(key) {
            return Ok(self.collection(kind).link(key));
        }
        self.probe(key).map(|(link, _)| link)
    }

    fn fetch(&self, key: &str) -> Result<(AnyLink, Value)> {
        if let Some(kind) = self.cached_kind(key) {
            let link = self.collection(kind).link(key);
            match link.get() {
                Ok(value) => return Ok((link, value)),
                // deleted behind this connection's back
                Err(e) if e.is_not_found() => self.memo.forget(key),
                Err(e) => return Err(e),
            }
        }
        self.probe(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::memory::MemoryDatabase;
    use crate::messages::{Scene, SopTemplate, Spectrum};
    use crate::resolver::Resolver;
    use serde_json::json;

    #[test]
    fn lookup_finds_the_owning_collection() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let scene = conn.scenes().unwrap().create(&Scene::named("s")).unwrap();
        let found = conn.registry().unwrap().lookup(scene.key()).unwrap();
        assert_eq!(found.kind(), EntityKind::Scene);
        assert_eq!(found.downcast::<Scene>().unwrap(), scene);
    }

    #[test]
    fn unknown_key_is_reported() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let err = conn.registry().unwrap().lookup("missing").unwrap_err();
        assert!(matches!(err, Error::KeyNotFoundInAnyCollection { ref key } if key == "missing"));
    }

    #[test]
    fn probes_follow_the_configured_order_and_are_memoized() {
        let db = MemoryDatabase::new();
        let conn = Connection::memory(db.clone()).unwrap();
        let spectrum = conn
            .spectrums()
            .unwrap()
            .create(&Spectrum::monochromatic("s", 500.0))
            .unwrap();
        let registry = conn.registry().unwrap();

        let before = db.read_count();
        registry.lookup(spectrum.key()).unwrap();
        // SOP, VOP, then spectrum
        assert_eq!(db.read_count() - before, 3);

        let before = db.read_count();
        registry.lookup(spectrum.key()).unwrap();
        assert_eq!(db.read_count(), before);
        assert_eq!(registry.cached_kind(spectrum.key()), Some(EntityKind::Spectrum));

        registry.forget(spectrum.key());
        assert_eq!(registry.cached_kind(spectrum.key()), None);

        let spectra_first = registry.with_order(&[EntityKind::Spectrum, EntityKind::SopTemplate]);
        let before = db.read_count();
        spectra_first.lookup(spectrum.key()).unwrap();
        assert_eq!(db.read_count() - before, 1);
    }

    #[test]
    fn deleted_key_is_no_longer_found() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let mut spectrum = conn
            .spectrums()
            .unwrap()
            .create(&Spectrum::monochromatic("s", 500.0))
            .unwrap();
        let key = spectrum.key().to_string();
        let registry = conn.registry().unwrap();
        assert_eq!(registry.lookup(&key).unwrap().kind(), EntityKind::Spectrum);

        spectrum.delete().unwrap();
        assert_eq!(registry.cached_kind(&key), None);
        assert!(matches!(
            registry.lookup(&key).unwrap_err(),
            Error::KeyNotFoundInAnyCollection { key: ref k } if *k == key
        ));

        let err = Resolver::new(registry)
            .expand(&json!({ "spectrum_guid": key }))
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFoundInAnyCollection { .. }), "{err}");
    }

    #[test]
    fn fetch_rechecks_keys_deleted_elsewhere() {
        let db = MemoryDatabase::new();
        let conn = Connection::memory(db.clone()).unwrap();
        let other = Connection::memory(db).unwrap();
        let spectrum = conn
            .spectrums()
            .unwrap()
            .create(&Spectrum::monochromatic("s", 500.0))
            .unwrap();
        let registry = conn.registry().unwrap();
        registry.lookup(spectrum.key()).unwrap();

        let mut stale = other.spectrums().unwrap().link(spectrum.key());
        stale.delete().unwrap();
        assert!(matches!(
            registry.fetch(spectrum.key()).unwrap_err(),
            Error::KeyNotFoundInAnyCollection { .. }
        ));
        assert_eq!(registry.cached_kind(spectrum.key()), None);
    }

    #[test]
    fn ordered_views_share_the_memo_within_their_kinds() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let sop = conn
            .sop_templates()
            .unwrap()
            .create(&SopTemplate::mirror("m", 50.0))
            .unwrap();
        let registry = conn.registry().unwrap();
        registry.lookup(sop.key()).unwrap();

        let sops_only = registry.with_order(&[EntityKind::SopTemplate]);
        assert_eq!(sops_only.cached_kind(sop.key()), Some(EntityKind::SopTemplate));
        let scenes_only = registry.with_order(&[EntityKind::Scene]);
        assert_eq!(scenes_only.cached_kind(sop.key()), None);
    }

    #[test]
    fn kinds_outside_the_order_are_not_probed() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let sop = conn
            .sop_templates()
            .unwrap()
            .create(&SopTemplate::mirror("m", 50.0))
            .unwrap();
        let registry = conn.registry().unwrap().with_order(&[EntityKind::Scene]);
        assert!(matches!(
            registry.lookup(sop.key()).unwrap_err(),
            Error::KeyNotFoundInAnyCollection { .. }
        ));
    }

    #[test]
    fn transport_errors_stop_the_probe() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let registry = conn.registry().unwrap();
        conn.close();
        assert!(matches!(
            registry.lookup("k").unwrap_err(),
            Error::TransportUnavailable { .. }
        ));
    }
}
