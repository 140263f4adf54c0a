// MIT License
// Copyright 2023--present optirpc developers

//! Handles to server-resident entities.
//!
//! A link pairs a collection with a key and forwards every call to that
//! collection; nothing is cached. Deleting through a link clears its key, so
//! any later use fails with [`Error::DetachedLink`] without a round trip.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::backend::Backend;
use crate::collection::{Collection, RawCollection};
use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::messages::{self, Message};
use crate::resolver;

/// Typed link to one `M` stored in a collection.
pub struct Link<M> {
    collection: Collection<M>,
    key: String,
}

impl<M: Message> Link<M> {
    pub(crate) fn new(collection: Collection<M>, key: String) -> Self {
        Self { collection, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> EntityKind {
        M::KIND
    }

    pub fn collection(&self) -> &Collection<M> {
        &self.collection
    }

    /// `true` once the link has been deleted.
    pub fn is_detached(&self) -> bool {
        self.key.is_empty()
    }

    pub fn get(&self) -> Result<M> {
        self.collection.read(self)
    }

    pub fn set(&self, message: &M) -> Result<()> {
        self.collection.update(self, message)
    }

    /// Delete the entity and clear the key.
    pub fn delete(&mut self) -> Result<()> {
        self.collection.delete(self)?;
        self.key.clear();
        Ok(())
    }

    /// Full message name followed by the stored message as indented JSON.
    pub fn describe(&self) -> Result<String> {
        messages::to_pretty_string(&self.get()?)
    }

    /// Backend for actions beyond CRUD, such as job control.
    pub(crate) fn backend(&self) -> Result<&dyn Backend> {
        if self.is_detached() {
            return Err(Error::DetachedLink { kind: M::KIND });
        }
        self.collection.raw().backend()
    }

    /// Untyped link with the same collection and key.
    pub fn erase(&self) -> AnyLink {
        AnyLink::new(self.collection.raw().clone(), self.key.clone())
    }

    pub(crate) fn into_key(self) -> String {
        self.key
    }
}

impl<M> Clone for Link<M> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            key: self.key.clone(),
        }
    }
}

impl<M: Message> PartialEq for Link<M> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.collection.raw().same_as(other.collection.raw())
    }
}

impl<M: Message> Eq for Link<M> {}

impl<M: Message> Hash for Link<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.collection.raw().identity().hash(state);
        self.key.hash(state);
    }
}

impl<M: Message> fmt::Debug for Link<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("kind", &M::KIND)
            .field("key", &self.key)
            .finish()
    }
}

/// Link whose message type is only known at run time, as returned by the
/// [`registry`](crate::registry).
#[derive(Clone)]
pub struct AnyLink {
    collection: RawCollection,
    key: String,
}

impl AnyLink {
    pub(crate) fn new(collection: RawCollection, key: String) -> Self {
        Self { collection, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> EntityKind {
        self.collection.kind()
    }

    pub fn collection(&self) -> &RawCollection {
        &self.collection
    }

    pub fn is_detached(&self) -> bool {
        self.key.is_empty()
    }

    pub fn get(&self) -> Result<Value> {
        self.collection.read(self)
    }

    pub fn set(&self, payload: Value) -> Result<()> {
        self.collection.update(self, payload)
    }

    pub fn delete(&mut self) -> Result<()> {
        self.collection.delete(self)?;
        self.key.clear();
        Ok(())
    }

    pub fn describe(&self) -> Result<String> {
        Ok(format!(
            "{}\n{}",
            self.kind().full_name(),
            resolver::to_pretty_string(&self.get()?)?
        ))
    }

    /// Typed link, if this link's collection holds `M`.
    pub fn downcast<M: Message>(self) -> Result<Link<M>> {
        if self.kind() != M::KIND {
            return Err(Error::WrongCollection {
                expected: M::KIND,
                found: self.kind(),
            });
        }
        Ok(Link::new(Collection::new(self.collection), self.key))
    }

    pub(crate) fn into_key(self) -> String {
        self.key
    }
}

impl PartialEq for AnyLink {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.collection.same_as(&other.collection)
    }
}

impl Eq for AnyLink {}

impl Hash for AnyLink {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.collection.identity().hash(state);
        self.key.hash(state);
    }
}

impl fmt::Debug for AnyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyLink")
            .field("kind", &self.kind())
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::connection::Connection;
    use crate::memory::MemoryDatabase;
    use crate::messages::{SopTemplate, Spectrum};

    #[test]
    fn delete_clears_the_key_and_blocks_further_use() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let mut link = conn
            .sop_templates()
            .unwrap()
            .create(&SopTemplate::mirror("m", 80.0))
            .unwrap();
        link.delete().unwrap();
        assert!(link.is_detached());
        assert_eq!(link.key(), "");
        assert!(matches!(link.get().unwrap_err(), Error::DetachedLink { .. }));
        assert!(matches!(
            link.set(&SopTemplate::mirror("m", 10.0)).unwrap_err(),
            Error::DetachedLink { .. }
        ));
        assert!(conn.sop_templates().unwrap().list().unwrap().is_empty());
    }

    #[test]
    fn stale_copy_of_a_deleted_link_sees_not_found() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let mut link = conn
            .spectrums()
            .unwrap()
            .create(&Spectrum::blackbody("bb", 5000.0))
            .unwrap();
        let stale = link.clone();
        link.delete().unwrap();
        assert!(stale.get().unwrap_err().is_not_found());
    }

    #[test]
    fn links_compare_by_collection_instance_and_key() {
        let a = Connection::memory(MemoryDatabase::new()).unwrap();
        let b = Connection::memory(MemoryDatabase::new()).unwrap();
        let on_a = a.spectrums().unwrap().link("k");
        let on_b = b.spectrums().unwrap().link("k");
        assert_eq!(on_a, a.spectrums().unwrap().link("k"));
        assert_ne!(on_a, on_b);

        let set: HashSet<_> = [on_a.clone(), on_a.clone(), on_b].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(on_a.erase(), a.raw_collection(EntityKind::Spectrum).unwrap().link("k"));
    }

    #[test]
    fn downcast_checks_the_kind() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let any = conn.raw_collection(EntityKind::Spectrum).unwrap().link("k");
        assert!(any.clone().downcast::<Spectrum>().is_ok());
        assert!(matches!(
            any.downcast::<SopTemplate>().unwrap_err(),
            Error::WrongCollection { .. }
        ));
    }

    #[test]
    fn describe_prints_full_name_then_json() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let link = conn
            .sop_templates()
            .unwrap()
            .create(&SopTemplate::mirror("Mirror_90", 90.0))
            .unwrap();
        let text = link.describe().unwrap();
        assert!(text.starts_with("optirpc.sop.v1.SOPTemplate\n{"));
        assert!(text.contains("\"reflectance\": 90.0"));
        assert!(link
            .erase()
            .describe()
            .unwrap()
            .starts_with("optirpc.sop.v1.SOPTemplate\n"));
    }
}
