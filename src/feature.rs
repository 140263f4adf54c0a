// MIT License
// Copyright 2023--present optirpc developers

//! Editable wrappers around stored messages.
//!
//! A [`Feature`] keeps a working copy of a message next to what was last
//! committed to the server. It is either a [`FeatureState::Draft`] that was
//! never stored (or was deleted), or [`FeatureState::Committed`] with its
//! link. A feature is *local* when it is a draft or when its working copy
//! differs from the committed copy; printing a local feature starts with
//! `local: ` so forgotten commits are visible.
//!
//! [`InstanceFeature`] pairs a template feature with the scene instance that
//! uses it.

use std::fmt;

use tracing::debug;
use uuid::Uuid;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::link::Link;
use crate::messages::{self, MaterialInstance, Message, Scene, VopTemplate};
use crate::resolver;
use crate::scene::SceneInstance;

/// Prefix printed in front of uncommitted features.
pub const LOCAL_PREFIX: &str = "local: ";

/// Metadata entry identifying a scene instance across renames.
pub const UNIQUE_ID: &str = "UniqueId";

#[derive(Debug, Clone)]
pub enum FeatureState<M: Message> {
    Draft {
        message: M,
    },
    Committed {
        link: Link<M>,
        /// Copy as of the last create, update or read.
        committed: M,
        working: M,
    },
}

/// Working copy of a message with its commit status.
#[derive(Debug, Clone)]
pub struct Feature<M: Message> {
    collection: Collection<M>,
    state: FeatureState<M>,
}

impl<M: Message> Feature<M> {
    /// New draft. Nothing is sent until [`commit`](Self::commit).
    pub fn new(collection: Collection<M>, message: M) -> Self {
        Self {
            collection,
            state: FeatureState::Draft { message },
        }
    }

    /// Feature for an already stored message.
    pub fn from_link(link: Link<M>) -> Result<Self> {
        let committed = link.get()?;
        Ok(Self {
            collection: link.collection().clone(),
            state: FeatureState::Committed {
                working: committed.clone(),
                committed,
                link,
            },
        })
    }

    pub fn state(&self) -> &FeatureState<M> {
        &self.state
    }

    pub fn message(&self) -> &M {
        match &self.state {
            FeatureState::Draft { message } => message,
            FeatureState::Committed { working, .. } => working,
        }
    }

    pub fn message_mut(&mut self) -> &mut M {
        match &mut self.state {
            FeatureState::Draft { message } => message,
            FeatureState::Committed { working, .. } => working,
        }
    }

    pub fn name(&self) -> &str {
        self.message().name()
    }

    pub fn link(&self) -> Option<&Link<M>> {
        match &self.state {
            FeatureState::Draft { .. } => None,
            FeatureState::Committed { link, .. } => Some(link),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.link().map(Link::key)
    }

    pub fn is_local(&self) -> bool {
        match &self.state {
            FeatureState::Draft { .. } => true,
            FeatureState::Committed {
                committed, working, ..
            } => committed != working,
        }
    }

    /// Create the message on first commit, overwrite it afterwards.
    pub fn commit(&mut self) -> Result<&Link<M>> {
        match &mut self.state {
            FeatureState::Draft { message } => {
                let link = self.collection.create(message)?;
                let working = std::mem::take(message);
                self.state = FeatureState::Committed {
                    link,
                    committed: working.clone(),
                    working,
                };
            }
            FeatureState::Committed {
                link,
                committed,
                working,
            } => {
                link.set(working)?;
                *committed = working.clone();
            }
        }
        match &self.state {
            FeatureState::Committed { link, .. } => Ok(link),
            FeatureState::Draft { .. } => Err(Error::DetachedLink { kind: M::KIND }),
        }
    }

    /// Drop local edits and reload the stored message. Drafts are kept.
    pub fn reset(&mut self) -> Result<()> {
        if let FeatureState::Committed {
            link,
            committed,
            working,
        } = &mut self.state
        {
            *committed = link.get()?;
            *working = committed.clone();
        }
        Ok(())
    }

    /// Delete the stored message; the feature becomes a draft of its
    /// working copy. Templates the message references are not touched.
    pub fn delete(&mut self) -> Result<()> {
        if let FeatureState::Committed { link, working, .. } = &mut self.state {
            link.delete()?;
            let message = std::mem::take(working);
            self.state = FeatureState::Draft { message };
        }
        Ok(())
    }
}

impl<M: Message> fmt::Display for Feature<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            f.write_str(LOCAL_PREFIX)?;
        }
        let text = messages::to_pretty_string(self.message()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

fn unique_id_of<I: SceneInstance>(instance: &I) -> Option<&str> {
    instance.metadata().get(UNIQUE_ID).map(String::as_str)
}

/// A template together with the scene instance referencing it, e.g. a
/// source template and the source instance placing it in the scene.
///
/// The instance is found in the scene through its [`UNIQUE_ID`] metadata
/// entry, so renaming it locally is safe. Materials may also carry a volume
/// optical property, committed, reset and deleted along with the surface one.
#[derive(Debug, Clone)]
pub struct InstanceFeature<I: SceneInstance> {
    template: Feature<I::Template>,
    /// Cleared for materials made of a volume property only.
    uses_template: bool,
    volume: Option<Feature<VopTemplate>>,
    volumes: Option<Collection<VopTemplate>>,
    scene: Link<Scene>,
    instance: I,
    committed_instance: Option<I>,
}

impl<I: SceneInstance> InstanceFeature<I> {
    /// New draft: template and instance both named `name`.
    pub fn new(scene: Link<Scene>, templates: Collection<I::Template>, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut template = I::Template::default();
        template.set_name(name.clone());
        let mut instance = I::default();
        instance.set_name(name);
        instance
            .metadata_mut()
            .insert(UNIQUE_ID.to_string(), Uuid::new_v4().to_string());
        Self {
            template: Feature::new(templates, template),
            uses_template: true,
            volume: None,
            volumes: None,
            scene,
            instance,
            committed_instance: None,
        }
    }

    /// Feature for an instance already in the stored scene.
    pub fn from_instance(
        scene: Link<Scene>,
        templates: &Collection<I::Template>,
        instance: I,
    ) -> Result<Self> {
        let template = match instance.template_key() {
            Some(key) => Feature::from_link(templates.link(key))?,
            None => Feature::new(templates.clone(), I::Template::default()),
        };
        let uses_template = instance.template_key().is_some() || instance.volume_key().is_none();
        let committed_instance = Some(instance.clone());
        let mut instance = instance;
        if unique_id_of(&instance).is_none() {
            instance
                .metadata_mut()
                .insert(UNIQUE_ID.to_string(), Uuid::new_v4().to_string());
        }
        Ok(Self {
            template,
            uses_template,
            volume: None,
            volumes: None,
            scene,
            instance,
            committed_instance,
        })
    }

    /// Collection holding volume optical properties. Loads the one the
    /// instance already references.
    pub fn with_volumes(mut self, volumes: Collection<VopTemplate>) -> Result<Self> {
        if let Some(key) = self.instance.volume_key() {
            self.volume = Some(Feature::from_link(volumes.link(key))?);
        }
        self.volumes = Some(volumes);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }

    pub fn unique_id(&self) -> &str {
        unique_id_of(&self.instance).unwrap_or_default()
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut I {
        &mut self.instance
    }

    pub fn template(&self) -> &Feature<I::Template> {
        &self.template
    }

    /// Editing the template puts it back in use.
    pub fn template_mut(&mut self) -> &mut I::Template {
        self.uses_template = true;
        self.template.message_mut()
    }

    pub fn scene(&self) -> &Link<Scene> {
        &self.scene
    }

    pub fn is_local(&self) -> bool {
        (self.uses_template && self.template.is_local())
            || self.volume.as_ref().is_some_and(Feature::is_local)
            || self.committed_instance.as_ref() != Some(&self.instance)
    }

    /// Position of this instance in `list`: same unique id, or the same
    /// name for instances stored without one.
    fn position(&self, list: &[I]) -> Option<usize> {
        let id = unique_id_of(&self.instance);
        list.iter()
            .position(|i| id.is_some() && unique_id_of(i) == id)
            .or_else(|| {
                let previous = self.committed_instance.as_ref()?;
                list.iter()
                    .position(|i| unique_id_of(i).is_none() && i.name() == previous.name())
            })
    }

    /// Commit the templates, point the instance at them and store the
    /// instance in the scene (appended the first time, replaced after).
    pub fn commit(&mut self) -> Result<()> {
        let mut scene = self.scene.get()?;
        let position = self.position(I::list(&scene));
        let clash = I::list(&scene)
            .iter()
            .enumerate()
            .any(|(i, other)| Some(i) != position && other.name() == self.instance.name());
        if clash {
            return Err(Error::DuplicateInstanceName {
                list: I::LIST,
                name: self.instance.name().to_string(),
            });
        }

        if let Some(volume) = self.volume.as_mut() {
            let key = volume.commit()?.key().to_string();
            self.instance.attach_volume(&key);
        }
        if self.uses_template {
            let key = self.template.commit()?.key().to_string();
            self.instance.attach_template(&key);
        }

        let list = I::list_mut(&mut scene);
        match position {
            Some(i) => list[i] = self.instance.clone(),
            None => list.push(self.instance.clone()),
        }
        self.scene.set(&scene)?;
        self.committed_instance = Some(self.instance.clone());
        debug!(list = I::LIST, name = %self.name(), "instance committed");
        Ok(())
    }

    /// Reload the templates and the stored instance.
    pub fn reset(&mut self) -> Result<()> {
        self.template.reset()?;
        if let Some(volume) = self.volume.as_mut() {
            volume.reset()?;
        }
        let scene = self.scene.get()?;
        if let Some(i) = self.position(I::list(&scene)) {
            let stored = I::list(&scene)[i].clone();
            self.instance = stored.clone();
            self.committed_instance = Some(stored);
        }
        Ok(())
    }

    /// Remove the instance from the scene and delete its templates. Spectra,
    /// intensity templates and other entities the templates reference stay.
    pub fn delete(&mut self) -> Result<()> {
        let mut scene = self.scene.get()?;
        if let Some(i) = self.position(I::list(&scene)) {
            I::list_mut(&mut scene).remove(i);
            self.scene.set(&scene)?;
        }
        if let Some(volume) = self.volume.as_mut() {
            volume.delete()?;
        }
        self.instance.detach_volume();
        self.template.delete()?;
        self.instance.detach_template();
        self.committed_instance = None;
        Ok(())
    }
}

impl InstanceFeature<MaterialInstance> {
    pub fn vop(&self) -> Option<&Feature<VopTemplate>> {
        self.volume.as_ref()
    }

    pub fn vop_mut(&mut self) -> Option<&mut VopTemplate> {
        self.volume.as_mut().map(Feature::message_mut)
    }

    /// Give the material a volume optical property, stored on the next
    /// commit. Replaces the working copy of an existing one.
    ///
    /// Fails with [`Error::DetachedLink`] when the feature was built
    /// without a VOP collection (see [`with_volumes`](Self::with_volumes)).
    pub fn set_vop(&mut self, vop: VopTemplate) -> Result<()> {
        if let Some(volume) = self.volume.as_mut() {
            *volume.message_mut() = vop;
            return Ok(());
        }
        let volumes = self.volumes.clone().ok_or(Error::DetachedLink {
            kind: VopTemplate::KIND,
        })?;
        self.volume = Some(Feature::new(volumes, vop));
        Ok(())
    }

    /// Make this a volume-only material: delete the stored SOP template
    /// and stop referencing one.
    pub fn without_sop(&mut self) -> Result<()> {
        self.template.delete()?;
        self.instance.detach_template();
        self.uses_template = false;
        Ok(())
    }
}

impl<I: SceneInstance> fmt::Display for InstanceFeature<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            f.write_str(LOCAL_PREFIX)?;
        }
        let mut view = serde_json::json!({
            "instance": serde_json::to_value(&self.instance).map_err(|_| fmt::Error)?,
            "template": serde_json::to_value(self.template.message()).map_err(|_| fmt::Error)?,
        });
        if let Some(volume) = &self.volume {
            view["vop"] = serde_json::to_value(volume.message()).map_err(|_| fmt::Error)?;
        }
        let text = resolver::to_pretty_string(&view).map_err(|_| fmt::Error)?;
        write!(f, "{} '{}'\n{}", I::LIST, self.name(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::memory::MemoryDatabase;
    use crate::messages::{SopTemplate, SourceInstance, SourceTemplate, Spectrum};

    fn conn() -> Connection {
        Connection::memory(MemoryDatabase::new()).unwrap()
    }

    #[test]
    fn draft_prints_local_prefix_until_committed() {
        let conn = conn();
        let mut feature = Feature::new(conn.sop_templates().unwrap(), SopTemplate::mirror("m", 50.0));
        assert!(feature.is_local());
        assert!(feature.to_string().starts_with("local: optirpc.sop.v1.SOPTemplate"));

        feature.commit().unwrap();
        assert!(!feature.is_local());
        assert!(feature.to_string().starts_with("optirpc.sop.v1.SOPTemplate"));

        feature.message_mut().description = "edited".into();
        assert!(feature.is_local());
        assert!(feature.to_string().starts_with(LOCAL_PREFIX));
    }

    #[test]
    fn second_commit_updates_in_place() {
        let conn = conn();
        let sops = conn.sop_templates().unwrap();
        let mut feature = Feature::new(sops.clone(), SopTemplate::mirror("m", 50.0));
        let key = feature.commit().unwrap().key().to_string();
        *feature.message_mut() = SopTemplate::mirror("m", 60.0);
        assert_eq!(feature.commit().unwrap().key(), key);
        assert_eq!(sops.list().unwrap().len(), 1);
        assert_eq!(sops.link(key).get().unwrap(), SopTemplate::mirror("m", 60.0));
    }

    #[test]
    fn reset_discards_local_edits() {
        let conn = conn();
        let mut feature = Feature::new(conn.spectrums().unwrap(), Spectrum::blackbody("bb", 3000.0));
        feature.commit().unwrap();
        feature.message_mut().name = "renamed".into();
        feature.reset().unwrap();
        assert_eq!(feature.name(), "bb");
        assert!(!feature.is_local());
    }

    #[test]
    fn delete_detaches_into_a_draft() {
        let conn = conn();
        let sops = conn.sop_templates().unwrap();
        let mut feature = Feature::new(sops.clone(), SopTemplate::mirror("m", 50.0));
        feature.commit().unwrap();
        feature.delete().unwrap();
        assert!(feature.link().is_none());
        assert!(feature.is_local());
        assert_eq!(feature.name(), "m");
        assert!(sops.list().unwrap().is_empty());
    }

    #[test]
    fn instance_commit_writes_the_scene_and_delete_keeps_shared_templates() {
        let conn = conn();
        let spectrum = conn
            .spectrums()
            .unwrap()
            .create(&Spectrum::blackbody("bb", 2856.0))
            .unwrap();
        let scene = conn.scenes().unwrap().create(&Scene::named("s")).unwrap();
        let mut source: InstanceFeature<SourceInstance> =
            InstanceFeature::new(scene.clone(), conn.source_templates().unwrap(), "Light.1");
        *source.template_mut() = SourceTemplate::surface("Light.1", 100.0, "", spectrum.key());
        source.commit().unwrap();
        assert!(!source.is_local());

        let stored = scene.get().unwrap();
        assert_eq!(stored.sources.len(), 1);
        assert_eq!(stored.sources[0].source_guid, source.template().key().unwrap());
        assert_eq!(
            stored.sources[0].metadata.get(UNIQUE_ID).map(String::as_str),
            Some(source.unique_id())
        );

        source.instance_mut().name = "Light.renamed".into();
        source.commit().unwrap();
        assert_eq!(scene.get().unwrap().sources.len(), 1);
        assert_eq!(scene.get().unwrap().sources[0].name, "Light.renamed");

        source.delete().unwrap();
        assert!(scene.get().unwrap().sources.is_empty());
        assert!(conn.source_templates().unwrap().list().unwrap().is_empty());
        assert_eq!(spectrum.get().unwrap().name, "bb");
    }

    #[test]
    fn instance_name_clash_is_refused_before_anything_is_stored() {
        let conn = conn();
        let scene = conn.scenes().unwrap().create(&Scene::named("s")).unwrap();
        let templates = conn.source_templates().unwrap();
        let mut first: InstanceFeature<SourceInstance> =
            InstanceFeature::new(scene.clone(), templates.clone(), "Light.1");
        first.commit().unwrap();
        let mut second: InstanceFeature<SourceInstance> =
            InstanceFeature::new(scene.clone(), templates.clone(), "Light.1");
        assert!(matches!(
            second.commit().unwrap_err(),
            Error::DuplicateInstanceName { list: "sources", .. }
        ));
        assert_eq!(templates.list().unwrap().len(), 1);
        assert!(second.to_string().starts_with("local: sources 'Light.1'"));
    }
}
