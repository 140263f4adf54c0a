// MIT License
// Copyright 2023--present optirpc developers

//! A scene on the server plus an index of what it contains.

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::Result;
use crate::feature::InstanceFeature;
use crate::kind::EntityKind;
use crate::link::Link;
use crate::messages::{
    Job, JobProperties, MaterialInstance, Message, Part, Scene, SensorInstance,
    SimulationInstance, SourceInstance,
};
use crate::resolver::{self, Resolver};
use crate::scene::SceneInstance;

/// One entry of a project's feature index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEntry {
    /// Kind of the referenced entity: the template kind for instances, or
    /// [`EntityKind::VopTemplate`] for volume-only materials.
    pub kind: EntityKind,
    pub name: String,
    /// Empty when the instance has no template yet.
    pub key: String,
}

pub struct Project {
    connection: Connection,
    scene: Link<Scene>,
    features: Vec<FeatureEntry>,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("scene", &self.scene)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Project around a new, empty scene.
    pub fn new(connection: &Connection) -> Result<Self> {
        let scene = connection.scenes()?.create(&Scene::default())?;
        Ok(Self {
            connection: connection.clone(),
            scene,
            features: Vec::new(),
        })
    }

    /// Project around a new scene loaded from a project file. The scene is
    /// deleted again when loading fails.
    pub fn from_file(connection: &Connection, file_uri: &str, password: Option<&str>) -> Result<Self> {
        let mut project = Self::new(connection)?;
        if let Err(e) = project.scene.load_file(file_uri, password) {
            let mut scene = project.scene.clone();
            if let Err(cleanup) = scene.delete() {
                warn!(error = %cleanup, file = %file_uri, "could not delete scene after failed load");
            }
            return Err(e);
        }
        project.refresh()?;
        Ok(project)
    }

    /// Project around an existing scene.
    pub fn from_scene(scene: Link<Scene>, connection: &Connection) -> Result<Self> {
        let mut project = Self {
            connection: connection.clone(),
            scene,
            features: Vec::new(),
        };
        project.refresh()?;
        Ok(project)
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn scene(&self) -> &Link<Scene> {
        &self.scene
    }

    pub fn features(&self) -> &[FeatureEntry] {
        &self.features
    }

    /// Index entries named `name`, optionally restricted to one kind.
    pub fn find(&self, name: &str, kind: Option<EntityKind>) -> Vec<&FeatureEntry> {
        self.features
            .iter()
            .filter(|f| f.name == name && kind.map_or(true, |k| f.kind == k))
            .collect()
    }

    pub fn create_material(&self, name: impl Into<String>) -> Result<InstanceFeature<MaterialInstance>> {
        self.create_instance(name)
    }

    pub fn create_source(&self, name: impl Into<String>) -> Result<InstanceFeature<SourceInstance>> {
        self.create_instance(name)
    }

    pub fn create_sensor(&self, name: impl Into<String>) -> Result<InstanceFeature<SensorInstance>> {
        self.create_instance(name)
    }

    pub fn create_simulation(
        &self,
        name: impl Into<String>,
    ) -> Result<InstanceFeature<SimulationInstance>> {
        self.create_instance(name)
    }

    /// Draft instance feature; stored by its `commit`.
    pub fn create_instance<I: SceneInstance>(&self, name: impl Into<String>) -> Result<InstanceFeature<I>> {
        InstanceFeature::new(
            self.scene.clone(),
            self.connection.collection::<I::Template>()?,
            name,
        )
        .with_volumes(self.connection.vop_templates()?)
    }

    /// Instance feature for the stored instance named `name`.
    pub fn instance<I: SceneInstance>(&self, name: &str) -> Result<Option<InstanceFeature<I>>> {
        let scene = self.scene.get()?;
        let Some(stored) = I::list(&scene).iter().find(|i| i.name() == name) else {
            return Ok(None);
        };
        let templates = self.connection.collection::<I::Template>()?;
        InstanceFeature::from_instance(self.scene.clone(), &templates, stored.clone())?
            .with_volumes(self.connection.vop_templates()?)
            .map(Some)
    }

    pub fn root_part(&self) -> Result<Option<Link<Part>>> {
        let scene = self.scene.get()?;
        if scene.part_guid.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.connection.parts()?.link(scene.part_guid)))
    }

    /// The scene's root part, created empty and stored in the scene if the
    /// scene has none.
    pub fn create_root_part(&mut self) -> Result<Link<Part>> {
        if let Some(part) = self.root_part()? {
            return Ok(part);
        }
        let part = self.connection.parts()?.create(&Part::default())?;
        let mut scene = self.scene.get()?;
        scene.part_guid = part.key().to_string();
        self.scene.set(&scene)?;
        self.refresh()?;
        Ok(part)
    }

    /// Rebuild the feature index from the stored scene.
    pub fn refresh(&mut self) -> Result<()> {
        let scene = self.scene.get()?;
        let mut features = Vec::new();
        index_instances(&mut features, &scene.materials);
        index_instances(&mut features, &scene.sources);
        index_instances(&mut features, &scene.sensors);
        index_instances(&mut features, &scene.simulations);

        if !scene.part_guid.is_empty() {
            let root = self.connection.parts()?.link(scene.part_guid.clone());
            let part = root.get()?;
            features.push(FeatureEntry {
                kind: EntityKind::Part,
                name: part.name.clone(),
                key: scene.part_guid.clone(),
            });
            features.extend(part.parts.iter().map(|sub| FeatureEntry {
                kind: EntityKind::Part,
                name: sub.name.clone(),
                key: sub.part_guid.clone(),
            }));
        }
        debug!(scene = %self.scene.key(), features = features.len(), "feature index refreshed");
        self.features = features;
        Ok(())
    }

    /// Check the scene's name references.
    pub fn validate(&self) -> Result<()> {
        self.scene.get()?.validate_references()
    }

    /// Validate the scene, then store a job for `simulation` (the first
    /// simulation when empty).
    pub fn create_job(
        &self,
        name: impl Into<String>,
        simulation: &str,
        properties: JobProperties,
    ) -> Result<Link<Job>> {
        self.validate()?;
        let job = Job::for_simulation(name, &self.scene, simulation, properties)?;
        self.connection.jobs()?.create(&job)
    }

    /// Scene expanded for display: references inlined (except the part
    /// tree) and instance properties folded into their templates.
    pub fn expanded(&self) -> Result<Value> {
        let registry = self.connection.registry()?;
        let tree = Resolver::new(registry)
            .ignoring("part_guid")
            .expand_link(&self.scene)?;
        Ok(resolver::collapse_properties(tree))
    }

    /// Every occurrence of `field` in [`expanded`](Self::expanded), with
    /// its x-path.
    pub fn find_key(&self, field: &str) -> Result<Vec<(String, Value)>> {
        Ok(resolver::find_by_key(&self.expanded()?, field))
    }

    pub fn describe(&self) -> Result<String> {
        Ok(format!(
            "{}\n{}",
            Scene::KIND.full_name(),
            resolver::to_pretty_string(&self.expanded()?)?
        ))
    }
}

/// Instances are indexed under their template, or under their volume
/// property when that is all they reference.
fn index_instances<I: SceneInstance>(features: &mut Vec<FeatureEntry>, list: &[I]) {
    features.extend(list.iter().map(|i| {
        let (kind, key) = match (i.template_key(), i.volume_key()) {
            (None, Some(vop)) => (EntityKind::VopTemplate, vop),
            (key, _) => (<I::Template as Message>::KIND, key.unwrap_or_default()),
        };
        FeatureEntry {
            kind,
            name: i.name().to_string(),
            key: key.to_string(),
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::{fixture, MemoryDatabase};
    use crate::messages::{SopTemplate, SourceTemplate, VopTemplate};
    use serde_json::json;

    fn project() -> Project {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        Project::new(&conn).unwrap()
    }

    #[test]
    fn committed_instances_show_up_after_refresh() {
        let mut project = project();
        let mut material = project.create_material("Material.1").unwrap();
        *material.template_mut() = SopTemplate::mirror("Material.1.SOP", 90.0);
        material.commit().unwrap();
        assert!(project.features().is_empty());

        project.refresh().unwrap();
        let found = project.find("Material.1", Some(EntityKind::SopTemplate));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, material.template().key().unwrap());
        assert!(project.find("Material.1", Some(EntityKind::SourceTemplate)).is_empty());
    }

    #[test]
    fn root_part_is_created_once() {
        let mut project = project();
        assert!(project.root_part().unwrap().is_none());
        let first = project.create_root_part().unwrap();
        let second = project.create_root_part().unwrap();
        assert_eq!(first, second);
        assert_eq!(project.scene().get().unwrap().part_guid, first.key());
        assert_eq!(project.find("", Some(EntityKind::Part)).len(), 1);
    }

    #[test]
    fn expanded_view_inlines_templates_and_finds_keys() {
        let project = project();
        let mut material = project.create_material("Material.1").unwrap();
        *material.template_mut() = SopTemplate::mirror("Material.1.SOP", 90.0);
        material.commit().unwrap();

        let tree = project.expanded().unwrap();
        assert_eq!(tree["materials"][0]["sops"][0]["name"], json!("Material.1.SOP"));
        let found = project.find_key("mirror").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].0,
            ".materials[.name='Material.1'].sops[.name='Material.1.SOP'].mirror"
        );
        assert!(project.describe().unwrap().starts_with("optirpc.scene.v1.Scene\n"));
    }

    #[test]
    fn job_creation_validates_name_references() {
        let project = project();
        let mut source = project.create_source("Light.1").unwrap();
        *source.template_mut() = SourceTemplate::ray_file("Light.1", "rays.ray");
        source.commit().unwrap();
        let mut simulation = project.create_simulation("Direct.1").unwrap();
        simulation.instance_mut().source_paths = vec!["Light.2".into()];
        simulation.commit().unwrap();

        let err = project
            .create_job("job", "", JobProperties::direct_mc())
            .unwrap_err();
        assert!(matches!(err, Error::DanglingNameReference { .. }));

        simulation.instance_mut().source_paths = vec!["Light.1".into()];
        simulation.commit().unwrap();
        let job = project.create_job("job", "", JobProperties::direct_mc()).unwrap();
        assert_eq!(job.get().unwrap().simulation_path, "Direct.1");
    }

    #[test]
    fn opening_a_stored_instance() {
        let project = project();
        let mut source = project.create_source("Light.1").unwrap();
        source.commit().unwrap();
        let opened = project
            .instance::<SourceInstance>("Light.1")
            .unwrap()
            .unwrap();
        assert!(!opened.is_local());
        assert_eq!(opened.unique_id(), source.unique_id());
        assert!(project.instance::<SourceInstance>("nope").unwrap().is_none());
    }

    #[test]
    fn material_carries_surface_and_volume_properties() {
        let project = project();
        let conn = project.connection().clone();
        let mut material = project.create_material("Mat").unwrap();
        *material.template_mut() = SopTemplate::mirror("Mat.SOP", 80.0);
        material.set_vop(VopTemplate::opaque("Mat.VOP")).unwrap();
        material.commit().unwrap();

        let vop_key = material.vop().unwrap().key().unwrap().to_string();
        let stored = &project.scene().get().unwrap().materials[0];
        assert_eq!(stored.vop_guid, vop_key);
        assert_eq!(stored.sop_guids, vec![material.template().key().unwrap().to_string()]);

        *material.vop_mut().unwrap() = VopTemplate::optic("Mat.VOP", 1.5, 0.0);
        assert!(material.is_local());
        material.reset().unwrap();
        assert_eq!(material.vop().unwrap().message(), &VopTemplate::opaque("Mat.VOP"));
        assert!(!material.is_local());

        material.delete().unwrap();
        assert!(material.instance().vop_guid.is_empty());
        assert!(conn.vop_templates().unwrap().list().unwrap().is_empty());
        assert!(conn.sop_templates().unwrap().list().unwrap().is_empty());
        assert!(project.scene().get().unwrap().materials.is_empty());
    }

    #[test]
    fn volume_only_material_is_indexed_under_its_vop() {
        let mut project = project();
        let mut glass = project.create_material("Glass").unwrap();
        glass.set_vop(VopTemplate::optic("Glass", 1.5, 0.0)).unwrap();
        glass.without_sop().unwrap();
        glass.commit().unwrap();

        let stored = &project.scene().get().unwrap().materials[0];
        assert!(!stored.has_sop());
        assert!(project.connection().sop_templates().unwrap().list().unwrap().is_empty());

        project.refresh().unwrap();
        let found = project.find("Glass", Some(EntityKind::VopTemplate));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, glass.vop().unwrap().key().unwrap());

        let reopened = project.instance::<MaterialInstance>("Glass").unwrap().unwrap();
        assert_eq!(reopened.vop().unwrap().key(), glass.vop().unwrap().key());
        assert!(!reopened.is_local());
    }

    #[test]
    fn loaded_volume_material_is_indexed_as_vop() {
        let db = MemoryDatabase::new();
        db.register_file("Lamp.speos", None, fixture::lamp_project("Lamp", "Light.1"));
        let conn = Connection::memory(db).unwrap();
        let project = Project::from_file(&conn, "Lamp.speos", None).unwrap();
        assert_eq!(project.find("Volume.1", Some(EntityKind::VopTemplate)).len(), 1);
        assert_eq!(project.find("Material.1", Some(EntityKind::SopTemplate)).len(), 1);
    }

    #[test]
    fn failed_load_leaves_no_scene_behind() {
        let db = MemoryDatabase::new();
        db.register_file("Locked.speos", Some("pw"), fixture::lamp_project("Locked", "Light.1"));
        let conn = Connection::memory(db.clone()).unwrap();

        let err = Project::from_file(&conn, "Missing.speos", None).err().unwrap();
        assert!(matches!(err, Error::RemoteRejected { ref name, .. } if name == "FileNotFound"));
        let err = Project::from_file(&conn, "Locked.speos", Some("nope")).err().unwrap();
        assert!(matches!(err, Error::RemoteRejected { ref name, .. } if name == "InvalidPassword"));
        assert_eq!(db.len(EntityKind::Scene), 0);
    }
}
