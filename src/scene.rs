// MIT License
// Copyright 2023--present optirpc developers

//! Scene actions and instance bookkeeping.

use std::collections::HashSet;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::link::Link;
use crate::messages::{
    MaterialInstance, Message, Metadata, Scene, SensorInstance, SensorTemplate,
    SimulationInstance, SimulationTemplate, SopTemplate, SourceInstance, SourceTemplate,
};

impl Link<Scene> {
    /// Replace the scene's content with a project file, creating every
    /// part, template and geometry it needs on the server.
    pub fn load_file(&self, file_uri: &str, password: Option<&str>) -> Result<()> {
        self.backend()?.load_file(self.key(), file_uri, password)?;
        info!(key = %self.key(), file = %file_uri, "scene loaded from file");
        Ok(())
    }
}

impl Scene {
    /// Check every name-based reference of the scene.
    ///
    /// Instance names must be unique within each list, and every sensor and
    /// source named by a simulation must exist. The server does not check
    /// this before a job is run.
    pub fn validate_references(&self) -> Result<()> {
        unique_names(SourceInstance::LIST, self.sources.iter().map(|i| i.name.as_str()))?;
        unique_names(SensorInstance::LIST, self.sensors.iter().map(|i| i.name.as_str()))?;
        unique_names(
            SimulationInstance::LIST,
            self.simulations.iter().map(|i| i.name.as_str()),
        )?;
        unique_names(
            MaterialInstance::LIST,
            self.materials.iter().map(|i| i.name.as_str()),
        )?;

        let sensors: HashSet<&str> = self.sensors.iter().map(|s| s.name.as_str()).collect();
        let sources: HashSet<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        for simulation in &self.simulations {
            let dangling = |list: &'static str, reference: &str| Error::DanglingNameReference {
                simulation: simulation.name.clone(),
                reference: reference.to_string(),
                list,
            };
            if let Some(missing) = simulation.sensor_paths.iter().find(|p| !sensors.contains(p.as_str())) {
                return Err(dangling(SensorInstance::LIST, missing));
            }
            if let Some(missing) = simulation.source_paths.iter().find(|p| !sources.contains(p.as_str())) {
                return Err(dangling(SourceInstance::LIST, missing));
            }
        }
        Ok(())
    }
}

fn unique_names<'a>(list: &'static str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::DuplicateInstanceName {
                list,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// An entry of one of the scene's instance lists, bound to a template kind.
pub trait SceneInstance:
    Serialize + DeserializeOwned + Clone + PartialEq + Default + Debug + Send + Sync + 'static
{
    type Template: Message;

    /// Name of the scene list holding this instance type.
    const LIST: &'static str;

    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
    fn metadata(&self) -> &Metadata;
    fn metadata_mut(&mut self) -> &mut Metadata;

    /// Key of the template the instance points at, if any.
    fn template_key(&self) -> Option<&str>;

    /// Point the instance at the template stored under `key`.
    fn attach_template(&mut self, key: &str);
    fn detach_template(&mut self);

    /// Key of the volume optical property, for instances that carry one.
    fn volume_key(&self) -> Option<&str> {
        None
    }

    fn attach_volume(&mut self, _key: &str) {}

    fn detach_volume(&mut self) {}

    fn list(scene: &Scene) -> &Vec<Self>;
    fn list_mut(scene: &mut Scene) -> &mut Vec<Self>;
}

macro_rules! instance_common {
    () => {
        fn name(&self) -> &str {
            &self.name
        }

        fn set_name(&mut self, name: String) {
            self.name = name;
        }

        fn metadata(&self) -> &Metadata {
            &self.metadata
        }

        fn metadata_mut(&mut self) -> &mut Metadata {
            &mut self.metadata
        }
    };
}

impl SceneInstance for MaterialInstance {
    type Template = SopTemplate;
    const LIST: &'static str = "materials";

    instance_common!();

    fn template_key(&self) -> Option<&str> {
        Some(self.sop_guid.as_str())
            .filter(|k| !k.is_empty())
            .or_else(|| self.sop_guids.iter().map(String::as_str).find(|k| !k.is_empty()))
    }

    fn attach_template(&mut self, key: &str) {
        self.sop_guid.clear();
        self.sop_guids = vec![key.to_string()];
    }

    fn detach_template(&mut self) {
        self.sop_guid.clear();
        self.sop_guids.clear();
    }

    fn volume_key(&self) -> Option<&str> {
        Some(self.vop_guid.as_str()).filter(|k| !k.is_empty())
    }

    fn attach_volume(&mut self, key: &str) {
        self.vop_guid = key.to_string();
    }

    fn detach_volume(&mut self) {
        self.vop_guid.clear();
    }

    fn list(scene: &Scene) -> &Vec<Self> {
        &scene.materials
    }

    fn list_mut(scene: &mut Scene) -> &mut Vec<Self> {
        &mut scene.materials
    }
}

impl SceneInstance for SourceInstance {
    type Template = SourceTemplate;
    const LIST: &'static str = "sources";

    instance_common!();

    fn template_key(&self) -> Option<&str> {
        Some(self.source_guid.as_str()).filter(|k| !k.is_empty())
    }

    fn attach_template(&mut self, key: &str) {
        self.source_guid = key.to_string();
    }

    fn detach_template(&mut self) {
        self.source_guid.clear();
    }

    fn list(scene: &Scene) -> &Vec<Self> {
        &scene.sources
    }

    fn list_mut(scene: &mut Scene) -> &mut Vec<Self> {
        &mut scene.sources
    }
}

impl SceneInstance for SensorInstance {
    type Template = SensorTemplate;
    const LIST: &'static str = "sensors";

    instance_common!();

    fn template_key(&self) -> Option<&str> {
        Some(self.sensor_guid.as_str()).filter(|k| !k.is_empty())
    }

    fn attach_template(&mut self, key: &str) {
        self.sensor_guid = key.to_string();
    }

    fn detach_template(&mut self) {
        self.sensor_guid.clear();
    }

    fn list(scene: &Scene) -> &Vec<Self> {
        &scene.sensors
    }

    fn list_mut(scene: &mut Scene) -> &mut Vec<Self> {
        &mut scene.sensors
    }
}

impl SceneInstance for SimulationInstance {
    type Template = SimulationTemplate;
    const LIST: &'static str = "simulations";

    instance_common!();

    fn template_key(&self) -> Option<&str> {
        Some(self.simulation_guid.as_str()).filter(|k| !k.is_empty())
    }

    fn attach_template(&mut self, key: &str) {
        self.simulation_guid = key.to_string();
    }

    fn detach_template(&mut self) {
        self.simulation_guid.clear();
    }

    fn list(scene: &Scene) -> &Vec<Self> {
        &scene.simulations
    }

    fn list_mut(scene: &mut Scene) -> &mut Vec<Self> {
        &mut scene.simulations
    }
}
