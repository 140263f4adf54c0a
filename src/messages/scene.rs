// MIT License
// Copyright 2023--present optirpc developers

//! Scene aggregate and its instance lists.
//!
//! Instances carry a foreign key to their template plus placement data that
//! is local to the scene. Simulation instances refer to sensors and sources
//! by instance name, not by key.

use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::geometry::{AxisSystem, GeoPathWithReverseNormal, GeoPaths};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub part_guid: String,
    pub sources: Vec<SourceInstance>,
    pub sensors: Vec<SensorInstance>,
    pub simulations: Vec<SimulationInstance>,
    pub materials: Vec<MaterialInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground: Option<GroundPlane>,
}

impl Scene {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialInstance {
    pub name: String,
    pub metadata: Metadata,
    pub vop_guid: String,
    pub sop_guid: String,
    pub sop_guids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture: Option<Texture>,
    /// `None` applies the material to every geometry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometries: Option<GeoPaths>,
}

impl MaterialInstance {
    /// `true` when the instance references at least one surface optical
    /// property, directly, as a list, or through a texture layer.
    pub fn has_sop(&self) -> bool {
        !self.sop_guid.is_empty()
            || self.sop_guids.iter().any(|g| !g.is_empty())
            || self
                .texture
                .as_ref()
                .is_some_and(|t| t.layers.iter().any(|l| !l.sop_guid.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Texture {
    pub layers: Vec<TextureLayer>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureLayer {
    pub sop_guid: String,
    pub image_uri: String,
    pub normal_map_uri: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceInstance {
    pub name: String,
    pub metadata: Metadata,
    pub source_guid: String,
    #[serde(flatten)]
    pub properties: Option<SourceProperties>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceProperties {
    SurfaceProperties(SurfaceSourceProperties),
    RayfileProperties(RayFileSourceProperties),
    LuminaireProperties(LuminaireSourceProperties),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSourceProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exitance_constant_properties: Option<ExitanceConstant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity_properties: Option<AxisSystem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitanceConstant {
    pub geo_paths: Vec<GeoPathWithReverseNormal>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RayFileSourceProperties {
    pub axis_system: AxisSystem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_geometries: Option<GeoPaths>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LuminaireSourceProperties {
    pub axis_system: AxisSystem,
}

impl SourceInstance {
    /// Mutable access to every geo path this source addresses.
    pub fn geo_paths_mut(&mut self) -> Vec<&mut String> {
        match &mut self.properties {
            Some(SourceProperties::SurfaceProperties(surface)) => surface
                .exitance_constant_properties
                .iter_mut()
                .flat_map(|e| e.geo_paths.iter_mut().map(|g| &mut g.geo_path))
                .collect(),
            Some(SourceProperties::RayfileProperties(rayfile)) => rayfile
                .exit_geometries
                .iter_mut()
                .flat_map(|g| g.geo_paths.iter_mut())
                .collect(),
            Some(SourceProperties::LuminaireProperties(_)) | None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorInstance {
    pub name: String,
    pub metadata: Metadata,
    pub sensor_guid: String,
    #[serde(flatten)]
    pub properties: Option<SensorProperties>,
    pub result_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorProperties {
    IrradianceProperties(SensorPlacement),
    RadianceProperties(SensorPlacement),
    CameraProperties(CameraPlacement),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorPlacement {
    pub axis_system: AxisSystem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_type: Option<LayerType>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraPlacement {
    pub axis_system: AxisSystem,
    pub trajectory_file_uri: String,
}

/// How a sensor splits its results into layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    None,
    Source,
    Face { geometries: GeoPaths },
    Sequence {
        maximum_nb_of_sequence: u32,
        sequence_type: SequenceType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceType {
    #[default]
    Faces,
    Geometries,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationInstance {
    pub name: String,
    pub metadata: Metadata,
    pub simulation_guid: String,
    /// Sensor instance names.
    pub sensor_paths: Vec<String>,
    /// Source instance names.
    pub source_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometries: Option<GeoPaths>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundPlane {
    pub ground_origin: [f64; 3],
    pub ground_zenith: [f64; 3],
    pub ground_north: [f64; 3],
}

impl Default for GroundPlane {
    fn default() -> Self {
        Self {
            ground_origin: [0.0, 0.0, 0.0],
            ground_zenith: [0.0, 0.0, 1.0],
            ground_north: [0.0, 1.0, 0.0],
        }
    }
}
