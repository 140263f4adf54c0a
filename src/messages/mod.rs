// MIT License
// Copyright 2023--present optirpc developers

//! Typed messages stored by the database, one per [`EntityKind`].
//!
//! Messages are plain serde structs. On the wire and in the
//! [`resolver`](crate::resolver) they are JSON objects; fields ending in
//! `_guid` or `_guids` are foreign keys into other collections. Variant
//! definitions ("one of" groups such as a spectrum being either monochromatic
//! or blackbody) are flattened enums, so a definition appears as a single
//! top-level key named after the variant:
//!
//! ```json
//! { "name": "Mirror_90", "description": "", "metadata": {}, "mirror": { "reflectance": 90.0 } }
//! ```

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::kind::EntityKind;

pub mod intensity;
pub mod job;
pub mod material;
pub mod part;
pub mod scene;
pub mod sensor;
pub mod simulation;
pub mod source;
pub mod spectrum;

pub use intensity::{IntensityDefinition, IntensityTemplate};
pub use job::{
    DirectMcProperties, InteractiveProperties, InverseMcProperties, Job, JobProperties, JobType,
    RaysNumberPerSource,
};
pub use material::{SopDefinition, SopTemplate, VopDefinition, VopTemplate};
pub use part::{Body, Face, Part, PartInstance};
pub use scene::{
    CameraPlacement, ExitanceConstant, GroundPlane, LayerType, LuminaireSourceProperties,
    MaterialInstance, RayFileSourceProperties, Scene, SensorInstance, SensorPlacement,
    SensorProperties, SequenceType, SimulationInstance, SourceInstance, SourceProperties,
    SurfaceSourceProperties, Texture, TextureLayer,
};
pub use sensor::{CameraSensor, SensorDefinition, SensorDimensions, SensorTemplate};
pub use simulation::{SimulationDefinition, SimulationTemplate};
pub use source::{SourceDefinition, SourceTemplate};
pub use spectrum::{PredefinedSpectrum, Spectrum, SpectrumDefinition};

/// Free-form string map attached to every message.
pub type Metadata = BTreeMap<String, String>;

/// A message stored in one collection.
pub trait Message:
    Serialize + DeserializeOwned + Clone + Default + PartialEq + Debug + Send + Sync + 'static
{
    /// Collection this message lives in.
    const KIND: EntityKind;

    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
    fn metadata(&self) -> &Metadata;
    fn metadata_mut(&mut self) -> &mut Metadata;
}

macro_rules! impl_message {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Message for $ty {
                const KIND: EntityKind = EntityKind::$kind;

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
            }
        )*
    };
}

impl_message! {
    Spectrum => Spectrum,
    IntensityTemplate => IntensityTemplate,
    SopTemplate => SopTemplate,
    VopTemplate => VopTemplate,
    SourceTemplate => SourceTemplate,
    SensorTemplate => SensorTemplate,
    SimulationTemplate => SimulationTemplate,
    Part => Part,
    Body => Body,
    Face => Face,
    Scene => Scene,
    Job => Job,
}

/// Render a message as its full name followed by indented JSON.
pub fn to_pretty_string<M: Message>(message: &M) -> Result<String> {
    let body = crate::resolver::to_pretty_string(message)?;
    Ok(format!("{}\n{}", M::KIND.full_name(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattened_definition_is_a_top_level_key() {
        let sop = SopTemplate::mirror("Mirror_90", 90.0);
        let value = serde_json::to_value(&sop).unwrap();
        assert_eq!(value["name"], json!("Mirror_90"));
        assert_eq!(value["mirror"]["reflectance"], json!(90.0));
        let back: SopTemplate = serde_json::from_value(value).unwrap();
        assert_eq!(back, sop);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let spectrum: Spectrum = serde_json::from_value(json!({ "name": "s" })).unwrap();
        assert_eq!(spectrum.name, "s");
        assert!(spectrum.definition.is_none());
        assert!(spectrum.metadata.is_empty());
    }

    #[test]
    fn pretty_string_starts_with_full_name() {
        let text = to_pretty_string(&Spectrum::blackbody("bb", 2856.0)).unwrap();
        assert!(text.starts_with("optirpc.spectrum.v1.Spectrum\n"));
        assert!(text.contains("\"temperature\": 2856.0"));
    }
}
