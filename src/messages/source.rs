// MIT License
// Copyright 2023--present optirpc developers

//! Source templates. A source owns references to shared spectra and
//! intensity templates; deleting the source never deletes them.

use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceTemplate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub definition: Option<SourceDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDefinition {
    Surface {
        luminous_flux: f64,
        #[serde(default)]
        intensity_guid: String,
        #[serde(default)]
        spectrum_guid: String,
    },
    RayFile {
        ray_file_uri: String,
        #[serde(default)]
        spectrum_guid: String,
    },
    Luminaire {
        intensity_file_uri: String,
        luminous_flux: f64,
        #[serde(default)]
        spectrum_guid: String,
    },
}

impl SourceTemplate {
    pub fn surface(
        name: impl Into<String>,
        luminous_flux: f64,
        intensity_guid: impl Into<String>,
        spectrum_guid: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            definition: Some(SourceDefinition::Surface {
                luminous_flux,
                intensity_guid: intensity_guid.into(),
                spectrum_guid: spectrum_guid.into(),
            }),
            ..Default::default()
        }
    }

    pub fn ray_file(name: impl Into<String>, ray_file_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(SourceDefinition::RayFile {
                ray_file_uri: ray_file_uri.into(),
                spectrum_guid: String::new(),
            }),
            ..Default::default()
        }
    }
}
