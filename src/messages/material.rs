// MIT License
// Copyright 2023--present optirpc developers

//! Surface (SOP) and volume (VOP) optical property templates.

use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SopTemplate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub definition: Option<SopDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SopDefinition {
    /// Reflectance in percent, `[0, 100]`.
    Mirror { reflectance: f64 },
    OpticalPolished {},
    Library { sop_file_uri: String },
}

impl SopTemplate {
    pub fn mirror(name: impl Into<String>, reflectance: f64) -> Self {
        Self {
            name: name.into(),
            definition: Some(SopDefinition::Mirror { reflectance }),
            ..Default::default()
        }
    }

    pub fn optical_polished(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(SopDefinition::OpticalPolished {}),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VopTemplate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub definition: Option<VopDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VopDefinition {
    Opaque {},
    Optic {
        index: f64,
        /// Absorption in mm^-1.
        absorption: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constringence: Option<f64>,
    },
    Library { material_file_uri: String },
}

impl VopTemplate {
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(VopDefinition::Opaque {}),
            ..Default::default()
        }
    }

    pub fn optic(name: impl Into<String>, index: f64, absorption: f64) -> Self {
        Self {
            name: name.into(),
            definition: Some(VopDefinition::Optic {
                index,
                absorption,
                constringence: None,
            }),
            ..Default::default()
        }
    }
}
