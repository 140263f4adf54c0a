// MIT License
// Copyright 2023--present optirpc developers

//! Intensity distribution templates, referenced by surface sources.

use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityTemplate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub definition: Option<IntensityDefinition>,
}

/// Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityDefinition {
    Lambertian { total_angle: f64 },
    Cos { n: f64, total_angle: f64 },
    SymmetricGaussian { fwhm_angle: f64, total_angle: f64 },
    AsymmetricGaussian {
        fwhm_angle_x: f64,
        fwhm_angle_y: f64,
        total_angle: f64,
    },
    Library { intensity_file_uri: String },
}

impl IntensityTemplate {
    pub fn lambertian(name: impl Into<String>, total_angle: f64) -> Self {
        Self {
            name: name.into(),
            definition: Some(IntensityDefinition::Lambertian { total_angle }),
            ..Default::default()
        }
    }

    pub fn symmetric_gaussian(name: impl Into<String>, fwhm_angle: f64, total_angle: f64) -> Self {
        Self {
            name: name.into(),
            definition: Some(IntensityDefinition::SymmetricGaussian {
                fwhm_angle,
                total_angle,
            }),
            ..Default::default()
        }
    }

    pub fn library(name: impl Into<String>, intensity_file_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(IntensityDefinition::Library {
                intensity_file_uri: intensity_file_uri.into(),
            }),
            ..Default::default()
        }
    }
}
