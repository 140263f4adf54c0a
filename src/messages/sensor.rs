// MIT License
// Copyright 2023--present optirpc developers

use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorTemplate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub definition: Option<SensorDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDefinition {
    Irradiance { dimensions: SensorDimensions },
    Radiance {
        dimensions: SensorDimensions,
        focal: f64,
    },
    Camera(CameraSensor),
}

/// Sensor plane extent in millimeters and its sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorDimensions {
    pub x_start: f64,
    pub x_end: f64,
    pub x_sampling: u32,
    pub y_start: f64,
    pub y_end: f64,
    pub y_sampling: u32,
}

impl Default for SensorDimensions {
    fn default() -> Self {
        Self {
            x_start: -50.0,
            x_end: 50.0,
            x_sampling: 100,
            y_start: -50.0,
            y_end: 50.0,
            y_sampling: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSensor {
    pub focal_length: f64,
    pub imager_distance: f64,
    pub f_number: f64,
    pub horz_pixel: u32,
    pub vert_pixel: u32,
    pub width: f64,
    pub height: f64,
}

impl Default for CameraSensor {
    fn default() -> Self {
        Self {
            focal_length: 5.0,
            imager_distance: 10.0,
            f_number: 20.0,
            horz_pixel: 640,
            vert_pixel: 480,
            width: 5.0,
            height: 5.0,
        }
    }
}

impl SensorTemplate {
    pub fn irradiance(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(SensorDefinition::Irradiance {
                dimensions: SensorDimensions::default(),
            }),
            ..Default::default()
        }
    }

    pub fn camera(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(SensorDefinition::Camera(CameraSensor::default())),
            ..Default::default()
        }
    }
}
