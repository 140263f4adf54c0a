// MIT License
// Copyright 2023--present optirpc developers

use serde::{Deserialize, Serialize};

use super::Metadata;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationTemplate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub definition: Option<SimulationDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationDefinition {
    DirectMcSimulationTemplate {
        geom_distance_tolerance: f64,
        max_impact: u32,
        dispersion: bool,
    },
    InverseMcSimulationTemplate {
        geom_distance_tolerance: f64,
        max_impact: u32,
        splitting: bool,
    },
    InteractiveSimulationTemplate {
        geom_distance_tolerance: f64,
        max_impact: u32,
    },
}

impl SimulationTemplate {
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(SimulationDefinition::DirectMcSimulationTemplate {
                geom_distance_tolerance: 0.01,
                max_impact: 100,
                dispersion: true,
            }),
            ..Default::default()
        }
    }

    pub fn interactive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(SimulationDefinition::InteractiveSimulationTemplate {
                geom_distance_tolerance: 0.01,
                max_impact: 100,
            }),
            ..Default::default()
        }
    }
}
