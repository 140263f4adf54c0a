// MIT License
// Copyright 2023--present optirpc developers

//! Job message and its run properties.

use serde::{Deserialize, Serialize};

use super::Metadata;

/// Rays traced by an interactive job when none is given.
pub const DEFAULT_INTERACTIVE_RAYS: u64 = 100;
/// Rays traced by a direct Monte Carlo job before it stops.
pub const DEFAULT_DIRECT_RAYS: u64 = 200_000;
/// Passes made by an inverse Monte Carlo job before it stops.
pub const DEFAULT_INVERSE_PASSES: u32 = 5;
/// Seconds between intermediate result saves.
pub const DEFAULT_SAVE_FREQUENCY: u64 = 1800;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub scene_guid: String,
    /// Name of the simulation instance to run.
    pub simulation_path: String,
    pub job_type: JobType,
    #[serde(flatten)]
    pub properties: Option<JobProperties>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobProperties {
    DirectMcSimulationProperties(DirectMcProperties),
    InverseMcSimulationProperties(InverseMcProperties),
    InteractiveSimulationProperties(InteractiveProperties),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectMcProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_condition_rays_number: Option<u64>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_condition_duration: Option<u64>,
    pub automatic_save_frequency: u64,
}

impl Default for DirectMcProperties {
    fn default() -> Self {
        Self {
            stop_condition_rays_number: Some(DEFAULT_DIRECT_RAYS),
            stop_condition_duration: None,
            automatic_save_frequency: DEFAULT_SAVE_FREQUENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InverseMcProperties {
    pub optimized_propagation: bool,
    pub stop_condition_passes_number: u32,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_condition_duration: Option<u64>,
    pub automatic_save_frequency: u64,
}

impl Default for InverseMcProperties {
    fn default() -> Self {
        Self {
            optimized_propagation: false,
            stop_condition_passes_number: DEFAULT_INVERSE_PASSES,
            stop_condition_duration: None,
            automatic_save_frequency: DEFAULT_SAVE_FREQUENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveProperties {
    pub rays_number_per_sources: Vec<RaysNumberPerSource>,
    pub light_expert: bool,
    pub impact_report: bool,
}

/// Rays to trace from one source instance, addressed by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaysNumberPerSource {
    pub source_path: String,
    pub rays_nb: u64,
}

impl JobProperties {
    pub fn direct_mc() -> Self {
        JobProperties::DirectMcSimulationProperties(DirectMcProperties::default())
    }

    pub fn inverse_mc() -> Self {
        JobProperties::InverseMcSimulationProperties(InverseMcProperties::default())
    }

    /// Interactive run tracing [`DEFAULT_INTERACTIVE_RAYS`] rays from each
    /// named source.
    pub fn interactive<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        JobProperties::InteractiveSimulationProperties(InteractiveProperties {
            rays_number_per_sources: sources
                .into_iter()
                .map(|s| RaysNumberPerSource {
                    source_path: s.into(),
                    rays_nb: DEFAULT_INTERACTIVE_RAYS,
                })
                .collect(),
            ..Default::default()
        })
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, JobProperties::InteractiveSimulationProperties(_))
    }
}
