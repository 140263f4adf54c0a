// MIT License
// Copyright 2023--present optirpc developers

//! Job engine of the in-memory database.
//!
//! Nothing is computed: when a job starts, the outcome is planned from its
//! scene (result files per sensor, or the reason it cannot run), and each
//! state poll moves a running job one step closer to that outcome.

use serde_json::Value;

use super::{rejected, MemoryDatabase};
use crate::error::Result;
use crate::job::{JobProgress, JobResult, JobState, RayPath};
use crate::kind::EntityKind;
use crate::messages::{Job, JobProperties, Scene};
use crate::status::optirpc_status_t;

/// Rays reported per source by an interactive job at most.
const MAX_RAYS_PER_SOURCE: u64 = 4;

#[derive(Debug, Default)]
pub(super) struct Plan {
    results: Vec<JobResult>,
    ray_paths: Vec<RayPath>,
    error: Option<String>,
}

impl Plan {
    fn failed(reason: String) -> Self {
        Self {
            error: Some(reason),
            ..Default::default()
        }
    }
}

/// Decide what the job stored as `job` will produce.
pub(super) fn plan(db: &MemoryDatabase, job: &Value) -> Plan {
    let job: Job = match serde_json::from_value(job.clone()) {
        Ok(job) => job,
        Err(e) => return Plan::failed(format!("malformed job: {e}")),
    };
    let scene: Scene = match db
        .row(EntityKind::Scene, &job.scene_guid)
        .and_then(|v| serde_json::from_value(v).map_err(Into::into))
    {
        Ok(scene) => scene,
        Err(e) => return Plan::failed(format!("cannot read scene: {e}")),
    };
    let Some(simulation) = scene.simulations.iter().find(|s| s.name == job.simulation_path) else {
        return Plan::failed(format!(
            "simulation '{}' not found in scene '{}'",
            job.simulation_path, scene.name
        ));
    };
    if let Err(e) = scene.validate_references() {
        return Plan::failed(e.to_string());
    }

    let mut results: Vec<JobResult> = simulation
        .sensor_paths
        .iter()
        .map(|sensor| JobResult {
            path: format!("{}.{sensor}.xmp", simulation.name),
        })
        .collect();
    results.push(JobResult {
        path: format!("{}.html", simulation.name),
    });

    let ray_paths = match &job.properties {
        Some(JobProperties::InteractiveSimulationProperties(props)) => props
            .rays_number_per_sources
            .iter()
            .flat_map(|per_source| {
                (0..per_source.rays_nb.min(MAX_RAYS_PER_SOURCE)).map(move |i| RayPath {
                    source_path: per_source.source_path.clone(),
                    impacts: vec![[0.0, 0.0, 0.0], [i as f64, 0.0, 100.0]],
                    wavelength: 555.0,
                    last_direction: [0.0, 0.0, 1.0],
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    Plan {
        results,
        ray_paths,
        error: None,
    }
}

#[derive(Debug, Default)]
pub(super) struct JobRun {
    state: JobState,
    duration: u32,
    remaining: u32,
    plan: Plan,
}

fn invalid_transition(action: &str, state: JobState) -> crate::error::Error {
    rejected(
        optirpc_status_t::OPTIRPC_REJECTED,
        "InvalidTransition",
        format!("cannot {action} a job that is {state}"),
    )
}

impl JobRun {
    pub(super) fn start(&mut self, plan: Plan, duration: u32) -> Result<()> {
        if self.state != JobState::Unstarted {
            return Err(invalid_transition("start", self.state));
        }
        if plan.error.is_some() {
            self.state = JobState::InError;
        } else {
            self.state = JobState::Running;
            self.duration = duration;
            self.remaining = duration;
        }
        self.plan = plan;
        Ok(())
    }

    pub(super) fn stop(&mut self) -> Result<()> {
        if self.state != JobState::Running {
            return Err(invalid_transition("stop", self.state));
        }
        self.state = JobState::Stopped;
        Ok(())
    }

    pub(super) fn poll(&mut self) -> JobState {
        if self.state == JobState::Running {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.state = JobState::Finished;
            }
        }
        self.state
    }

    pub(super) fn results(&self) -> Vec<JobResult> {
        match self.state {
            JobState::Finished => self.plan.results.clone(),
            _ => Vec::new(),
        }
    }

    pub(super) fn error(&self) -> String {
        match self.state {
            JobState::InError => self.plan.error.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }

    pub(super) fn progress(&self) -> JobProgress {
        let progress = match self.state {
            JobState::Finished => 1.0,
            _ if self.duration == 0 => 0.0,
            _ => f64::from(self.duration - self.remaining) / f64::from(self.duration),
        };
        JobProgress {
            progress,
            remaining_time: f64::from(self.remaining),
        }
    }

    pub(super) fn ray_paths(&self) -> Vec<RayPath> {
        match self.state {
            JobState::Finished => self.plan.ray_paths.clone(),
            _ => Vec::new(),
        }
    }
}
