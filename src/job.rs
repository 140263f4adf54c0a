// MIT License
// Copyright 2023--present optirpc developers

//! Job control.
//!
//! A job runs one simulation instance of one scene on the server. Its
//! lifecycle is driven by the server:
//!
//! ```text
//! Unstarted --start--> Running --+--> Finished
//!                                +--> InError
//!                                +--stop--> Stopped
//! ```
//!
//! `start` is only accepted from `Unstarted` and `stop` only from `Running`;
//! other requests come back as [`Error::RemoteRejected`]. Results and error
//! text are empty until the job is terminal, so callers poll
//! [`Link::get_state`] (or use [`Link::wait_until_terminal`]) first.

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::link::Link;
use crate::messages::{Job, JobProperties, JobType, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Unstarted,
    Running,
    Finished,
    Stopped,
    InError,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Stopped | JobState::InError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Unstarted => "unstarted",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Stopped => "stopped",
            JobState::InError => "in_error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One result file produced by a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobResult {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobProgress {
    /// Fraction done, `0.0..=1.0`.
    pub progress: f64,
    /// Estimated seconds left.
    pub remaining_time: f64,
}

/// A ray traced by an interactive job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RayPath {
    pub source_path: String,
    pub impacts: Vec<[f64; 3]>,
    /// Nanometers.
    pub wavelength: f64,
    pub last_direction: [f64; 3],
}

/// How [`Link::wait_until_terminal`] polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPolling {
    pub interval: Duration,
    /// `None` polls until the job ends.
    pub max_polls: Option<u32>,
}

impl Default for JobPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: None,
        }
    }
}

impl Job {
    /// Job running `simulation_path` of `scene`. An empty path selects the
    /// scene's first simulation instance; a name the scene does not have is
    /// rejected with [`Error::DanglingNameReference`].
    pub fn for_simulation(
        name: impl Into<String>,
        scene: &Link<Scene>,
        simulation_path: &str,
        properties: JobProperties,
    ) -> Result<Self> {
        let name = name.into();
        let stored = scene.get()?;
        let simulation = if simulation_path.is_empty() {
            stored.simulations.first()
        } else {
            stored.simulations.iter().find(|s| s.name == simulation_path)
        };
        let Some(simulation) = simulation else {
            return Err(Error::DanglingNameReference {
                simulation: name,
                reference: simulation_path.to_string(),
                list: "simulations",
            });
        };
        Ok(Self {
            name,
            scene_guid: scene.key().to_string(),
            simulation_path: simulation.name.clone(),
            job_type: JobType::Cpu,
            properties: Some(properties),
            ..Default::default()
        })
    }
}

impl Link<Job> {
    pub fn start(&self) -> Result<()> {
        self.backend()?.job_start(self.key())?;
        info!(key = %self.key(), "job started");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.backend()?.job_stop(self.key())?;
        info!(key = %self.key(), "job stopped");
        Ok(())
    }

    pub fn get_state(&self) -> Result<JobState> {
        self.backend()?.job_state(self.key())
    }

    pub fn get_results(&self) -> Result<Vec<JobResult>> {
        self.backend()?.job_results(self.key())
    }

    pub fn get_error(&self) -> Result<String> {
        self.backend()?.job_error(self.key())
    }

    pub fn get_progress(&self) -> Result<JobProgress> {
        self.backend()?.job_progress(self.key())
    }

    pub fn get_ray_paths(&self) -> Result<Vec<RayPath>> {
        self.backend()?.job_ray_paths(self.key())
    }

    /// Poll the state until it is terminal.
    ///
    /// Fails with [`Error::Timeout`] after `polling.max_polls` non-terminal
    /// answers. Stopping the job is up to the caller.
    pub fn wait_until_terminal(&self, polling: &JobPolling) -> Result<JobState> {
        let mut polls = 0u32;
        loop {
            let state = self.get_state()?;
            polls += 1;
            if state.is_terminal() {
                debug!(key = %self.key(), state = %state, polls, "job terminal");
                return Ok(state);
            }
            if polling.max_polls.is_some_and(|max| polls >= max) {
                return Err(Error::Timeout {
                    target: format!("job '{}'", self.key()),
                    after: polling.interval * polls,
                });
            }
            thread::sleep(polling.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::memory::MemoryDatabase;
    use crate::messages::SimulationInstance;

    fn scene_with(conn: &Connection, names: &[&str]) -> Link<Scene> {
        let scene = Scene {
            name: "s".into(),
            simulations: names
                .iter()
                .map(|n| SimulationInstance {
                    name: n.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        conn.scenes().unwrap().create(&scene).unwrap()
    }

    #[test]
    fn empty_path_picks_the_first_simulation() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let scene = scene_with(&conn, &["Direct.1", "Inverse.1"]);
        let job = Job::for_simulation("j", &scene, "", JobProperties::direct_mc()).unwrap();
        assert_eq!(job.simulation_path, "Direct.1");
        assert_eq!(job.scene_guid, scene.key());
    }

    #[test]
    fn unknown_simulation_is_a_dangling_reference() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let scene = scene_with(&conn, &["Direct.1"]);
        let err = Job::for_simulation("j", &scene, "Nope", JobProperties::direct_mc()).unwrap_err();
        assert!(matches!(err, Error::DanglingNameReference { .. }));
        let empty = scene_with(&conn, &[]);
        assert!(Job::for_simulation("j", &empty, "", JobProperties::direct_mc()).is_err());
    }

    #[test]
    fn polling_gives_up_after_max_polls() {
        let db = MemoryDatabase::new().with_job_duration(1_000);
        let conn = Connection::memory(db).unwrap();
        let scene = scene_with(&conn, &["Direct.1"]);
        let job = Job::for_simulation("j", &scene, "", JobProperties::direct_mc()).unwrap();
        let link = conn.jobs().unwrap().create(&job).unwrap();
        link.start().unwrap();
        let polling = JobPolling {
            interval: Duration::from_millis(1),
            max_polls: Some(3),
        };
        assert!(matches!(
            link.wait_until_terminal(&polling).unwrap_err(),
            Error::Timeout { .. }
        ));
        link.stop().unwrap();
        assert_eq!(link.get_state().unwrap(), JobState::Stopped);
    }

    #[test]
    fn results_are_empty_before_termination() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let scene = scene_with(&conn, &["Direct.1"]);
        let job = Job::for_simulation("j", &scene, "", JobProperties::direct_mc()).unwrap();
        let link = conn.jobs().unwrap().create(&job).unwrap();
        assert_eq!(link.get_state().unwrap(), JobState::Unstarted);
        assert!(link.get_results().unwrap().is_empty());
        assert_eq!(link.get_error().unwrap(), "");
    }

    #[test]
    fn transitions_outside_the_lifecycle_are_rejected() {
        let conn = Connection::memory(MemoryDatabase::new()).unwrap();
        let scene = scene_with(&conn, &["Direct.1"]);
        let job = Job::for_simulation("j", &scene, "", JobProperties::direct_mc()).unwrap();
        let link = conn.jobs().unwrap().create(&job).unwrap();
        assert!(matches!(link.stop().unwrap_err(), Error::RemoteRejected { .. }));
        link.start().unwrap();
        assert!(matches!(link.start().unwrap_err(), Error::RemoteRejected { .. }));
    }
}
