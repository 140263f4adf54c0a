// MIT License
// Copyright 2023--present optirpc developers

//! In-process database.
//!
//! [`MemoryDatabase`] implements the whole [`Backend`] surface without a
//! server: per-kind tables keyed by random UUIDs, the same domain checks a
//! server performs on stored messages, project files served by registered
//! loaders, and a job engine that advances one step per state poll. It backs
//! the test suite, and `rpc::server::serve` can expose it over the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::job::{JobProgress, JobResult, JobState, RayPath};
use crate::kind::EntityKind;
use crate::messages::Scene;
use crate::status::optirpc_status_t;

pub mod fixture;
mod jobs;
mod validate;

use jobs::JobRun;

/// Polls a job stays running before it finishes.
pub const DEFAULT_JOB_DURATION: u32 = 3;

type Loader = Arc<dyn Fn(&MemoryDatabase) -> Result<Scene> + Send + Sync>;

struct ProjectFile {
    password: Option<String>,
    loader: Loader,
}

#[derive(Default)]
struct Table {
    order: Vec<String>,
    rows: HashMap<String, Value>,
}

struct State {
    tables: [Table; 12],
    jobs: HashMap<String, JobRun>,
    job_duration: u32,
}

struct Inner {
    state: Mutex<State>,
    files: Mutex<HashMap<String, ProjectFile>>,
    available: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

/// Thread-safe in-memory database. Clones share the same data.
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn rejected(status: optirpc_status_t, name: &str, message: impl Into<String>) -> Error {
    Error::RemoteRejected {
        code: status.code(),
        name: name.to_string(),
        message: message.into(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    tables: Default::default(),
                    jobs: HashMap::new(),
                    job_duration: DEFAULT_JOB_DURATION,
                }),
                files: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of state polls a started job spends running (at least one).
    pub fn with_job_duration(self, polls: u32) -> Self {
        self.state().job_duration = polls.max(1);
        self
    }

    /// While unavailable, the readiness probe answers "not ready" and every
    /// other call fails with [`Error::TransportUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Serve `file_uri` to [`Backend::load_file`]. The loader stores what
    /// the file contains and returns the resulting scene.
    pub fn register_file<F>(&self, file_uri: impl Into<String>, password: Option<&str>, loader: F)
    where
        F: Fn(&MemoryDatabase) -> Result<Scene> + Send + Sync + 'static,
    {
        lock(&self.inner.files).insert(
            file_uri.into(),
            ProjectFile {
                password: password.map(str::to_string),
                loader: Arc::new(loader),
            },
        );
    }

    /// Reads served so far, for observing probe and cache behavior.
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::Relaxed)
    }

    /// Creates, updates and deletes served so far.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::Relaxed)
    }

    /// Number of stored entities of `kind`.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.state().tables[kind.index()].order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().tables.iter().all(|t| t.order.is_empty())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::TransportUnavailable {
                target: self.target(),
                reason: "database unavailable".to_string(),
            })
        }
    }

    fn row(&self, kind: EntityKind, key: &str) -> Result<Value> {
        self.state().tables[kind.index()]
            .rows
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind,
                key: key.to_string(),
            })
    }

    fn job_run<T>(&self, key: &str, f: impl FnOnce(&mut JobRun) -> Result<T>) -> Result<T> {
        self.ensure_available()?;
        let mut state = self.state();
        if !state.tables[EntityKind::Job.index()].rows.contains_key(key) {
            return Err(Error::NotFound {
                kind: EntityKind::Job,
                key: key.to_string(),
            });
        }
        f(state.jobs.entry(key.to_string()).or_default())
    }
}

impl Backend for MemoryDatabase {
    fn target(&self) -> String {
        "memory".to_string()
    }

    fn health(&self) -> Result<bool> {
        Ok(self.inner.available.load(Ordering::Acquire))
    }

    fn create(&self, kind: EntityKind, payload: Value) -> Result<String> {
        self.ensure_available()?;
        validate::check(kind, &payload)?;
        let key = Uuid::new_v4().to_string();
        let mut state = self.state();
        let table = &mut state.tables[kind.index()];
        table.order.push(key.clone());
        table.rows.insert(key.clone(), payload);
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        debug!(kind = %kind, key = %key, "stored");
        Ok(key)
    }

    fn read(&self, kind: EntityKind, key: &str) -> Result<Value> {
        self.ensure_available()?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        self.row(kind, key)
    }

    fn update(&self, kind: EntityKind, key: &str, payload: Value) -> Result<()> {
        self.ensure_available()?;
        validate::check(kind, &payload)?;
        let mut state = self.state();
        let row = state.tables[kind.index()]
            .rows
            .get_mut(key)
            .ok_or_else(|| Error::NotFound {
                kind,
                key: key.to_string(),
            })?;
        *row = payload;
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, kind: EntityKind, key: &str) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state();
        let table = &mut state.tables[kind.index()];
        if table.rows.remove(key).is_none() {
            return Err(Error::NotFound {
                kind,
                key: key.to_string(),
            });
        }
        table.order.retain(|k| k != key);
        if kind == EntityKind::Job {
            state.jobs.remove(key);
        }
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<String>> {
        self.ensure_available()?;
        Ok(self.state().tables[kind.index()].order.clone())
    }

    fn load_file(&self, scene_key: &str, file_uri: &str, password: Option<&str>) -> Result<()> {
        self.ensure_available()?;
        self.row(EntityKind::Scene, scene_key)?;

        let loader = {
            let files = lock(&self.inner.files);
            let file = files.get(file_uri).ok_or_else(|| {
                rejected(
                    optirpc_status_t::OPTIRPC_INVALID_PARAMETER,
                    "FileNotFound",
                    format!("no project file at '{file_uri}'"),
                )
            })?;
            if file.password.is_some() && file.password.as_deref() != password {
                return Err(rejected(
                    optirpc_status_t::OPTIRPC_REJECTED,
                    "InvalidPassword",
                    format!("wrong password for '{file_uri}'"),
                ));
            }
            file.loader.clone()
        };

        // The loader stores entities through `self`; no lock may be held.
        let scene = loader(self)?;
        self.update(EntityKind::Scene, scene_key, serde_json::to_value(&scene)?)?;
        info!(scene = %scene_key, file = %file_uri, "project file loaded");
        Ok(())
    }

    fn job_start(&self, key: &str) -> Result<()> {
        let job = self.read(EntityKind::Job, key)?;
        let plan = jobs::plan(self, &job);
        let duration = self.state().job_duration;
        self.job_run(key, |run| run.start(plan, duration))
    }

    fn job_stop(&self, key: &str) -> Result<()> {
        self.job_run(key, JobRun::stop)
    }

    fn job_state(&self, key: &str) -> Result<JobState> {
        self.job_run(key, |run| Ok(run.poll()))
    }

    fn job_results(&self, key: &str) -> Result<Vec<JobResult>> {
        self.job_run(key, |run| Ok(run.results()))
    }

    fn job_error(&self, key: &str) -> Result<String> {
        self.job_run(key, |run| Ok(run.error()))
    }

    fn job_progress(&self, key: &str) -> Result<JobProgress> {
        self.job_run(key, |run| Ok(run.progress()))
    }

    fn job_ray_paths(&self, key: &str) -> Result<Vec<RayPath>> {
        self.job_run(key, |run| Ok(run.ray_paths()))
    }
}
