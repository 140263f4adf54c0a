// MIT License
// Copyright 2023--present optirpc developers

//! The RPC surface every transport implements.
//!
//! Payloads are JSON documents: the typed layer above (collections and
//! links) owns the conversion to and from [`crate::messages`]. Keys are
//! opaque strings; the kind travels beside them because keys carry no type
//! tag.

use serde_json::Value;

use crate::error::Result;
use crate::job::{JobProgress, JobResult, JobState, RayPath};
use crate::kind::EntityKind;

/// Operations offered by a simulation database.
///
/// Implementations must be shareable between threads; the crate never adds
/// locking of its own on top of a backend.
pub trait Backend: Send + Sync {
    /// Human-readable address of the server, used in error messages.
    fn target(&self) -> String;

    /// Readiness probe. `Ok(false)` means "not yet", an error means the
    /// transport itself failed.
    fn health(&self) -> Result<bool>;

    fn create(&self, kind: EntityKind, payload: Value) -> Result<String>;
    fn read(&self, kind: EntityKind, key: &str) -> Result<Value>;
    fn update(&self, kind: EntityKind, key: &str, payload: Value) -> Result<()>;
    fn delete(&self, kind: EntityKind, key: &str) -> Result<()>;
    fn list(&self, kind: EntityKind) -> Result<Vec<String>>;

    /// Populate the scene `scene_key` (and the parts, templates and
    /// geometry it needs) from a project file.
    fn load_file(&self, scene_key: &str, file_uri: &str, password: Option<&str>) -> Result<()>;

    fn job_start(&self, key: &str) -> Result<()>;
    fn job_stop(&self, key: &str) -> Result<()>;
    fn job_state(&self, key: &str) -> Result<JobState>;
    /// Empty until the job is terminal.
    fn job_results(&self, key: &str) -> Result<Vec<JobResult>>;
    /// Empty unless the job ended in error.
    fn job_error(&self, key: &str) -> Result<String>;
    fn job_progress(&self, key: &str) -> Result<JobProgress>;
    /// Only interactive jobs produce ray paths.
    fn job_ray_paths(&self, key: &str) -> Result<Vec<RayPath>>;
}
