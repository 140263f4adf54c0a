// MIT License
// Copyright 2023--present optirpc developers

//! Cap'n Proto transport for the [`Backend`](crate::backend::Backend) surface.
//!
//! This module is only compiled when the `rpc` Cargo feature is enabled.
//!
//! ## Schema
//!
//! [`optics_capnp`] holds the code generated from `schema/optics.capnp` by
//! `capnpc` during `build.rs`. The `Database` interface mirrors the backend
//! one method per operation. Entity payloads travel as JSON in `Data`
//! fields, and every fallible reply carries an optional `Fault` with the
//! server's `(code, name, message)`.
//!
//! ## Client
//!
//! [`client::RpcClient`] implements `Backend` over TCP. It owns a tokio
//! runtime so that the blocking collection API can drive async I/O, and
//! applies the configured per-call deadline.
//!
//! ## Server
//!
//! [`server::serve`] exposes any backend (typically a
//! [`MemoryDatabase`](crate::memory::MemoryDatabase)) on `host:port` and
//! blocks the calling thread; [`server::spawn`] does the same on a
//! background thread. `optirpc_rpc_server_start` is the C entry point.

pub mod optics_capnp {
    include!(concat!(env!("OUT_DIR"), "/optics_capnp.rs"));
}

pub mod client;
pub mod server;

use crate::job::JobState;
use crate::kind::EntityKind;

pub(crate) fn kind_to_wire(kind: EntityKind) -> optics_capnp::EntityKind {
    use optics_capnp::EntityKind as W;
    match kind {
        EntityKind::Spectrum => W::Spectrum,
        EntityKind::IntensityTemplate => W::IntensityTemplate,
        EntityKind::SopTemplate => W::SopTemplate,
        EntityKind::VopTemplate => W::VopTemplate,
        EntityKind::SourceTemplate => W::SourceTemplate,
        EntityKind::SensorTemplate => W::SensorTemplate,
        EntityKind::SimulationTemplate => W::SimulationTemplate,
        EntityKind::Part => W::Part,
        EntityKind::Body => W::Body,
        EntityKind::Face => W::Face,
        EntityKind::Scene => W::Scene,
        EntityKind::Job => W::Job,
    }
}

pub(crate) fn kind_from_wire(kind: optics_capnp::EntityKind) -> EntityKind {
    use optics_capnp::EntityKind as W;
    match kind {
        W::Spectrum => EntityKind::Spectrum,
        W::IntensityTemplate => EntityKind::IntensityTemplate,
        W::SopTemplate => EntityKind::SopTemplate,
        W::VopTemplate => EntityKind::VopTemplate,
        W::SourceTemplate => EntityKind::SourceTemplate,
        W::SensorTemplate => EntityKind::SensorTemplate,
        W::SimulationTemplate => EntityKind::SimulationTemplate,
        W::Part => EntityKind::Part,
        W::Body => EntityKind::Body,
        W::Face => EntityKind::Face,
        W::Scene => EntityKind::Scene,
        W::Job => EntityKind::Job,
    }
}

pub(crate) fn state_to_wire(state: JobState) -> optics_capnp::JobState {
    use optics_capnp::JobState as W;
    match state {
        JobState::Unstarted => W::Unstarted,
        JobState::Running => W::Running,
        JobState::Finished => W::Finished,
        JobState::Stopped => W::Stopped,
        JobState::InError => W::InError,
    }
}

pub(crate) fn state_from_wire(state: optics_capnp::JobState) -> JobState {
    use optics_capnp::JobState as W;
    match state {
        W::Unstarted => JobState::Unstarted,
        W::Running => JobState::Running,
        W::Finished => JobState::Finished,
        W::Stopped => JobState::Stopped,
        W::InError => JobState::InError,
    }
}
