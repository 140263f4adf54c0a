// MIT License
// Copyright 2023--present optirpc developers

//! # optirpc-core
//!
//! Client library for an optical simulation database service.
//!
//! The service stores spectra, intensity distributions, surface and volume
//! optical properties, source/sensor/simulation templates, part geometry,
//! scenes and jobs, each in its own collection and addressed by opaque
//! string keys. This crate gives those entities a typed, synchronous
//! surface.
//!
//! ## Layers
//!
//! - **[`connection`]**: one [`Connection`] per server, with a readiness
//!   probe and one [`Collection`] per [`EntityKind`].
//! - **[`collection`] / [`link`]**: typed CRUD and the
//!   `(collection, key)` handle that reads, writes and deletes a single
//!   entity.
//! - **[`registry`] / [`resolver`]**: find the collection owning a bare
//!   key, and expand the `_guid`/`_guids` references of a message into the
//!   entities they name.
//! - **[`feature`] / [`project`] / [`scene`]**: edit scene instances
//!   together with their templates, and index what a scene contains.
//! - **[`assembly`]**: merge several project files into one scene,
//!   prefixing geo paths by file.
//! - **[`job`]**: start, poll and collect simulation jobs.
//!
//! Transports implement [`Backend`]. [`memory::MemoryDatabase`] is an
//! in-process implementation; with the `rpc` feature, [`rpc`] provides a
//! Cap'n Proto client and server.
//!
//! ## C API
//!
//! [`c_api`] and [`status`] expose connections and collections to C with
//! JSON payloads. Build with `--features gen-header` to regenerate
//! `include/optirpc.h` through cbindgen.
//!
//! ## Example
//!
//! ```
//! use optirpc_core::messages::SopTemplate;
//! use optirpc_core::{Connection, MemoryDatabase};
//!
//! let conn = Connection::memory(MemoryDatabase::new())?;
//! let sops = conn.sop_templates()?;
//! let mirror = sops.create(&SopTemplate::mirror("Mirror_90", 90.0))?;
//! mirror.set(&SopTemplate::mirror("Mirror_50", 50.0))?;
//! assert_eq!(mirror.get()?.name, "Mirror_50");
//! # Ok::<(), optirpc_core::Error>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod assembly;
pub mod backend;
pub mod c_api;
pub mod collection;
pub mod connection;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod job;
pub mod kind;
pub mod link;
pub mod memory;
pub mod messages;
pub mod project;
pub mod registry;
pub mod resolver;
pub mod scene;
pub mod status;

#[cfg(feature = "rpc")]
#[cfg_attr(docsrs, doc(cfg(feature = "rpc")))]
pub mod rpc;

pub use assembly::{combine, insert, CombineOptions, FileInstance, SourceNaming};
pub use backend::Backend;
pub use collection::{Collection, RawCollection};
pub use connection::{Connection, ConnectionConfig};
pub use error::{Error, Result};
pub use feature::{Feature, InstanceFeature};
pub use geometry::{AxisSystem, GeoPath};
pub use job::{JobPolling, JobState};
pub use kind::EntityKind;
pub use link::{AnyLink, Link};
pub use memory::MemoryDatabase;
pub use messages::Message;
pub use project::Project;
pub use registry::{KeyResolver, ProbingRegistry};
pub use resolver::{CyclePolicy, Resolver};
pub use status::optirpc_status_t;
