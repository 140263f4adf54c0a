// MIT License
// Copyright 2023--present optirpc developers

//! Multi-file assembly.
//!
//! [`combine`] builds a new project from several project files; [`insert`]
//! adds files to an existing project. Each file is loaded into a throwaway
//! scene and placed in the target's root part as a sub-part named after the
//! file. Its materials and sources are copied into the target scene with
//! every geo path prefixed by `<file>/`, so `"Car/Body/Face"` addresses
//! geometry of the file `Car`. Sensors and simulations are not imported.
//!
//! Name clashes are never renamed around: they fail with
//! [`Error::NamingConflict`]. The target part and scene are written once,
//! after every file was merged, so a failure leaves them as they were. The
//! part is written back when the scene write fails.

use std::path::Path;

use tracing::{info, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::geometry::{prefix_geo_path, AxisSystem};
use crate::link::Link;
use crate::messages::{Part, PartInstance, Scene};
use crate::project::Project;

/// A project file to merge, with its placement.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInstance {
    pub file_uri: String,
    pub axis_system: AxisSystem,
    /// Sub-part name and geo-path prefix. Empty means the file stem.
    pub name: String,
    pub password: Option<String>,
}

impl FileInstance {
    pub fn new(file_uri: impl Into<String>) -> Self {
        Self {
            file_uri: file_uri.into(),
            axis_system: AxisSystem::IDENTITY,
            name: String::new(),
            password: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn placed(mut self, axis_system: AxisSystem) -> Self {
        self.axis_system = axis_system;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Identifier used for the sub-part and as geo-path prefix.
    pub fn ident(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        Path::new(&self.file_uri)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// How imported source instances are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceNaming {
    /// Keep the file's names; a clash is a conflict.
    #[default]
    Preserve,
    /// Rename to `<file>.<name>` like materials.
    Prefixed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombineOptions {
    pub source_naming: SourceNaming,
}

/// New project holding the geometry, materials and sources of `files`.
pub fn combine(connection: &Connection, files: &[FileInstance], options: &CombineOptions) -> Result<Project> {
    let mut project = Project::new(connection)?;
    let mut part = connection.parts()?.create(&Part::default())?;
    if let Err(e) = merge(&mut project, &part, files, options) {
        discard(part.delete(), "delete root part");
        let mut scene = project.scene().clone();
        discard(scene.delete(), "delete scene");
        return Err(e);
    }
    Ok(project)
}

/// Add the geometry, materials and sources of `files` to `project`. The
/// project's root part is created if its scene has none.
pub fn insert(project: &mut Project, files: &[FileInstance], options: &CombineOptions) -> Result<()> {
    match project.root_part()? {
        Some(part) => merge(project, &part, files, options),
        None => {
            let mut part = project.connection().parts()?.create(&Part::default())?;
            let merged = merge(project, &part, files, options);
            if merged.is_err() {
                discard(part.delete(), "delete root part");
            }
            merged
        }
    }
}

fn discard(cleanup: Result<()>, what: &str) {
    if let Err(e) = cleanup {
        warn!(error = %e, "could not {what} after failed merge");
    }
}

fn merge(project: &mut Project, part_link: &Link<Part>, files: &[FileInstance], options: &CombineOptions) -> Result<()> {
    let mut scene = project.scene().get()?;
    let mut part = part_link.get()?;
    let original = part.clone();

    let mut throwaway = Vec::with_capacity(files.len());
    let merged = merge_files(project, &mut scene, &mut part, files, options, &mut throwaway);
    for mut tmp in throwaway {
        discard(tmp.delete(), "delete throwaway scene");
    }
    merged?;

    part_link.set(&part)?;
    scene.part_guid = part_link.key().to_string();
    if let Err(e) = project.scene().set(&scene) {
        discard(part_link.set(&original), "restore root part");
        return Err(e);
    }
    info!(scene = %project.scene().key(), files = files.len(), "files merged");
    project.refresh()
}

fn merge_files(
    project: &Project,
    scene: &mut Scene,
    part: &mut Part,
    files: &[FileInstance],
    options: &CombineOptions,
    throwaway: &mut Vec<Link<Scene>>,
) -> Result<()> {
    let scenes = project.connection().scenes()?;
    for file in files {
        let tmp = scenes.create(&Scene::default())?;
        throwaway.push(tmp.clone());
        tmp.load_file(&file.file_uri, file.password.as_deref())?;
        import(scene, part, file, tmp.get()?, options)?;
    }
    Ok(())
}

fn import(scene: &mut Scene, part: &mut Part, file: &FileInstance, loaded: Scene, options: &CombineOptions) -> Result<()> {
    let ident = file.ident();
    // rejects an identifier containing '/'
    prefix_geo_path(&ident, "")?;

    if part.sub_part(&ident).is_some() {
        return Err(Error::NamingConflict {
            name: ident.clone(),
            origin: file.file_uri.clone(),
            conflict: "the root part already has a sub-part with this name".to_string(),
        });
    }
    part.parts.push(PartInstance {
        name: ident.clone(),
        part_guid: loaded.part_guid,
        axis_system: file.axis_system,
        ..Default::default()
    });

    for mut material in loaded.materials.into_iter().filter(|m| m.has_sop()) {
        material.name = format!("{ident}.{}", material.name);
        if let Some(geometries) = material.geometries.as_mut() {
            geometries.prefix_all(&ident)?;
        }
        if scene.materials.iter().any(|m| m.name == material.name) {
            return Err(Error::NamingConflict {
                conflict: format!("material '{}' already exists in the target scene", material.name),
                name: material.name,
                origin: ident,
            });
        }
        scene.materials.push(material);
    }

    for mut source in loaded.sources {
        if options.source_naming == SourceNaming::Prefixed {
            source.name = format!("{ident}.{}", source.name);
        }
        for path in source.geo_paths_mut() {
            *path = prefix_geo_path(&ident, path)?;
        }
        if scene.sources.iter().any(|s| s.name == source.name) {
            return Err(Error::NamingConflict {
                conflict: format!(
                    "source '{}' from '{ident}' clashes with a source already in the target scene",
                    source.name
                ),
                name: source.name,
                origin: ident,
            });
        }
        scene.sources.push(source);
    }
    Ok(())
}
