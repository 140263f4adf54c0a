// MIT License
// Copyright 2023--present optirpc developers

//! Part tree: parts hold placed sub-parts and bodies, bodies hold faces.

use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::geometry::AxisSystem;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Part {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub body_guids: Vec<String>,
    pub parts: Vec<PartInstance>,
}

/// A sub-part placed inside its parent. Its name is the first segment of
/// every geo path that addresses geometry below it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartInstance {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub part_guid: String,
    pub axis_system: AxisSystem,
}

impl Part {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn sub_part(&self, name: &str) -> Option<&PartInstance> {
        self.parts.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Body {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub face_guids: Vec<String>,
}

/// Triangulated face. `vertices` and `normals` are flat xyz triples,
/// `facets` indexes vertices three at a time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Face {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub vertices: Vec<f64>,
    pub facets: Vec<u32>,
    pub normals: Vec<f64>,
}

impl Face {
    pub fn triangle_count(&self) -> usize {
        self.facets.len() / 3
    }
}
