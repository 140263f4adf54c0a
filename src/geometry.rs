// MIT License
// Copyright 2023--present optirpc developers

//! Geo paths and axis systems.
//!
//! A geo path addresses one node of the part tree by name:
//! `<sub-part>/<sub-part>/.../<body>/<face>`. Segments are joined with `/`,
//! compared case sensitively, and never contain `/` themselves. Empty
//! segments address the root. Geo paths are stored as plain strings inside
//! scene instances; [`GeoPath`] is the validated form used when rewriting
//! them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between geo-path segments.
pub const SEPARATOR: char = '/';

/// A parsed geo path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GeoPath {
    segments: Vec<String>,
}

impl GeoPath {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from individual names, rejecting names containing `/`.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            check_name(segment)?;
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.iter().all(String::is_empty)
    }

    /// `self` placed under a sub-part called `ident`.
    pub fn prefixed(&self, ident: &str) -> Result<Self> {
        check_name(ident)?;
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.push(ident.to_string());
        segments.extend(self.segments.iter().cloned());
        Ok(Self { segments })
    }

    /// `true` when `self` is `other` or lies beneath it.
    pub fn starts_with(&self, other: &GeoPath) -> bool {
        other.segments.len() <= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.contains(SEPARATOR) {
        return Err(Error::InvalidGeoPath {
            path: name.to_string(),
            reason: "a name cannot contain '/'",
        });
    }
    Ok(())
}

impl FromStr for GeoPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self {
            segments: s.split(SEPARATOR).map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for GeoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Prefix a stored geo-path string with `<ident>/`.
///
/// The root path becomes `ident` itself.
pub fn prefix_geo_path(ident: &str, path: &str) -> Result<String> {
    let parsed: GeoPath = path.parse()?;
    if parsed.is_root() {
        check_name(ident)?;
        return Ok(ident.to_string());
    }
    Ok(parsed.prefixed(ident)?.to_string())
}

/// A list of geo paths, as carried by materials and simulations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoPaths {
    pub geo_paths: Vec<String>,
}

impl GeoPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            geo_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Prefix every path with `<ident>/`.
    pub fn prefix_all(&mut self, ident: &str) -> Result<()> {
        for path in &mut self.geo_paths {
            *path = prefix_geo_path(ident, path)?;
        }
        Ok(())
    }
}

/// A geo path with the orientation of its emitting side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoPathWithReverseNormal {
    pub geo_path: String,
    pub reverse_normal: bool,
}

/// Tolerance used by [`AxisSystem::is_orthonormal`].
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// Origin followed by the X, Y and Z directions:
/// `[Ox Oy Oz Xx Xy Xz Yx Yy Yz Zx Zy Zz]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisSystem(pub [f64; 12]);

impl Default for AxisSystem {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AxisSystem {
    pub const IDENTITY: AxisSystem =
        AxisSystem([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// Identity orientation moved to `origin`.
    pub fn translated(origin: [f64; 3]) -> Self {
        let mut values = Self::IDENTITY.0;
        values[..3].copy_from_slice(&origin);
        Self(values)
    }

    pub fn origin(&self) -> [f64; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    pub fn x(&self) -> [f64; 3] {
        [self.0[3], self.0[4], self.0[5]]
    }

    pub fn y(&self) -> [f64; 3] {
        [self.0[6], self.0[7], self.0[8]]
    }

    pub fn z(&self) -> [f64; 3] {
        [self.0[9], self.0[10], self.0[11]]
    }

    /// Directions have unit length and are pairwise orthogonal.
    pub fn is_orthonormal(&self) -> bool {
        let axes = [self.x(), self.y(), self.z()];
        let dot = |a: [f64; 3], b: [f64; 3]| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
        axes.iter()
            .all(|&a| (dot(a, a) - 1.0).abs() <= ORTHONORMAL_TOLERANCE)
            && dot(axes[0], axes[1]).abs() <= ORTHONORMAL_TOLERANCE
            && dot(axes[0], axes[2]).abs() <= ORTHONORMAL_TOLERANCE
            && dot(axes[1], axes[2]).abs() <= ORTHONORMAL_TOLERANCE
    }
}

impl From<[f64; 12]> for AxisSystem {
    fn from(values: [f64; 12]) -> Self {
        Self(values)
    }
}
