// MIT License
// Copyright 2023--present optirpc developers

//! Entity kinds served by the database.
//!
//! Keys carry no type tag, so the kind travels next to every key: in
//! [`Link`](crate::link::Link), in every backend call and on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One collection of server-resident entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Spectrum,
    IntensityTemplate,
    SopTemplate,
    VopTemplate,
    SourceTemplate,
    SensorTemplate,
    SimulationTemplate,
    Part,
    Body,
    Face,
    Scene,
    Job,
}

impl EntityKind {
    /// Every kind, in wire order.
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Spectrum,
        EntityKind::IntensityTemplate,
        EntityKind::SopTemplate,
        EntityKind::VopTemplate,
        EntityKind::SourceTemplate,
        EntityKind::SensorTemplate,
        EntityKind::SimulationTemplate,
        EntityKind::Part,
        EntityKind::Body,
        EntityKind::Face,
        EntityKind::Scene,
        EntityKind::Job,
    ];

    /// Stable snake_case name, also used as the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Spectrum => "spectrum",
            EntityKind::IntensityTemplate => "intensity_template",
            EntityKind::SopTemplate => "sop_template",
            EntityKind::VopTemplate => "vop_template",
            EntityKind::SourceTemplate => "source_template",
            EntityKind::SensorTemplate => "sensor_template",
            EntityKind::SimulationTemplate => "simulation_template",
            EntityKind::Part => "part",
            EntityKind::Body => "body",
            EntityKind::Face => "face",
            EntityKind::Scene => "scene",
            EntityKind::Job => "job",
        }
    }

    /// Fully qualified message name, printed as the header of
    /// [`Link::describe`](crate::link::Link::describe).
    pub fn full_name(self) -> &'static str {
        match self {
            EntityKind::Spectrum => "optirpc.spectrum.v1.Spectrum",
            EntityKind::IntensityTemplate => "optirpc.intensity.v1.IntensityTemplate",
            EntityKind::SopTemplate => "optirpc.sop.v1.SOPTemplate",
            EntityKind::VopTemplate => "optirpc.vop.v1.VOPTemplate",
            EntityKind::SourceTemplate => "optirpc.source.v1.SourceTemplate",
            EntityKind::SensorTemplate => "optirpc.sensor.v1.SensorTemplate",
            EntityKind::SimulationTemplate => "optirpc.simulation.v1.SimulationTemplate",
            EntityKind::Part => "optirpc.part.v1.Part",
            EntityKind::Body => "optirpc.part.v1.Body",
            EntityKind::Face => "optirpc.part.v1.Face",
            EntityKind::Scene => "optirpc.scene.v1.Scene",
            EntityKind::Job => "optirpc.job.v2.Job",
        }
    }

    /// Index into [`EntityKind::ALL`].
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_in_index_order() {
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_name("lamp"), None);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&EntityKind::SopTemplate).unwrap();
        assert_eq!(json, "\"sop_template\"");
    }
}
