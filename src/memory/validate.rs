// MIT License
// Copyright 2023--present optirpc developers

//! Domain checks applied to every stored payload.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::rejected;
use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::messages::{
    Body, Face, IntensityDefinition, IntensityTemplate, Job, Part, Scene, SensorTemplate,
    SimulationTemplate, SopDefinition, SopTemplate, SourceDefinition, SourceTemplate, Spectrum,
    SpectrumDefinition, VopDefinition, VopTemplate,
};
use crate::status::optirpc_status_t;

fn out_of_range(message: String) -> Error {
    rejected(optirpc_status_t::OPTIRPC_REJECTED, "OutOfRange", message)
}

fn decode<M: DeserializeOwned>(kind: EntityKind, payload: &Value) -> Result<M> {
    serde_json::from_value(payload.clone()).map_err(|e| {
        rejected(
            optirpc_status_t::OPTIRPC_INVALID_PARAMETER,
            "InvalidPayload",
            format!("not a valid {}: {e}", kind.full_name()),
        )
    })
}

pub(super) fn check(kind: EntityKind, payload: &Value) -> Result<()> {
    if !payload.is_object() {
        return Err(rejected(
            optirpc_status_t::OPTIRPC_INVALID_PARAMETER,
            "InvalidPayload",
            format!("{} payload must be an object", kind.full_name()),
        ));
    }
    match kind {
        EntityKind::Spectrum => spectrum(&decode(kind, payload)?),
        EntityKind::IntensityTemplate => intensity(&decode(kind, payload)?),
        EntityKind::SopTemplate => sop(&decode(kind, payload)?),
        EntityKind::VopTemplate => vop(&decode(kind, payload)?),
        EntityKind::SourceTemplate => source(&decode(kind, payload)?),
        EntityKind::SensorTemplate => decode::<SensorTemplate>(kind, payload).map(drop),
        EntityKind::SimulationTemplate => decode::<SimulationTemplate>(kind, payload).map(drop),
        EntityKind::Part => decode::<Part>(kind, payload).map(drop),
        EntityKind::Body => decode::<Body>(kind, payload).map(drop),
        EntityKind::Face => face(&decode(kind, payload)?),
        EntityKind::Scene => decode::<Scene>(kind, payload).map(drop),
        EntityKind::Job => decode::<Job>(kind, payload).map(drop),
    }
}

fn spectrum(spectrum: &Spectrum) -> Result<()> {
    match &spectrum.definition {
        Some(SpectrumDefinition::Monochromatic { wavelength }) if *wavelength <= 0.0 => Err(
            out_of_range(format!("wavelength must be positive, got {wavelength}")),
        ),
        Some(SpectrumDefinition::Blackbody { temperature }) if *temperature <= 0.0 => Err(
            out_of_range(format!("temperature must be positive, got {temperature}")),
        ),
        Some(SpectrumDefinition::Sampled {
            wavelengths,
            values,
        }) if wavelengths.is_empty() || wavelengths.len() != values.len() => {
            Err(out_of_range(format!(
                "sampled spectrum needs as many values as wavelengths ({} vs {})",
                values.len(),
                wavelengths.len()
            )))
        }
        _ => Ok(()),
    }
}

fn angle(total_angle: f64) -> Result<()> {
    if total_angle <= 0.0 || total_angle > 180.0 {
        return Err(out_of_range(format!(
            "total angle must be within ]0, 180], got {total_angle}"
        )));
    }
    Ok(())
}

fn intensity(intensity: &IntensityTemplate) -> Result<()> {
    match &intensity.definition {
        Some(IntensityDefinition::Lambertian { total_angle })
        | Some(IntensityDefinition::Cos { total_angle, .. })
        | Some(IntensityDefinition::SymmetricGaussian { total_angle, .. })
        | Some(IntensityDefinition::AsymmetricGaussian { total_angle, .. }) => angle(*total_angle),
        _ => Ok(()),
    }
}

fn sop(sop: &SopTemplate) -> Result<()> {
    match &sop.definition {
        Some(SopDefinition::Mirror { reflectance }) if !(0.0..=100.0).contains(reflectance) => Err(
            out_of_range(format!("reflectance must be within [0, 100], got {reflectance}")),
        ),
        _ => Ok(()),
    }
}

fn vop(vop: &VopTemplate) -> Result<()> {
    match &vop.definition {
        Some(VopDefinition::Optic {
            index, absorption, ..
        }) if *index < 1.0 || *absorption < 0.0 => Err(out_of_range(format!(
            "optic needs index >= 1 and absorption >= 0, got {index} and {absorption}"
        ))),
        _ => Ok(()),
    }
}

fn source(source: &SourceTemplate) -> Result<()> {
    match &source.definition {
        Some(SourceDefinition::Surface { luminous_flux, .. })
        | Some(SourceDefinition::Luminaire { luminous_flux, .. })
            if *luminous_flux < 0.0 =>
        {
            Err(out_of_range(format!(
                "luminous flux cannot be negative, got {luminous_flux}"
            )))
        }
        _ => Ok(()),
    }
}

fn face(face: &Face) -> Result<()> {
    let vertex_count = face.vertices.len() / 3;
    if face.vertices.len() % 3 != 0 || face.facets.len() % 3 != 0 {
        return Err(out_of_range(format!(
            "face '{}' needs xyz triples and triangle facets",
            face.name
        )));
    }
    if let Some(bad) = face.facets.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(out_of_range(format!(
            "face '{}' facet index {bad} exceeds {vertex_count} vertices",
            face.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reject_name(kind: EntityKind, payload: Value) -> String {
        match check(kind, &payload).unwrap_err() {
            Error::RemoteRejected { name, .. } => name,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reflectance_outside_percent_range_is_rejected() {
        let payload = json!({ "name": "m", "mirror": { "reflectance": 150.0 } });
        assert_eq!(reject_name(EntityKind::SopTemplate, payload), "OutOfRange");
        check(EntityKind::SopTemplate, &json!({ "name": "m", "mirror": { "reflectance": 100.0 } }))
            .unwrap();
    }

    #[test]
    fn wrong_field_types_are_invalid_payloads() {
        let payload = json!({ "name": 3 });
        assert_eq!(reject_name(EntityKind::Scene, payload), "InvalidPayload");
        assert_eq!(reject_name(EntityKind::Scene, json!([1, 2])), "InvalidPayload");
    }

    #[test]
    fn sampled_spectrum_needs_matching_lengths() {
        let payload = json!({ "name": "s", "sampled": { "wavelengths": [400.0, 500.0], "values": [1.0] } });
        assert_eq!(reject_name(EntityKind::Spectrum, payload), "OutOfRange");
    }

    #[test]
    fn facets_must_index_existing_vertices() {
        let payload = json!({ "name": "f", "vertices": [0.0, 0.0, 0.0], "facets": [0, 1, 2] });
        assert_eq!(reject_name(EntityKind::Face, payload), "OutOfRange");
    }

    #[test]
    fn unknown_fields_are_kept_out_of_validation() {
        check(EntityKind::Part, &json!({ "name": "A", "next_guid": "k" })).unwrap();
    }
}
