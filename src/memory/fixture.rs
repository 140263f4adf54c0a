// MIT License
// Copyright 2023--present optirpc developers

//! Canned project files for [`MemoryDatabase::register_file`].

use super::MemoryDatabase;
use crate::backend::Backend;
use crate::error::Result;
use crate::geometry::{GeoPathWithReverseNormal, GeoPaths};
use crate::messages::{
    Body, ExitanceConstant, Face, IntensityTemplate, MaterialInstance, Message, Part, Scene,
    SensorInstance, SensorPlacement, SensorProperties, SensorTemplate, SimulationInstance,
    SimulationTemplate, SopTemplate, SourceInstance, SourceProperties, SourceTemplate, Spectrum,
    SurfaceSourceProperties, VopTemplate,
};

fn store<M: Message>(db: &MemoryDatabase, message: &M) -> Result<String> {
    db.create(M::KIND, serde_json::to_value(message)?)
}

/// A single-body lamp: part `part_name` holding "Body.1" with one triangle
/// face "Face.1", a mirror material on that body, a material with no
/// surface property, a surface source `source_name` emitting from the
/// face, an irradiance sensor "Irradiance.1" and a direct simulation
/// "Direct.1" that uses both.
pub fn lamp_project(
    part_name: &str,
    source_name: &str,
) -> impl Fn(&MemoryDatabase) -> Result<Scene> + Send + Sync + 'static {
    let part_name = part_name.to_string();
    let source_name = source_name.to_string();
    move |db| {
        let face = store(
            db,
            &Face {
                name: "Face.1".into(),
                vertices: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                facets: vec![0, 1, 2],
                normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
                ..Default::default()
            },
        )?;
        let body = store(
            db,
            &Body {
                name: "Body.1".into(),
                face_guids: vec![face],
                ..Default::default()
            },
        )?;
        let part = store(
            db,
            &Part {
                body_guids: vec![body],
                ..Part::named(part_name.clone())
            },
        )?;

        let mirror = store(db, &SopTemplate::mirror("Mirror_90", 90.0))?;
        let opaque = store(db, &VopTemplate::opaque("Opaque"))?;
        let spectrum = store(db, &Spectrum::blackbody("Blackbody_2856", 2856.0))?;
        let intensity = store(db, &IntensityTemplate::lambertian("Lambertian", 180.0))?;
        let source = store(
            db,
            &SourceTemplate::surface("Surface", 6000.0, intensity, spectrum),
        )?;
        let sensor = store(db, &SensorTemplate::irradiance("Irradiance"))?;
        let simulation = store(db, &SimulationTemplate::direct("Direct"))?;

        Ok(Scene {
            part_guid: part,
            materials: vec![
                MaterialInstance {
                    name: "Material.1".into(),
                    vop_guid: opaque.clone(),
                    sop_guids: vec![mirror],
                    geometries: Some(GeoPaths::new(["Body.1"])),
                    ..Default::default()
                },
                MaterialInstance {
                    name: "Volume.1".into(),
                    vop_guid: opaque,
                    ..Default::default()
                },
            ],
            sources: vec![SourceInstance {
                name: source_name.clone(),
                source_guid: source,
                properties: Some(SourceProperties::SurfaceProperties(SurfaceSourceProperties {
                    exitance_constant_properties: Some(ExitanceConstant {
                        geo_paths: vec![GeoPathWithReverseNormal {
                            geo_path: "Body.1/Face.1".into(),
                            reverse_normal: false,
                        }],
                    }),
                    intensity_properties: None,
                })),
                ..Default::default()
            }],
            sensors: vec![SensorInstance {
                name: "Irradiance.1".into(),
                sensor_guid: sensor,
                properties: Some(SensorProperties::IrradianceProperties(
                    SensorPlacement::default(),
                )),
                ..Default::default()
            }],
            simulations: vec![SimulationInstance {
                name: "Direct.1".into(),
                simulation_guid: simulation,
                sensor_paths: vec!["Irradiance.1".into()],
                source_paths: vec![source_name.clone()],
                geometries: None,
                ..Default::default()
            }],
            ..Scene::named(part_name.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::EntityKind;

    #[test]
    fn lamp_project_stores_a_consistent_scene() {
        let db = MemoryDatabase::new();
        let scene = lamp_project("Car", "Light.1")(&db).unwrap();
        scene.validate_references().unwrap();
        assert_eq!(db.len(EntityKind::Face), 1);
        assert_eq!(db.len(EntityKind::Part), 1);
        assert_eq!(scene.name, "Car");
        assert_eq!(scene.sources[0].name, "Light.1");
        assert!(scene.materials[0].has_sop());
        assert!(!scene.materials[1].has_sop());
    }
}
