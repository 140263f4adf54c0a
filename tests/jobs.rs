// MIT License
// Copyright 2023--present optirpc developers

use std::time::Duration;

use optirpc_core::memory::fixture;
use optirpc_core::messages::{
    InteractiveProperties, JobProperties, RaysNumberPerSource, SimulationInstance,
};
use optirpc_core::{Connection, Error, JobPolling, JobState, MemoryDatabase, Project};

fn lamp() -> (MemoryDatabase, Project) {
    let db = MemoryDatabase::new().with_job_duration(5);
    db.register_file("Lamp.speos", None, fixture::lamp_project("Lamp", "Light.1"));
    let conn = Connection::memory(db.clone()).unwrap();
    let project = Project::from_file(&conn, "Lamp.speos", None).unwrap();
    (db, project)
}

fn polling() -> JobPolling {
    JobPolling {
        interval: Duration::from_millis(1),
        max_polls: Some(300),
    }
}

#[test]
fn direct_job_runs_to_completion() {
    let (_, project) = lamp();
    let job = project
        .create_job("Run", "", JobProperties::direct_mc())
        .unwrap();
    assert_eq!(job.get().unwrap().simulation_path, "Direct.1");
    assert_eq!(job.get_state().unwrap(), JobState::Unstarted);

    job.start().unwrap();
    let state = job.wait_until_terminal(&polling()).unwrap();
    assert_eq!(state, JobState::Finished);

    let results = job.get_results().unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.path.ends_with(".xmp")));
    assert_eq!(job.get_error().unwrap(), "");
    assert_eq!(job.get_progress().unwrap().progress, 1.0);
}

#[test]
fn stopped_job_stays_stopped() {
    let (_, project) = lamp();
    let job = project
        .create_job("Run", "Direct.1", JobProperties::direct_mc())
        .unwrap();
    job.start().unwrap();
    job.stop().unwrap();
    assert_eq!(job.wait_until_terminal(&polling()).unwrap(), JobState::Stopped);
}

#[test]
fn interactive_job_reports_ray_paths() {
    let (_, project) = lamp();
    let properties = JobProperties::InteractiveSimulationProperties(InteractiveProperties {
        rays_number_per_sources: vec![RaysNumberPerSource {
            source_path: "Light.1".into(),
            rays_nb: 3,
        }],
        ..Default::default()
    });
    let job = project.create_job("Preview", "", properties).unwrap();
    job.start().unwrap();
    job.wait_until_terminal(&polling()).unwrap();
    let paths = job.get_ray_paths().unwrap();
    assert_eq!(paths.len(), 3);
    assert!(paths.iter().all(|p| p.source_path == "Light.1"));
}

#[test]
fn unknown_simulation_is_refused_before_storing() {
    let (db, project) = lamp();
    let jobs_before = db.len(optirpc_core::EntityKind::Job);
    let err = project
        .create_job("Run", "Inverse.1", JobProperties::direct_mc())
        .unwrap_err();
    assert!(matches!(err, Error::DanglingNameReference { .. }), "{err}");
    assert_eq!(db.len(optirpc_core::EntityKind::Job), jobs_before);
}

#[test]
fn dangling_sensor_fails_validation() {
    let (_, project) = lamp();
    let mut scene = project.scene().get().unwrap();
    scene.simulations.push(SimulationInstance {
        name: "Broken".into(),
        sensor_paths: vec!["Camera.9".into()],
        ..Default::default()
    });
    project.scene().set(&scene).unwrap();

    let err = project
        .create_job("Run", "Broken", JobProperties::direct_mc())
        .unwrap_err();
    match err {
        Error::DanglingNameReference { reference, list, .. } => {
            assert_eq!(reference, "Camera.9");
            assert_eq!(list, "sensors");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn bounded_polling_times_out() {
    let (_, project) = lamp();
    let job = project
        .create_job("Run", "", JobProperties::direct_mc())
        .unwrap();
    job.start().unwrap();
    let short = JobPolling {
        interval: Duration::from_millis(1),
        max_polls: Some(2),
    };
    assert!(matches!(
        job.wait_until_terminal(&short).unwrap_err(),
        Error::Timeout { .. }
    ));
    job.stop().unwrap();
}
