// MIT License
// Copyright 2023--present optirpc developers

#![cfg(feature = "rpc")]

use std::sync::Arc;
use std::time::Duration;

use optirpc_core::memory::fixture;
use optirpc_core::messages::{JobProperties, SopTemplate};
use optirpc_core::rpc::server;
use optirpc_core::{
    Connection, ConnectionConfig, EntityKind, Error, JobPolling, JobState, MemoryDatabase, Project,
};

fn serve(db: MemoryDatabase) -> Connection {
    let addr = server::spawn(Arc::new(db), "127.0.0.1", 0).unwrap();
    let config = ConnectionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        connect_timeout: Duration::from_secs(10),
        health_poll_interval: Duration::from_millis(20),
        rpc_timeout: Duration::from_secs(10),
    };
    Connection::connect(&config).unwrap()
}

#[test]
fn crud_over_the_wire() {
    let db = MemoryDatabase::new();
    let conn = serve(db.clone());
    let sops = conn.sop_templates().unwrap();

    let mut mirror = sops.create(&SopTemplate::mirror("Mirror_90", 90.0)).unwrap();
    mirror.set(&SopTemplate::mirror("Mirror_50", 50.0)).unwrap();
    assert_eq!(mirror.get().unwrap().name, "Mirror_50");
    assert_eq!(sops.list().unwrap(), vec![mirror.clone()]);
    assert_eq!(db.len(EntityKind::SopTemplate), 1);

    let key = mirror.key().to_string();
    mirror.delete().unwrap();
    assert!(sops.link(key).get().unwrap_err().is_not_found());
}

#[test]
fn faults_keep_the_server_fields() {
    let conn = serve(MemoryDatabase::new());
    let err = conn
        .sop_templates()
        .unwrap()
        .create(&SopTemplate::mirror("Too_bright", 150.0))
        .unwrap_err();
    assert!(
        matches!(err, Error::RemoteRejected { code: 5, ref name, .. } if name == "OutOfRange"),
        "{err}"
    );
}

#[test]
fn job_over_the_wire() {
    let db = MemoryDatabase::new();
    db.register_file("Lamp.speos", None, fixture::lamp_project("Lamp", "Light.1"));
    let conn = serve(db);

    let project = Project::from_file(&conn, "Lamp.speos", None).unwrap();
    let job = project
        .create_job("Run", "", JobProperties::direct_mc())
        .unwrap();
    job.start().unwrap();
    let polling = JobPolling {
        interval: Duration::from_millis(1),
        max_polls: Some(300),
    };
    assert_eq!(job.wait_until_terminal(&polling).unwrap(), JobState::Finished);
    assert!(!job.get_results().unwrap().is_empty());
}
