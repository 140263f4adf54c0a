// MIT License
// Copyright 2023--present optirpc developers

use optirpc_core::messages::{Scene, SopTemplate, Spectrum};
use optirpc_core::{Connection, EntityKind, Error, KeyResolver, MemoryDatabase};

fn connect() -> (MemoryDatabase, Connection) {
    let db = MemoryDatabase::new();
    let conn = Connection::memory(db.clone()).unwrap();
    (db, conn)
}

#[test]
fn mirror_is_created_updated_and_deleted() {
    let (db, conn) = connect();
    let sops = conn.sop_templates().unwrap();

    let mut mirror = sops.create(&SopTemplate::mirror("Mirror_90", 90.0)).unwrap();
    assert_eq!(mirror.get().unwrap(), SopTemplate::mirror("Mirror_90", 90.0));

    mirror.set(&SopTemplate::mirror("Mirror_50", 50.0)).unwrap();
    let stored = sops.read(&mirror).unwrap();
    assert_eq!(stored.name, "Mirror_50");

    let key = mirror.key().to_string();
    mirror.delete().unwrap();
    assert!(mirror.is_detached());
    assert!(matches!(mirror.get().unwrap_err(), Error::DetachedLink { .. }));

    let stale = sops.link(key);
    assert!(matches!(
        stale.get().unwrap_err(),
        Error::NotFound { kind: EntityKind::SopTemplate, .. }
    ));
    assert_eq!(db.len(EntityKind::SopTemplate), 0);
}

#[test]
fn server_rejection_is_surfaced_verbatim() {
    let (_, conn) = connect();
    let err = conn
        .sop_templates()
        .unwrap()
        .create(&SopTemplate::mirror("Too_bright", 150.0))
        .unwrap_err();
    match err {
        Error::RemoteRejected { code, name, message } => {
            assert_eq!(code, 5);
            assert_eq!(name, "OutOfRange");
            assert!(message.contains("150"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn links_refuse_a_foreign_collection() {
    let (_, conn) = connect();
    let other = Connection::memory(MemoryDatabase::new()).unwrap();

    let spectrum = conn
        .spectrums()
        .unwrap()
        .create(&Spectrum::monochromatic("Green", 555.0))
        .unwrap();

    let err = other.spectrums().unwrap().read(&spectrum).unwrap_err();
    assert!(matches!(err, Error::WrongCollection { .. }), "{err}");
}

#[test]
fn registry_finds_keys_of_any_kind() {
    let (_, conn) = connect();
    let scene = conn.scenes().unwrap().create(&Scene::named("Bench")).unwrap();
    let sop = conn
        .sop_templates()
        .unwrap()
        .create(&SopTemplate::optical_polished("Polished"))
        .unwrap();

    let registry = conn.registry().unwrap();
    assert_eq!(registry.lookup(scene.key()).unwrap().kind(), EntityKind::Scene);
    assert_eq!(registry.lookup(sop.key()).unwrap().kind(), EntityKind::SopTemplate);
    assert!(matches!(
        registry.lookup("no-such-key").unwrap_err(),
        Error::KeyNotFoundInAnyCollection { .. }
    ));
}

#[test]
fn closing_the_connection_stops_every_link() {
    let (_, conn) = connect();
    let scene = conn.scenes().unwrap().create(&Scene::named("Bench")).unwrap();
    conn.close();
    assert!(matches!(
        scene.get().unwrap_err(),
        Error::TransportUnavailable { .. }
    ));
}
