//! Key resolution against the in-memory sample network.
#![cfg(feature = "testing")]

use olx_core::testing::{sample_session, MockEngine, SAMPLE_PATH};
use olx_core::{EntityKind, GenericEntity, Key, OlxConfig, OlxError, Session};

/// Every object survives key string and constructor string round trips.
#[test]
fn test_key_and_ctor_round_trip_for_every_entity() {
    let session = sample_session().unwrap();
    let mut seen = 0;
    for kind in EntityKind::ALL {
        for entity in session.all(kind).unwrap() {
            let key = entity.key_string(&session).unwrap();
            let by_key = session.resolve_str(kind, &key).unwrap();
            assert_eq!(by_key, entity, "key string {key}");

            let ctor = entity.ctor_string(&session).unwrap();
            let by_ctor = GenericEntity::from_ctor_string(&session, &ctor).unwrap();
            assert_eq!(by_ctor, entity, "constructor string {ctor}");
            seen += 1;
        }
    }
    assert!(seen > 40, "only {seen} objects visited");
}

/// Bus numbers, names, name and kV pairs, display strings and GUIDs agree.
#[test]
fn test_bus_key_shapes() {
    let session = sample_session().unwrap();
    let by_display = session.resolve_str(EntityKind::Bus, "[BUS] 'OHIO' 132 kV").unwrap();
    let by_number = session.resolve(EntityKind::Bus, &Key::Number(2)).unwrap();
    let by_name = session.resolve_str(EntityKind::Bus, "OHIO").unwrap();
    let by_pair = session
        .resolve(
            EntityKind::Bus,
            &Key::Composite(vec![Key::Name("OHIO".into()), Key::Real(132.0)]),
        )
        .unwrap();
    assert_eq!(by_display, by_number);
    assert_eq!(by_display, by_name);
    assert_eq!(by_display, by_pair);

    let guid = by_display.get(&session, "GUID").unwrap();
    let by_guid = session
        .resolve_str(EntityKind::Bus, &guid.as_str().unwrap().to_ascii_lowercase())
        .unwrap();
    assert_eq!(by_guid, by_display);

    let low_side = session.resolve_str(EntityKind::Bus, "[BUS] 'CLAYTOR' 13.8 kV").unwrap();
    assert_eq!(low_side.get(&session, "NO").unwrap().as_int(), Some(7));
}

/// A name shared by several buses is rejected unless configured otherwise.
#[test]
fn test_ambiguous_bus_name() {
    let session = sample_session().unwrap();
    let err = session.resolve_str(EntityKind::Bus, "NEVADA").unwrap_err();
    assert!(matches!(err, OlxError::InvalidKey { ref reason, .. } if reason.contains("2 buses")));

    let mut config = OlxConfig::default();
    config.session.ambiguous_bus_names_fail = false;
    let mut lenient = Session::new(Box::new(MockEngine::sample()), config);
    lenient.open(SAMPLE_PATH, false).unwrap();
    let first = lenient.resolve_str(EntityKind::Bus, "NEVADA").unwrap();
    assert_eq!(first.get(&lenient, "KV").unwrap().as_float(), Some(132.0));
}

/// Two-bus branches resolve in either bus order.
#[test]
fn test_branch_in_either_direction() {
    let session = sample_session().unwrap();
    let forward = session
        .resolve_str(EntityKind::Line, "LINE(BUS('NEVADA', 132), BUS('OHIO', 132), '1')")
        .unwrap();
    let backward = session
        .resolve_str(EntityKind::Line, "LINE(BUS('OHIO', 132), BUS('NEVADA', 132), '1')")
        .unwrap();
    assert_eq!(forward, backward);
    assert_eq!(
        forward.key_string(&session).unwrap(),
        "[LINE] 'NEVADA' 132 kV - 'OHIO' 132 kV 1"
    );

    let missing = session
        .find(
            EntityKind::Line,
            &Key::parse("LINE(BUS('NEVADA', 132), BUS('OHIO', 132), '2')"),
        )
        .unwrap();
    assert!(missing.is_none());
}

/// A key naming an object of another kind is an invalid key, not a miss.
#[test]
fn test_kind_mismatch_is_invalid() {
    let session = sample_session().unwrap();
    let err = session
        .resolve_str(EntityKind::Line, "[BUS] 'OHIO' 132 kV")
        .unwrap_err();
    assert!(matches!(err, OlxError::InvalidKey { kind: EntityKind::Line, .. }));

    let err = session.resolve(EntityKind::Line, &Key::Number(2)).unwrap_err();
    assert!(matches!(err, OlxError::InvalidKey { .. }));

    let err = session
        .resolve_str(EntityKind::Bus, "[BUS] 'NOWHERE' 1 kV")
        .unwrap_err();
    assert!(err.is_not_found());
}

/// Family tags try the requested relay variant and report its sibling.
#[test]
fn test_relay_family_tags() {
    let session = sample_session().unwrap();
    let body = "'NV-G1' on 'NEVADA' 132 kV - 'OHIO' 132 kV 1 L";
    let ground = session
        .resolve_str(EntityKind::RelayOcGround, &format!("[OCRLY] {body}"))
        .unwrap();
    assert_eq!(
        ground,
        session
            .resolve_str(EntityKind::RelayOcGround, &format!("[OCRLYG] {body}"))
            .unwrap()
    );

    let err = session
        .resolve_str(EntityKind::RelayOcPhase, &format!("[OCRLY] {body}"))
        .unwrap_err();
    assert!(matches!(err, OlxError::InvalidKey { ref reason, .. } if reason.contains("OCRLYG")));
}

/// Either legacy tag of a split device yields the same ground-primary entity.
#[test]
fn test_split_device_tags() {
    let session = sample_session().unwrap();
    let body = "'R1' on 'OHIO' 132 kV - 'NEVADA' 132 kV 1 L";
    let joined = session
        .resolve_str(EntityKind::Recloser, &format!("[RECLSR] {body}"))
        .unwrap();
    let ground = session
        .resolve_str(EntityKind::Recloser, &format!("[RECLSRG] {body}"))
        .unwrap();
    let phase = session
        .resolve_str(EntityKind::Recloser, &format!("[RECLSRP] {body}"))
        .unwrap();
    assert_eq!(joined, ground);
    assert_eq!(joined, phase);
    assert!(joined.companion().is_some());
    assert_eq!(phase.companion(), joined.companion());
    assert_eq!(session.all(EntityKind::Recloser).unwrap().len(), 1);
}

/// Entity keys are checked against the session they were taken from.
#[test]
fn test_entity_keys() {
    let mut session = sample_session().unwrap();
    let bus = session.resolve(EntityKind::Bus, &Key::Number(1)).unwrap();
    let again = session
        .resolve(EntityKind::Bus, &Key::Entity(bus.entity_ref()))
        .unwrap();
    assert_eq!(again, bus);

    let err = session
        .resolve(EntityKind::Line, &Key::Entity(bus.entity_ref()))
        .unwrap_err();
    assert!(matches!(err, OlxError::InvalidKey { .. }));

    session.open(SAMPLE_PATH, false).unwrap();
    let err = session
        .resolve(EntityKind::Bus, &Key::Entity(bus.entity_ref()))
        .unwrap_err();
    assert!(matches!(err, OlxError::StaleHandle { .. }));
}

/// Malformed keys fail before reaching the engine.
#[test]
fn test_malformed_keys() {
    let session = sample_session().unwrap();
    assert!(matches!(
        session.resolve_str(EntityKind::Bus, "[BUS 'OHIO' 132 kV"),
        Err(OlxError::InvalidKey { .. })
    ));
    assert!(matches!(
        session.resolve(
            EntityKind::Line,
            &Key::Composite(vec![Key::Number(1), Key::Number(2)])
        ),
        Err(OlxError::InvalidKey { .. })
    ));
    assert!(matches!(
        GenericEntity::from_ctor_string(&session, "LINE(BUS('NEVADA', 132)"),
        Err(OlxError::Parse(_))
    ));
}
