//! Relationship traversal over the sample network.
#![cfg(feature = "testing")]

use olx_core::testing::sample_session;
use olx_core::{EntityKind, GenericEntity, Key, OlxError, RelationshipNavigator, Session};

fn keys(session: &Session, entities: &[GenericEntity]) -> Vec<String> {
    entities
        .iter()
        .map(|e| e.key_string(session).unwrap())
        .collect()
}

/// Terminals and relay groups hang off branch ends.
#[test]
fn test_terminals_and_groups() {
    let session = sample_session().unwrap();
    let nav = RelationshipNavigator::new(&session);
    let nevada = session.resolve_str(EntityKind::Bus, "[BUS] 'NEVADA' 132 kV").unwrap();

    let terminals = nav.terminals(&nevada).unwrap();
    assert_eq!(
        keys(&session, &terminals),
        [
            "[TERMINAL] 'NEVADA' 132 kV - 'OHIO' 132 kV 1 L",
            "[TERMINAL] 'NEVADA' 132 kV - 'CLAYTOR' 132 kV 1 L",
            "[TERMINAL] 'NEVADA' 132 kV - 'NEVADA' 33 kV 1 X",
        ]
    );

    let group = nav.relay_group_at(&terminals[0]).unwrap().unwrap();
    assert_eq!(
        group.key_string(&session).unwrap(),
        "[RLYGROUP] 'NEVADA' 132 kV - 'OHIO' 132 kV 1 L"
    );
    let derived = terminals[0].get(&session, "RLYGROUP").unwrap();
    assert_eq!(derived.as_entity(), Some(&group));

    let ohio = session.resolve_str(EntityKind::Bus, "OHIO").unwrap();
    let switch_end = nav
        .terminals(&ohio)
        .unwrap()
        .into_iter()
        .find(|t| t.key_string(&session).unwrap().ends_with(" W"))
        .unwrap();
    assert!(nav.relay_group_at(&switch_end).unwrap().is_none());
}

/// A group's protected branch is found even when stored in reverse.
#[test]
fn test_protected_equipment() {
    let session = sample_session().unwrap();
    let nav = RelationshipNavigator::new(&session);

    let group = session
        .resolve_str(EntityKind::RelayGroup, "[RLYGROUP] 'NEVADA' 132 kV - 'CLAYTOR' 132 kV 1 L")
        .unwrap();
    let line = nav.protected_equipment(&group).unwrap().unwrap();
    assert_eq!(
        line.key_string(&session).unwrap(),
        "[LINE] 'CLAYTOR' 132 kV - 'NEVADA' 132 kV 1"
    );

    let xfmr_group = session
        .resolve_str(EntityKind::RelayGroup, "[RLYGROUP] 'NEVADA' 132 kV - 'NEVADA' 33 kV 1 X")
        .unwrap();
    let equipment = xfmr_group.get(&session, "EQUIPMENT").unwrap();
    assert_eq!(equipment.as_entity().map(|e| e.kind()), Some(EntityKind::Transformer2W));
}

/// Devices come back ordered by kind, split devices listed once.
#[test]
fn test_group_devices() {
    let session = sample_session().unwrap();
    let nav = RelationshipNavigator::new(&session);

    let nevada_end = session
        .resolve_str(EntityKind::RelayGroup, "[RLYGROUP] 'NEVADA' 132 kV - 'OHIO' 132 kV 1 L")
        .unwrap();
    let kinds: Vec<EntityKind> = nav
        .devices(&nevada_end)
        .unwrap()
        .iter()
        .map(GenericEntity::kind)
        .collect();
    assert_eq!(
        kinds,
        [
            EntityKind::RelayOcGround,
            EntityKind::RelayOcPhase,
            EntityKind::RelayDsGround,
            EntityKind::RelayDsPhase,
            EntityKind::Scheme,
        ]
    );

    let ohio_end = session
        .resolve_str(EntityKind::RelayGroup, "[RLYGROUP] 'OHIO' 132 kV - 'NEVADA' 132 kV 1 L")
        .unwrap();
    let devices = ohio_end.get(&session, "DEVICES").unwrap();
    let devices = devices.as_entities().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[1].kind(), EntityKind::Recloser);
    assert!(devices[1].companion().is_some());
}

/// Buses reached from an entity, and the buses next to them.
#[test]
fn test_buses_and_neighbors() {
    let session = sample_session().unwrap();
    let nav = RelationshipNavigator::new(&session);

    let xfmr3 = session.all(EntityKind::Transformer3W).unwrap().remove(0);
    assert_eq!(nav.buses(&xfmr3).unwrap().len(), 3);

    let nevada = session.resolve(EntityKind::Bus, &Key::Number(1)).unwrap();
    let branches = nav.branches_at(&nevada).unwrap();
    assert_eq!(branches.len(), 3);
    assert_eq!(
        keys(&session, &nav.neighbors(&nevada).unwrap()),
        ["[BUS] 'OHIO' 132 kV", "[BUS] 'CLAYTOR' 132 kV", "[BUS] 'NEVADA' 33 kV"]
    );
    assert_eq!(
        nevada.get(&session, "TERMINALS").unwrap().as_entities().map(<[_]>::len),
        Some(3)
    );
}

/// Operations are checked against the entity's kind.
#[test]
fn test_wrong_kind_is_unsupported() {
    let session = sample_session().unwrap();
    let nav = RelationshipNavigator::new(&session);
    let line = session
        .resolve_str(EntityKind::Line, "[LINE] 'NEVADA' 132 kV - 'OHIO' 132 kV 1")
        .unwrap();
    assert!(matches!(nav.terminals(&line), Err(OlxError::Unsupported { .. })));
    assert!(matches!(nav.devices(&line), Err(OlxError::Unsupported { .. })));
    assert_eq!(nav.related(&line, EntityKind::MutualPair).unwrap().len(), 1);
}
