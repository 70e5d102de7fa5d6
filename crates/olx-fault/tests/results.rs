//! Reading fault results: phasor layouts, summaries, operate times and steps.

use olx_core::testing::{journaled_session, sample_session, Call};
use olx_core::{EntityKind, GenericEntity, OlxError, Session, VoltageUnit};
use olx_fault::{
    run, Application, ClassicalFault, FaultResult, FaultScenario, RunOptions, ScenarioFamily,
    SteppedEvent, SteppedEventAddendum,
};

fn nevada(session: &Session) -> GenericEntity {
    session
        .resolve_str(EntityKind::Bus, "[BUS] 'NEVADA' 132 kV")
        .unwrap()
}

fn first(session: &Session, kind: EntityKind) -> GenericEntity {
    session.all(kind).unwrap().remove(0)
}

fn classical_at_nevada(session: &mut Session, connection: &str) -> FaultResult {
    let fault = ClassicalFault::new(nevada(session), Application::Bus, connection);
    run(session, &[fault.into()], RunOptions::default())
        .unwrap()
        .remove(0)
}

/// Phasor triplets come back one per object end.
#[test]
fn test_current_and_voltage_layouts() {
    let mut session = sample_session().unwrap();
    let result = classical_at_nevada(&mut session, "1LG:A");
    let bus = nevada(&session);
    let line = first(&session, EntityKind::Line);
    let three_winding = first(&session, EntityKind::Transformer3W);

    assert_eq!(result.current(&session, None).unwrap().len(), 1);
    assert_eq!(result.current(&session, Some(&bus)).unwrap().len(), 1);
    assert_eq!(result.current(&session, Some(&line)).unwrap().len(), 2);
    assert_eq!(result.current(&session, Some(&three_winding)).unwrap().len(), 4);
    assert_eq!(result.current_sequence(&session, Some(&line)).unwrap().len(), 2);

    assert_eq!(result.voltage(&session, &bus).unwrap().len(), 1);
    assert_eq!(result.voltage(&session, &line).unwrap().len(), 2);
    assert_eq!(result.voltage_sequence(&session, &three_winding).unwrap().len(), 3);

    let phase = result.current(&session, None).unwrap()[0][0];
    let sequence = result.current_sequence(&session, None).unwrap()[0][0];
    assert!((phase.re - 3.0 * sequence.re).abs() < 1e-9);

    let mutual = first(&session, EntityKind::MutualPair);
    let err = result.voltage(&session, &mutual).unwrap_err();
    assert!(matches!(err, OlxError::Unsupported { operation: "fault voltage", .. }));
}

/// Short circuit MVA, X/R ratios and Thevenin impedance come from the summary.
#[test]
fn test_fault_summary() {
    let mut session = sample_session().unwrap();
    let result = classical_at_nevada(&mut session, "2LG:AB");

    let mva = result.short_circuit_mva(&session).unwrap();
    assert!((mva.0 - 1610.2).abs() < 1e-9);

    let ratios = result.xr_ratios(&session).unwrap();
    assert_eq!(ratios.ansi, 12.5);
    assert_eq!(ratios.thevenin, 11.8);

    let thevenin = result.thevenin(&session).unwrap();
    assert_eq!(thevenin.positive.re, 0.01);
    assert_eq!(thevenin.positive.im, 0.1);
    assert_eq!(thevenin.zero.im, 0.3);

    assert_eq!(
        result.description(&session).unwrap(),
        "1. Fault on [BUS] 'NEVADA' 132 kV, connection code 2"
    );
}

/// Pre-fault voltage is read per unit or in kV, at buses only.
#[test]
fn test_pre_fault_voltage() {
    let mut session = sample_session().unwrap();
    let result = classical_at_nevada(&mut session, "3LG");
    let bus = nevada(&session);

    let pu = result.pre_fault_voltage(&session, &bus, VoltageUnit::PerUnit).unwrap();
    assert_eq!(pu.re, 1.0);
    assert_eq!(pu.im, 0.0);

    let kv = result.pre_fault_voltage(&session, &bus, VoltageUnit::Kilovolts).unwrap();
    assert!((kv.re - 132.0 / 3f64.sqrt()).abs() < 1e-9);

    let line = first(&session, EntityKind::Line);
    assert!(matches!(
        result.pre_fault_voltage(&session, &line, VoltageUnit::PerUnit),
        Err(OlxError::Unsupported { .. })
    ));
}

/// Operate times scale with the multiplier; breaker time is left out for signals.
#[test]
fn test_operate_times() {
    let mut session = sample_session().unwrap();
    let result = classical_at_nevada(&mut session, "1LG:A");
    let relay = session
        .resolve_str(
            EntityKind::RelayOcGround,
            "[OCRLYG] 'NV-G1' on 'NEVADA' 132 kV - 'OHIO' 132 kV 1 L",
        )
        .unwrap();

    let tripped = result.operate_time(&session, &relay, 1.0, false).unwrap().unwrap();
    let signal = result.operate_time(&session, &relay, 1.0, true).unwrap().unwrap();
    let doubled = result.operate_time(&session, &relay, 2.0, true).unwrap().unwrap();
    assert!((tripped.0 - signal.0 - 0.05).abs() < 1e-9);
    assert!((doubled.0 - 2.0 * signal.0).abs() < 1e-9);
    assert!(signal.0 >= 0.2 && signal.0 < 0.3);

    let out_of_service = session
        .resolve_str(
            EntityKind::RelayOcPhase,
            "[OCRLYP] 'OH-P1' on 'OHIO' 132 kV - 'NEVADA' 132 kV 1 L",
        )
        .unwrap();
    assert_eq!(result.operate_time(&session, &out_of_service, 1.0, false).unwrap(), None);

    let err = result.operate_time(&session, &relay, 0.0, false).unwrap_err();
    let OlxError::ValidationFailed(report) = err else {
        panic!("expected a validation failure");
    };
    assert!(report.issue("multiplier").is_some());

    let bus = nevada(&session);
    assert!(matches!(
        result.operate_time(&session, &bus, 1.0, false),
        Err(OlxError::Unsupported { operation: "operate time", .. })
    ));
}

/// Steps of a stepped event: inception, protection operation, then each addendum.
#[test]
fn test_stepped_event_steps() {
    let (mut session, journal) = journaled_session().unwrap();
    let bus = nevada(&session);
    let scenarios: Vec<FaultScenario> = vec![
        SteppedEvent::new(bus.clone(), Application::Bus, "1LG:A").into(),
        SteppedEventAddendum::new(0.5, "3LG").into(),
        SteppedEventAddendum::new(1.0, "LL:BC").into(),
    ];
    let results = run(&mut session, &scenarios, RunOptions::default()).unwrap();
    assert_eq!(results.len(), 1);
    assert!(journal.calls().contains(&Call::Run("stepped-event")));

    let result = &results[0];
    assert_eq!(result.family(), ScenarioFamily::SteppedEvent);
    let steps = result.steps(&session).unwrap();
    let times: Vec<f64> = steps.iter().map(|step| step.time.0).collect();
    assert_eq!(times, vec![0.0, 0.3, 0.5, 1.0]);
    assert_eq!(steps[0].step, 1);
    assert_eq!(steps[0].current, 2008.0);
    assert!(steps[0].description.contains("[BUS] 'NEVADA' 132 kV"));
    assert_eq!(steps[1].devices.len(), 6);
    assert!(steps[2].devices.is_empty());

    let names: Vec<String> = steps[1]
        .devices
        .iter()
        .map(|device| device.key_string(&session).unwrap())
        .collect();
    assert!(names.iter().any(|name| name.contains("'NV-G1'")));
    assert!(names.iter().any(|name| name.contains("'CL-G1'")));
}

/// Device flags pick which protection classes may operate.
#[test]
fn test_stepped_event_device_flags() {
    let mut session = sample_session().unwrap();
    let event = SteppedEvent::new(nevada(&session), Application::Bus, "3LG")
        .with_device_flags([0, 1, 0, 0, 0]);
    let result = run(&mut session, &[event.into()], RunOptions::default())
        .unwrap()
        .remove(0);
    let steps = result.steps(&session).unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].devices.len(), 2);
    assert!(steps[1]
        .devices
        .iter()
        .all(|device| device.kind() == EntityKind::RelayOcGround));

    let quiet = SteppedEvent::new(nevada(&session), Application::Bus, "3LG")
        .with_device_flags([0, 0, 0, 0, 0]);
    let result = run(&mut session, &[quiet.into()], RunOptions::default())
        .unwrap()
        .remove(0);
    assert_eq!(result.steps(&session).unwrap().len(), 1);
}

/// A stepped event replaces earlier results even when asked to append.
#[test]
fn test_stepped_event_always_clears() {
    let mut session = sample_session().unwrap();
    let classical = classical_at_nevada(&mut session, "3LG");
    let event = SteppedEvent::new(nevada(&session), Application::Bus, "3LG");
    let stepped = run(
        &mut session,
        &[event.into()],
        RunOptions::default().with_clear_previous(false),
    )
    .unwrap()
    .remove(0);

    assert_eq!(stepped.index(), 1);
    assert!(classical.check(&session).unwrap_err().is_stale());
    assert!(stepped.check(&session).is_ok());
}

/// Addenda follow the event in strictly increasing time order.
#[test]
fn test_stepped_event_ordering() {
    let (mut session, journal) = journaled_session().unwrap();
    let bus = nevada(&session);
    journal.reset();

    let out_of_order: Vec<FaultScenario> = vec![
        SteppedEvent::new(bus.clone(), Application::Bus, "3LG").into(),
        SteppedEventAddendum::new(0.5, "3LG").into(),
        SteppedEventAddendum::new(0.5, "1LG:B").into(),
        SteppedEventAddendum::new(-1.0, "XX").into(),
    ];
    let err = run(&mut session, &out_of_order, RunOptions::default()).unwrap_err();
    let OlxError::ValidationFailed(report) = err else {
        panic!("expected a validation failure");
    };
    assert_eq!(report.issue("scenarios[2].time").unwrap().expected, "a time after 0.5 s");
    assert!(report.issue("scenarios[3].time").is_some());
    assert!(report.issue("scenarios[3].connection").is_some());

    let addendum_first: Vec<FaultScenario> = vec![
        SteppedEventAddendum::new(0.5, "3LG").into(),
        SteppedEvent::new(bus.clone(), Application::Bus, "3LG").into(),
    ];
    let err = run(&mut session, &addendum_first, RunOptions::default()).unwrap_err();
    let OlxError::ValidationFailed(report) = err else {
        panic!("expected a validation failure");
    };
    assert_eq!(report.issue("scenarios[0]").unwrap().actual, "an addendum");
    assert_eq!(report.issue("scenarios[1]").unwrap().actual, "a second stepped event");

    let bad_flags = SteppedEvent::new(bus, Application::RemoteBus, "3LG")
        .with_tiers(-1)
        .with_device_flags([1, 2]);
    let err = run(&mut session, &[bad_flags.into()], RunOptions::default()).unwrap_err();
    let OlxError::ValidationFailed(report) = err else {
        panic!("expected a validation failure");
    };
    assert!(report.issue("scenarios[0].application").is_some());
    assert!(report.issue("scenarios[0].tiers").is_some());
    assert_eq!(
        report.issue("scenarios[0].device_flags").unwrap().expected,
        "5 flags of 0 or 1"
    );

    assert!(journal.calls().iter().all(|call| !matches!(call, Call::Run(_))));
}

/// Steps are only defined for stepped-event results.
#[test]
fn test_steps_need_a_stepped_event() {
    let mut session = sample_session().unwrap();
    let result = classical_at_nevada(&mut session, "3LG");
    let err = result.steps(&session).unwrap_err();
    let OlxError::ValidationFailed(report) = err else {
        panic!("expected a validation failure");
    };
    assert_eq!(report.subject, "step results");
}
