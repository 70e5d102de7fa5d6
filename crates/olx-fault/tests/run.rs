//! Fault runs against the sample network.

use olx_core::testing::{journaled_session, sample_session, Call};
use olx_core::{EntityKind, GenericEntity, OlxError, Session, ValidationReport};
use olx_fault::{
    run, Application, ClassicalFault, FaultScenario, OutageSpec, RunOptions, ScenarioFamily,
    SimultaneousFault,
};

fn nevada(session: &Session) -> GenericEntity {
    session
        .resolve_str(EntityKind::Bus, "[BUS] 'NEVADA' 132 kV")
        .unwrap()
}

fn line(session: &Session, key: &str) -> GenericEntity {
    session.resolve_str(EntityKind::Line, key).unwrap()
}

fn report(err: OlxError) -> ValidationReport {
    match err {
        OlxError::ValidationFailed(report) => report,
        other => panic!("expected a validation failure, got {other}"),
    }
}

fn runs(calls: &[Call]) -> usize {
    calls.iter().filter(|call| matches!(call, Call::Run(_))).count()
}

/// Double line to ground at NEVADA 132 kV through 0.1 + j0.2 ohm.
#[test]
fn test_classical_bus_fault() {
    let mut session = sample_session().unwrap();
    let fault = ClassicalFault::new(nevada(&session), Application::Bus, "2LG:AB").with_impedance([0.1, 0.2]);
    let request = fault.check_data(&session).unwrap();
    assert_eq!(request.connection, 2);
    assert_eq!(request.impedance, [0.1, 0.2]);

    let results = run(&mut session, &[fault.into()], RunOptions::default()).unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.index(), 1);
    assert_eq!(result.family(), ScenarioFamily::Classical);

    let at_fault = result.current(&session, None).unwrap();
    assert_eq!(at_fault.len(), 1);
    assert!(at_fault[0].iter().all(|phasor| phasor.norm() > 0.0));
    assert!(result.short_circuit_mva(&session).unwrap().0 > 0.0);
    assert!(result
        .description(&session)
        .unwrap()
        .contains("[BUS] 'NEVADA' 132 kV"));
}

/// An unknown connection code is reported with the codes that are accepted.
#[test]
fn test_invalid_connection_code() {
    let (mut session, journal) = journaled_session().unwrap();
    let fault = ClassicalFault::new(nevada(&session), Application::Bus, "XX");

    let issues = report(fault.check_data(&session).unwrap_err());
    let issue = issues.issue("connection").unwrap();
    assert!(issue.expected.contains("2LG:AB"));
    assert!(issue.expected.contains("1LG:C"));
    assert_eq!(issue.actual, "\"XX\"");

    journal.reset();
    let err = run(&mut session, &[fault.into()], RunOptions::default()).unwrap_err();
    assert!(report(err).issue("scenarios[0].connection").is_some());
    assert_eq!(runs(&journal.calls()), 0);
}

/// Grounding admittance belongs to SingleGrounded outages only and is never negative.
#[test]
fn test_outage_admittance_rules() {
    let session = sample_session().unwrap();
    let candidates = vec![line(&session, "[LINE] 'NEVADA' 132 kV - 'OHIO' 132 kV 1")];

    let negative = OutageSpec::new("SingleGrounded")
        .with_grounding_admittance(-1.0)
        .with_candidates(candidates.clone());
    let issues = report(negative.check_data(&session).unwrap_err());
    assert_eq!(issues.issue("grounding_admittance").unwrap().actual, "-1");

    let missing = OutageSpec::new("SingleGrounded").with_candidates(candidates.clone());
    assert!(report(missing.check_data(&session).unwrap_err())
        .issue("grounding_admittance")
        .is_some());

    let unexpected = OutageSpec::new("Double")
        .with_grounding_admittance(0.5)
        .with_candidates(candidates.clone());
    assert!(unexpected.check_data(&session).is_err());

    let grounded = OutageSpec::new("single-gnd")
        .with_grounding_admittance(0.5)
        .with_candidates(candidates);
    let request = grounded.check_data(&session).unwrap();
    assert_eq!(request.mode, 2);
    assert_eq!(request.candidates.len(), 1);
}

/// Outage specs reject unknown modes and non-branch candidates.
#[test]
fn test_outage_mode_and_candidates() {
    let session = sample_session().unwrap();
    let spec = OutageSpec::new("Triple").with_candidates(vec![nevada(&session)]);
    let issues = report(spec.check_data(&session).unwrap_err());
    assert!(issues.issue("mode").unwrap().expected.contains("SingleGrounded"));
    assert_eq!(issues.issue("candidates[0]").unwrap().actual, "BUS");

    let empty = OutageSpec::new("All");
    assert!(report(empty.check_data(&session).unwrap_err()).issue("candidates").is_some());
}

/// Each outage contingency adds a result after the base case.
#[test]
fn test_outage_contingencies_produce_results() {
    let mut session = sample_session().unwrap();
    let candidates = vec![
        line(&session, "[LINE] 'NEVADA' 132 kV - 'OHIO' 132 kV 1"),
        line(&session, "[LINE] 'CLAYTOR' 132 kV - 'NEVADA' 132 kV 1"),
    ];
    let fault = ClassicalFault::new(nevada(&session), Application::Bus, "1LG:A")
        .with_outage(OutageSpec::new("Single").with_candidates(candidates));

    let results = run(&mut session, &[fault.into()], RunOptions::default()).unwrap();
    assert_eq!(results.len(), 3);
    assert!(!results[0].description(&session).unwrap().contains("contingency"));
    assert!(results[2]
        .description(&session)
        .unwrap()
        .ends_with("with outage contingency 2"));
}

/// A clearing run retires earlier results; an appending run keeps them.
#[test]
fn test_result_generations() {
    let mut session = sample_session().unwrap();
    let fault: FaultScenario = ClassicalFault::new(nevada(&session), Application::Bus, "3LG").into();
    let scenarios = [fault];

    let first = run(&mut session, &scenarios, RunOptions::default()).unwrap().remove(0);
    let appended = run(&mut session, &scenarios, RunOptions::default().with_clear_previous(false))
        .unwrap()
        .remove(0);
    assert_eq!(appended.index(), 2);
    assert_eq!(appended.generation(), first.generation());
    first.current(&session, None).unwrap();

    run(&mut session, &scenarios, RunOptions::default()).unwrap();
    let err = first.current(&session, None).unwrap_err();
    assert!(matches!(err, OlxError::StaleResult { index: 1, .. }));
    assert!(appended.short_circuit_mva(&session).is_err());
}

/// Results do not outlive the network they were computed on.
#[test]
fn test_results_go_stale_with_the_session() {
    let mut session = sample_session().unwrap();
    let fault = ClassicalFault::new(nevada(&session), Application::Bus, "3LG");
    let result = run(&mut session, &[fault.into()], RunOptions::default())
        .unwrap()
        .remove(0);

    session.close().unwrap();
    assert!(matches!(result.check(&session), Err(OlxError::SessionClosed)));
    session.new_network().unwrap();
    let err = result.description(&session).unwrap_err();
    assert!(err.is_stale());
}

/// Every scenario is checked before the engine sees any of them.
#[test]
fn test_validation_precedes_engine_calls() {
    let (mut session, journal) = journaled_session().unwrap();
    let bus = nevada(&session);
    let scenarios: Vec<FaultScenario> = vec![
        ClassicalFault::new(bus.clone(), Application::Bus, "3LG").into(),
        ClassicalFault::new(bus.clone(), Application::CloseIn, "1LG:B")
            .with_impedance([0.1])
            .into(),
    ];
    journal.reset();
    let issues = report(run(&mut session, &scenarios, RunOptions::default()).unwrap_err());
    assert!(issues.issue("scenarios[1].target").is_some());
    assert_eq!(issues.issue("scenarios[1].impedance").unwrap().expected, "2 numbers");
    assert!(issues.issue("scenarios[0].connection").is_none());
    assert_eq!(runs(&journal.calls()), 0);
    assert_eq!(session.results().count, 0);
}

/// A run takes scenarios of one family.
#[test]
fn test_mixed_families_are_rejected() {
    let mut session = sample_session().unwrap();
    let bus = nevada(&session);
    let scenarios: Vec<FaultScenario> = vec![
        ClassicalFault::new(bus.clone(), Application::Bus, "3LG").into(),
        SimultaneousFault::new(vec![bus], Application::Bus)
            .with_connection("3LG")
            .into(),
    ];
    let issues = report(run(&mut session, &scenarios, RunOptions::default()).unwrap_err());
    assert_eq!(issues.issue("scenarios[1]").unwrap().actual, "a simultaneous scenario");

    let none = run(&mut session, &[], RunOptions::default()).unwrap_err();
    assert!(report(none).issue("scenarios").is_some());
}

/// Line applications need a relay group or terminal on a line.
#[test]
fn test_branch_end_targets() {
    let session = sample_session().unwrap();
    let on_line = session
        .resolve_str(EntityKind::RelayGroup, "[RLYGROUP] 'NEVADA' 132 kV - 'OHIO' 132 kV 1 L")
        .unwrap();
    let on_transformer = session
        .resolve_str(EntityKind::RelayGroup, "[RLYGROUP] 'NEVADA' 132 kV - 'NEVADA' 33 kV 1 X")
        .unwrap();
    let midline: Application = "50%".parse().unwrap();

    let request = ClassicalFault::new(on_line.clone(), midline, "3LG")
        .check_data(&session)
        .unwrap();
    assert_eq!(request.percent, 50.0);
    assert_eq!(request.application, 6);

    let issues = report(
        ClassicalFault::new(on_transformer.clone(), midline, "3LG")
            .check_data(&session)
            .unwrap_err(),
    );
    assert!(issues.issue("target").unwrap().actual.contains("XFMR"));

    ClassicalFault::new(on_transformer, Application::RemoteBus, "LL:BC")
        .check_data(&session)
        .unwrap();

    let bad_percent: Application = "0%".parse().unwrap();
    let issues = report(
        ClassicalFault::new(on_line, bad_percent, "3LG")
            .check_data(&session)
            .unwrap_err(),
    );
    assert!(issues.issue("application").is_some());
}

/// Bus-to-bus faults join two buses; outages take a branch and no connection.
#[test]
fn test_simultaneous_faults() {
    let mut session = sample_session().unwrap();
    let nv = nevada(&session);
    let ohio = session.resolve_str(EntityKind::Bus, "OHIO").unwrap();

    let short = SimultaneousFault::new(vec![nv.clone()], Application::Bus2Bus).with_connection("AB");
    let issues = report(short.check_data(&session).unwrap_err());
    assert_eq!(issues.issue("targets").unwrap().expected, "exactly 2 buses");

    let wrong_code = SimultaneousFault::new(vec![nv.clone(), ohio.clone()], Application::Bus2Bus)
        .with_connection("2LG:AB");
    assert!(report(wrong_code.check_data(&session).unwrap_err())
        .issue("connection")
        .unwrap()
        .expected
        .contains("AA"));

    let outage = SimultaneousFault::new(
        vec![line(&session, "[LINE] 'OHIO' 132 kV - 'CLAYTOR' 132 kV 1")],
        Application::Outage,
    );
    let request = outage.check_data(&session).unwrap();
    assert_eq!(request.connection, 0);
    assert_eq!(request.impedance, [0.0; 8]);

    let scenarios: Vec<FaultScenario> = vec![
        SimultaneousFault::new(vec![nv, ohio], Application::Bus2Bus)
            .with_connection("AB")
            .into(),
        outage.into(),
    ];
    let results = run(&mut session, &scenarios, RunOptions::default().with_tiers(2)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tiers(), 2);
    assert_eq!(results[0].family(), ScenarioFamily::Simultaneous);
}
