//! Submitting scenarios to the engine.
//!
//! A run takes scenarios of one family. Every scenario is checked before the
//! engine is called; if any check fails the run returns the combined report
//! and the engine is never touched.
//!
//! **Run shapes:**
//! - classical: any number of [`ClassicalFault`](crate::ClassicalFault)s; each
//!   produces one result, plus one per outage contingency
//! - simultaneous: the components of one simultaneous fault; one result
//! - stepped event: one [`SteppedEvent`](crate::SteppedEvent) followed by its
//!   addenda in strictly increasing time order; one result with steps. The
//!   engine always discards earlier results for this family.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use olx_core::{
    ClassicalRequest, FaultConfig, OlxError, OlxResult, Session, SimultaneousRequest,
    ValidationReport,
};

use crate::result::FaultResult;
use crate::scenario::{FaultScenario, ScenarioFamily};

/// Run settings; unset fields come from the session's `[faults]` config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Discard results of earlier runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_previous: Option<bool>,
    /// Result tier scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<u32>,
}

impl RunOptions {
    pub fn with_clear_previous(mut self, clear: bool) -> Self {
        self.clear_previous = Some(clear);
        self
    }

    pub fn with_tiers(mut self, tiers: u32) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Fill unset fields from `defaults`.
    pub fn or(self, defaults: RunOptions) -> Self {
        Self {
            clear_previous: self.clear_previous.or(defaults.clear_previous),
            tiers: self.tiers.or(defaults.tiers),
        }
    }

    fn resolve(self, config: &FaultConfig) -> (bool, u32) {
        (
            self.clear_previous.unwrap_or(config.clear_previous),
            self.tiers.unwrap_or(config.default_tiers),
        )
    }
}

/// Check and run `scenarios`, returning the results they produced.
pub fn run(
    session: &mut Session,
    scenarios: &[FaultScenario],
    options: RunOptions,
) -> OlxResult<Vec<FaultResult>> {
    session.ensure_open()?;
    let Some(first) = scenarios.first() else {
        let mut report = ValidationReport::new("fault run");
        report.add("scenarios", "at least one scenario", "none");
        return report.into_result(Vec::new());
    };
    let family = first.family();
    let mut report = ValidationReport::new(format!("{family} fault run"));
    for (n, scenario) in scenarios.iter().enumerate() {
        if scenario.family() != family {
            report.add(
                format!("scenarios[{n}]"),
                format!("a {family} scenario"),
                format!("a {} scenario", scenario.family()),
            );
        }
    }
    report.clone().into_result(())?;

    let (clear, tiers) = options.resolve(&session.config().faults);
    let (produced, clear, tiers) = match family {
        ScenarioFamily::Classical => (run_classical(session, scenarios, clear, tiers)?, clear, tiers),
        ScenarioFamily::Simultaneous => {
            (run_simultaneous(session, scenarios, clear, tiers)?, clear, tiers)
        }
        ScenarioFamily::SteppedEvent => {
            if !clear {
                debug!("stepped event runs always replace earlier results");
            }
            let (produced, tiers) = run_stepped_event(session, scenarios)?;
            (produced, true, tiers)
        }
    };

    let (generation, first_index) = session.record_results(produced, clear);
    let token = session.token();
    info!(
        %family,
        scenarios = scenarios.len(),
        produced,
        generation,
        "fault run completed"
    );
    Ok((first_index..first_index + produced)
        .map(|index| FaultResult::new(index, tiers, token, generation, family))
        .collect())
}

/// Fold a scenario's validation failure into the run report; other errors
/// end the run.
fn checked<T>(report: &mut ValidationReport, n: usize, outcome: OlxResult<T>) -> OlxResult<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(OlxError::ValidationFailed(inner)) => {
            report.absorb(&format!("scenarios[{n}]"), inner);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn run_classical(
    session: &mut Session,
    scenarios: &[FaultScenario],
    clear_previous: bool,
    tiers: u32,
) -> OlxResult<usize> {
    let mut report = ValidationReport::new("classical fault run");
    let mut faults = Vec::with_capacity(scenarios.len());
    for (n, scenario) in scenarios.iter().enumerate() {
        if let FaultScenario::Classical(fault) = scenario {
            if let Some(request) = checked(&mut report, n, fault.check_data(session))? {
                faults.push(request);
            }
        }
    }
    report.clone().into_result(())?;

    let request = ClassicalRequest {
        faults,
        clear_previous,
        tiers,
    };
    let outcome = session.engine_mut().run_classical(&request);
    outcome.map_err(|_| session.engine_error("run classical faults"))
}

fn run_simultaneous(
    session: &mut Session,
    scenarios: &[FaultScenario],
    clear_previous: bool,
    tiers: u32,
) -> OlxResult<usize> {
    let mut report = ValidationReport::new("simultaneous fault run");
    let mut faults = Vec::with_capacity(scenarios.len());
    for (n, scenario) in scenarios.iter().enumerate() {
        if let FaultScenario::Simultaneous(fault) = scenario {
            if let Some(request) = checked(&mut report, n, fault.check_data(session))? {
                faults.push(request);
            }
        }
    }
    report.clone().into_result(())?;

    let request = SimultaneousRequest {
        faults,
        clear_previous,
        tiers,
    };
    let outcome = session.engine_mut().run_simultaneous(&request);
    outcome.map_err(|_| session.engine_error("run simultaneous fault"))
}

/// Returns the number of results and the tier scope of the event.
fn run_stepped_event(session: &mut Session, scenarios: &[FaultScenario]) -> OlxResult<(usize, u32)> {
    let mut report = ValidationReport::new("stepped event run");
    let mut event = None;
    let mut previous: Option<f64> = None;
    let mut addenda = Vec::new();
    for (n, scenario) in scenarios.iter().enumerate() {
        match (n, scenario) {
            (0, FaultScenario::SteppedEvent(first)) => {
                event = checked(&mut report, n, first.check_data(session))?;
            }
            (_, FaultScenario::SteppedEventAddendum(addendum)) if n > 0 => {
                if let Some(request) = checked(&mut report, n, addendum.check_data())? {
                    if let Some(before) = previous.filter(|before| request.time <= *before) {
                        report.add(
                            format!("scenarios[{n}].time"),
                            format!("a time after {before} s"),
                            request.time,
                        );
                    }
                    previous = Some(request.time);
                    addenda.push(request);
                }
            }
            (0, _) => report.add("scenarios[0]", "the stepped event", "an addendum"),
            (_, _) => report.add(format!("scenarios[{n}]"), "an addendum", "a second stepped event"),
        }
    }
    report.clone().into_result(())?;

    let Some(mut request) = event else {
        return Err(OlxError::ValidationFailed(report));
    };
    request.addenda = addenda;
    let tiers = request.tiers;
    let outcome = session.engine_mut().run_stepped_event(&request);
    let produced = outcome.map_err(|_| session.engine_error("run stepped event"))?;
    Ok((produced, tiers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_fall_back_to_config() {
        let config = FaultConfig::default();
        assert_eq!(RunOptions::default().resolve(&config), (true, 1));
        let options = RunOptions::default().with_clear_previous(false).with_tiers(3);
        assert_eq!(options.resolve(&config), (false, 3));
    }

    #[test]
    fn test_options_layering() {
        let file = RunOptions::default().with_tiers(2).with_clear_previous(true);
        let caller = RunOptions::default().with_clear_previous(false);
        let merged = caller.or(file);
        assert_eq!(merged.clear_previous, Some(false));
        assert_eq!(merged.tiers, Some(2));
    }
}
