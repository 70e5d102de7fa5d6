//! Access to the results of a fault run.
//!
//! A [`FaultResult`] is an index into the results the engine holds, plus the
//! session token and result generation it was produced under. Every accessor
//! checks both before reading, so a result from a closed network or from a run
//! whose results were cleared fails with `StaleResult` instead of reading
//! someone else's numbers.
//!
//! Phase quantities come back as triplets of [`Complex64`], one triplet per
//! object end:
//!
//! | Object                           | Current triplets      | Voltage triplets |
//! |----------------------------------|-----------------------|------------------|
//! | fault point                      | 1                     | -                |
//! | bus, terminal, relay group       | 1                     | 1                |
//! | generators, loads, shunts, units | 1                     | -                |
//! | two-terminal branch              | 2                     | 2                |
//! | three-winding transformer        | 3 + neutral           | 3                |

use num_complex::Complex64;
use once_cell::unsync::OnceCell;

use olx_core::{
    EntityKind, GenericEntity, MegavoltAmperes, OlxError, OlxResult, ReadStyle, Seconds, Session,
    SessionToken, ValidationReport, VoltageUnit,
};

use crate::scenario::ScenarioFamily;

/// Phase A, B, C (or sequence 0, 1, 2) phasors.
pub type Triplet = [Complex64; 3];

/// Thevenin impedance at the fault point, per sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceImpedance {
    pub positive: Complex64,
    pub negative: Complex64,
    pub zero: Complex64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrRatios {
    /// ANSI X/R
    pub ansi: f64,
    /// X/R of the Thevenin impedance
    pub thevenin: f64,
}

/// One step of a stepped-event simulation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// 1-based
    pub step: usize,
    pub time: Seconds,
    /// Fault current magnitude during the step, in amperes
    pub current: f64,
    pub description: String,
    /// Devices that operated at this step
    pub devices: Vec<GenericEntity>,
}

/// Handle on one stored fault result.
#[derive(Debug, Clone)]
pub struct FaultResult {
    index: usize,
    tiers: u32,
    token: SessionToken,
    generation: u64,
    family: ScenarioFamily,
    steps: OnceCell<Vec<StepResult>>,
}

const SUMMARY_LEN: usize = 9;

impl FaultResult {
    pub(crate) fn new(
        index: usize,
        tiers: u32,
        token: SessionToken,
        generation: u64,
        family: ScenarioFamily,
    ) -> Self {
        Self {
            index,
            tiers,
            token,
            generation,
            family,
            steps: OnceCell::new(),
        }
    }

    /// 1-based position among the results the engine holds.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tiers(&self) -> u32 {
        self.tiers
    }

    pub fn family(&self) -> ScenarioFamily {
        self.family
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fail unless this result is still held by the engine.
    pub fn check(&self, session: &Session) -> OlxResult<()> {
        session.check_result(self.token, self.generation, self.index)
    }

    /// Phase currents at `target`, or at the fault point when `None`.
    pub fn current(&self, session: &Session, target: Option<&GenericEntity>) -> OlxResult<Vec<Triplet>> {
        self.read_current(session, target, ReadStyle::Phase)
    }

    /// Sequence currents (zero, positive, negative) at `target` or the fault point.
    pub fn current_sequence(
        &self,
        session: &Session,
        target: Option<&GenericEntity>,
    ) -> OlxResult<Vec<Triplet>> {
        self.read_current(session, target, ReadStyle::Sequence)
    }

    pub fn voltage(&self, session: &Session, target: &GenericEntity) -> OlxResult<Vec<Triplet>> {
        self.read_voltage(session, target, ReadStyle::Phase)
    }

    pub fn voltage_sequence(&self, session: &Session, target: &GenericEntity) -> OlxResult<Vec<Triplet>> {
        self.read_voltage(session, target, ReadStyle::Sequence)
    }

    /// Operating time of a protective device, `None` when it does not trip.
    ///
    /// `multiplier` scales the device's time dial; with `signal_only` the
    /// breaker interrupting time is left out.
    pub fn operate_time(
        &self,
        session: &Session,
        device: &GenericEntity,
        multiplier: f64,
        signal_only: bool,
    ) -> OlxResult<Option<Seconds>> {
        self.check(session)?;
        live(session, device)?;
        if !device.kind().is_timed_device() {
            return Err(OlxError::Unsupported {
                kind: device.kind(),
                operation: "operate time",
            });
        }
        if !(multiplier.is_finite() && multiplier > 0.0) {
            let mut report = ValidationReport::new("operate time");
            report.add("multiplier", "a value > 0", multiplier);
            return report.into_result(None);
        }
        let seconds = session
            .engine()
            .read_operate_time(self.index, device.handle(), multiplier, signal_only)
            .map_err(|_| session.engine_error(format!("read operate time of {device}")))?;
        if seconds >= session.config().faults.no_trip_seconds {
            return Ok(None);
        }
        Ok(Some(Seconds(seconds)))
    }

    /// Bus voltage before the fault.
    pub fn pre_fault_voltage(
        &self,
        session: &Session,
        bus: &GenericEntity,
        unit: VoltageUnit,
    ) -> OlxResult<Complex64> {
        self.check(session)?;
        live(session, bus)?;
        if bus.kind() != EntityKind::Bus {
            return Err(OlxError::Unsupported {
                kind: bus.kind(),
                operation: "pre-fault voltage",
            });
        }
        let [re, im] = session
            .engine()
            .read_pre_fault_voltage(self.index, bus.handle(), unit)
            .map_err(|_| session.engine_error(format!("read pre-fault voltage at {bus}")))?;
        Ok(Complex64::new(re, im))
    }

    /// Thevenin impedance at the fault point.
    pub fn thevenin(&self, session: &Session) -> OlxResult<SequenceImpedance> {
        let s = self.summary(session)?;
        Ok(SequenceImpedance {
            positive: Complex64::new(s[3], s[4]),
            negative: Complex64::new(s[5], s[6]),
            zero: Complex64::new(s[7], s[8]),
        })
    }

    pub fn short_circuit_mva(&self, session: &Session) -> OlxResult<MegavoltAmperes> {
        Ok(MegavoltAmperes(self.summary(session)?[0]))
    }

    pub fn xr_ratios(&self, session: &Session) -> OlxResult<XrRatios> {
        let s = self.summary(session)?;
        Ok(XrRatios {
            ansi: s[1],
            thevenin: s[2],
        })
    }

    /// Engine's one-line description of the fault.
    pub fn description(&self, session: &Session) -> OlxResult<String> {
        self.check(session)?;
        session
            .engine()
            .read_fault_description(self.index)
            .map_err(|_| session.engine_error(format!("read description of result {}", self.index)))
    }

    /// Steps of a stepped-event result, read once and cached.
    pub fn steps(&self, session: &Session) -> OlxResult<&[StepResult]> {
        self.check(session)?;
        if self.family != ScenarioFamily::SteppedEvent {
            let mut report = ValidationReport::new("step results");
            report.add("result", "a stepped event result", format!("a {} result", self.family));
            report.into_result(())?;
        }
        let steps = self.steps.get_or_try_init(|| read_steps(session))?;
        Ok(steps)
    }

    fn read_current(
        &self,
        session: &Session,
        target: Option<&GenericEntity>,
        style: ReadStyle,
    ) -> OlxResult<Vec<Triplet>> {
        self.check(session)?;
        let triplets = match target {
            None => 1,
            Some(entity) => {
                live(session, entity)?;
                current_triplets(entity.kind()).ok_or(OlxError::Unsupported {
                    kind: entity.kind(),
                    operation: "fault current",
                })?
            }
        };
        let operation = match target {
            Some(entity) => format!("read fault current at {entity}"),
            None => "read fault current".to_string(),
        };
        let flat = session
            .engine()
            .read_fault_current(self.index, target.map(GenericEntity::handle), style)
            .map_err(|_| session.engine_error(operation.as_str()))?;
        reshape(flat, triplets, &operation)
    }

    fn read_voltage(
        &self,
        session: &Session,
        target: &GenericEntity,
        style: ReadStyle,
    ) -> OlxResult<Vec<Triplet>> {
        self.check(session)?;
        live(session, target)?;
        let triplets = voltage_triplets(target.kind()).ok_or(OlxError::Unsupported {
            kind: target.kind(),
            operation: "fault voltage",
        })?;
        let operation = format!("read fault voltage at {target}");
        let flat = session
            .engine()
            .read_fault_voltage(self.index, target.handle(), style)
            .map_err(|_| session.engine_error(operation.as_str()))?;
        reshape(flat, triplets, &operation)
    }

    /// `[MVA, X/R ANSI, X/R thevenin, R1, X1, R2, X2, R0, X0]`
    fn summary(&self, session: &Session) -> OlxResult<Vec<f64>> {
        self.check(session)?;
        let operation = format!("read summary of result {}", self.index);
        let summary = session
            .engine()
            .read_fault_summary(self.index)
            .map_err(|_| session.engine_error(operation.as_str()))?;
        if summary.len() < SUMMARY_LEN {
            return Err(OlxError::Engine {
                operation,
                message: format!("expected {SUMMARY_LEN} values, got {}", summary.len()),
            });
        }
        Ok(summary)
    }
}

fn live(session: &Session, entity: &GenericEntity) -> OlxResult<()> {
    if entity.is_deleted() {
        return Err(OlxError::Deleted {
            kind: entity.kind(),
        });
    }
    session.check(entity.token(), entity.kind())
}

fn read_steps(session: &Session) -> OlxResult<Vec<StepResult>> {
    let engine = session.engine();
    let count = engine
        .read_step_count()
        .map_err(|_| session.engine_error("read step count"))?;
    let mut steps = Vec::with_capacity(count);
    for step in 1..=count {
        let buffer = engine
            .read_step(step)
            .map_err(|_| session.engine_error(format!("read step {step}")))?;
        let devices = buffer
            .devices
            .iter()
            .map(|handle| session.wrap(*handle))
            .collect::<OlxResult<Vec<_>>>()?;
        steps.push(StepResult {
            step,
            time: Seconds(buffer.time),
            current: buffer.current,
            description: buffer.description,
            devices,
        });
    }
    Ok(steps)
}

fn current_triplets(kind: EntityKind) -> Option<usize> {
    match kind {
        EntityKind::Bus
        | EntityKind::Generator
        | EntityKind::GenUnit
        | EntityKind::Load
        | EntityKind::LoadUnit
        | EntityKind::Shunt
        | EntityKind::ShuntUnit
        | EntityKind::Terminal
        | EntityKind::RelayGroup => Some(1),
        EntityKind::Transformer3W => Some(4),
        kind if kind.bus_count() == 2 => Some(2),
        _ => None,
    }
}

fn voltage_triplets(kind: EntityKind) -> Option<usize> {
    match kind {
        EntityKind::Bus | EntityKind::Terminal | EntityKind::RelayGroup => Some(1),
        EntityKind::Transformer3W => Some(3),
        kind if kind.bus_count() == 2 => Some(2),
        _ => None,
    }
}

/// Flat `[re, im, ...]` into `triplets` triplets.
fn reshape(flat: Vec<f64>, triplets: usize, operation: &str) -> OlxResult<Vec<Triplet>> {
    if flat.len() != triplets * 6 {
        return Err(OlxError::Engine {
            operation: operation.to_string(),
            message: format!("expected {} values, got {}", triplets * 6, flat.len()),
        });
    }
    Ok(flat
        .chunks_exact(6)
        .map(|c| {
            [
                Complex64::new(c[0], c[1]),
                Complex64::new(c[2], c[3]),
                Complex64::new(c[4], c[5]),
            ]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reshape_groups_phasors() {
        let flat: Vec<f64> = (0..12).map(f64::from).collect();
        let triplets = reshape(flat, 2, "read").unwrap();
        assert_eq!(triplets.len(), 2);
        assert_eq!(triplets[0][1], Complex64::new(2.0, 3.0));
        assert_eq!(triplets[1][2], Complex64::new(10.0, 11.0));
    }

    #[test]
    fn test_reshape_rejects_short_buffers() {
        let err = reshape(vec![1.0; 5], 1, "read fault current").unwrap_err();
        assert!(matches!(err, OlxError::Engine { ref message, .. } if message.contains("expected 6")));
    }

    #[test]
    fn test_layouts_per_kind() {
        assert_eq!(current_triplets(EntityKind::Line), Some(2));
        assert_eq!(current_triplets(EntityKind::Transformer3W), Some(4));
        assert_eq!(current_triplets(EntityKind::RelayOcGround), None);
        assert_eq!(voltage_triplets(EntityKind::Transformer3W), Some(3));
        assert_eq!(voltage_triplets(EntityKind::Generator), None);
    }
}
