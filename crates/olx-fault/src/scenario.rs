//! Fault scenarios and their validation.
//!
//! Each scenario variant is a plain struct with named fields and a
//! `check_data` method. Checking collects every problem into one
//! [`ValidationReport`] and, when clean, yields the engine request for the
//! scenario. Nothing is sent to the engine from here; a scenario that fails
//! its check is never run.
//!
//! ```ignore
//! let bus = session.resolve_str(EntityKind::Bus, "[BUS] 'NEVADA' 132 kV")?;
//! let fault = ClassicalFault::new(bus, Application::Bus, "2LG:AB").with_impedance([0.1, 0.2]);
//! fault.check_data(&session)?;
//! ```

use serde::{Deserialize, Serialize};

use olx_core::validate::{expect_between, expect_flags, expect_len, expect_member, one_of};
use olx_core::{
    AddendumRequest, ClassicalFaultRequest, EntityKind, GenericEntity, Handle, OlxResult, Session,
    SimultaneousFaultRequest, SteppedEventRequest, ValidationReport,
};

use crate::connection::{connection_code, connections_for, Application};
use crate::outage::OutageSpec;

/// Stepped-event device classes, in device flag order.
pub const DEVICE_CLASSES: [&str; 5] = [
    "overcurrent phase",
    "overcurrent ground",
    "distance phase",
    "distance ground",
    "protection schemes",
];

const CLASSICAL_APPLICATIONS: [Application; 7] = [
    Application::Bus,
    Application::CloseIn,
    Application::CloseInEndOpen,
    Application::RemoteBus,
    Application::LineEnd,
    Application::Intermediate {
        percent: 0.0,
        end_open: false,
    },
    Application::Intermediate {
        percent: 0.0,
        end_open: true,
    },
];

const SIMULTANEOUS_APPLICATIONS: [Application; 7] = [
    Application::Bus,
    Application::CloseIn,
    Application::LineEnd,
    Application::Intermediate {
        percent: 0.0,
        end_open: false,
    },
    Application::Bus2Bus,
    Application::Outage,
    Application::PhaseOpen,
];

const STEPPED_APPLICATIONS: [Application; 3] = [
    Application::Bus,
    Application::CloseIn,
    Application::Intermediate {
        percent: 0.0,
        end_open: false,
    },
];

/// Which engine run a scenario belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioFamily {
    Classical,
    Simultaneous,
    SteppedEvent,
}

impl std::fmt::Display for ScenarioFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScenarioFamily::Classical => "classical",
            ScenarioFamily::Simultaneous => "simultaneous",
            ScenarioFamily::SteppedEvent => "stepped event",
        })
    }
}

/// Classical (one fault at a time) fault.
#[derive(Debug, Clone)]
pub struct ClassicalFault {
    pub target: GenericEntity,
    pub application: Application,
    pub connection: String,
    /// Fault impedance `[R, X]` in ohms; solid when absent
    pub impedance: Option<Vec<f64>>,
    pub outage: Option<OutageSpec>,
}

impl ClassicalFault {
    pub fn new(target: GenericEntity, application: Application, connection: impl Into<String>) -> Self {
        Self {
            target,
            application,
            connection: connection.into(),
            impedance: None,
            outage: None,
        }
    }

    pub fn with_impedance(mut self, impedance: impl Into<Vec<f64>>) -> Self {
        self.impedance = Some(impedance.into());
        self
    }

    pub fn with_outage(mut self, outage: OutageSpec) -> Self {
        self.outage = Some(outage);
        self
    }

    pub fn check_data(&self, session: &Session) -> OlxResult<ClassicalFaultRequest> {
        let mut report = ValidationReport::new("classical fault");
        check_application(&mut report, &CLASSICAL_APPLICATIONS, self.application);
        let target = check_target(session, &mut report, "target", self.application, &self.target)?;
        let connection = check_connection(&mut report, self.application, Some(&self.connection));
        let impedance = check_impedance::<2>(&mut report, self.impedance.as_deref());
        let outage = match &self.outage {
            Some(spec) => {
                let mut inner = ValidationReport::new("outage");
                let request = spec.collect(session, &mut inner)?;
                report.absorb("outage", inner);
                Some(request)
            }
            None => None,
        };
        report.into_result(ClassicalFaultRequest {
            target,
            application: self.application.code(),
            percent: self.application.percent(),
            connection,
            impedance,
            outage,
        })
    }
}

/// One component of a simultaneous fault.
#[derive(Debug, Clone)]
pub struct SimultaneousFault {
    /// One target, or two buses for `Bus2Bus`
    pub targets: Vec<GenericEntity>,
    pub application: Application,
    /// Absent for `Outage`
    pub connection: Option<String>,
    /// `[Ra, Xa, Rb, Xb, Rc, Xc, Rg, Xg]` in ohms; solid when absent
    pub impedance: Option<Vec<f64>>,
}

impl SimultaneousFault {
    pub fn new(targets: Vec<GenericEntity>, application: Application) -> Self {
        Self {
            targets,
            application,
            connection: None,
            impedance: None,
        }
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn with_impedance(mut self, impedance: impl Into<Vec<f64>>) -> Self {
        self.impedance = Some(impedance.into());
        self
    }

    pub fn check_data(&self, session: &Session) -> OlxResult<SimultaneousFaultRequest> {
        let mut report = ValidationReport::new("simultaneous fault");
        check_application(&mut report, &SIMULTANEOUS_APPLICATIONS, self.application);
        let wanted = match self.application {
            Application::Bus2Bus => 2,
            _ => 1,
        };
        if self.targets.len() != wanted {
            let expected = match wanted {
                2 => "exactly 2 buses".to_string(),
                _ => "exactly one target".to_string(),
            };
            report.add("targets", expected, format!("{} targets", self.targets.len()));
        }
        let mut targets = Vec::with_capacity(self.targets.len());
        for (n, target) in self.targets.iter().enumerate() {
            let field = format!("targets[{n}]");
            targets.push(check_target(session, &mut report, &field, self.application, target)?);
        }
        let connection = check_connection(&mut report, self.application, self.connection.as_deref());
        let impedance = check_impedance::<8>(&mut report, self.impedance.as_deref());
        report.into_result(SimultaneousFaultRequest {
            targets,
            application: self.application.code(),
            percent: self.application.percent(),
            connection,
            impedance,
        })
    }
}

/// Stepped-event simulation: a fault followed by the protection operations it causes.
#[derive(Debug, Clone)]
pub struct SteppedEvent {
    pub target: GenericEntity,
    pub application: Application,
    pub connection: String,
    pub impedance: Option<Vec<f64>>,
    /// Tiers of protection considered around the fault
    pub tiers: i64,
    /// 0/1 per [`DEVICE_CLASSES`] entry
    pub device_flags: Vec<i64>,
}

impl SteppedEvent {
    /// Every device class considered, one tier.
    pub fn new(target: GenericEntity, application: Application, connection: impl Into<String>) -> Self {
        Self {
            target,
            application,
            connection: connection.into(),
            impedance: None,
            tiers: 1,
            device_flags: vec![1; DEVICE_CLASSES.len()],
        }
    }

    pub fn with_impedance(mut self, impedance: impl Into<Vec<f64>>) -> Self {
        self.impedance = Some(impedance.into());
        self
    }

    pub fn with_tiers(mut self, tiers: i64) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_device_flags(mut self, flags: impl Into<Vec<i64>>) -> Self {
        self.device_flags = flags.into();
        self
    }

    /// The request carries no addenda; runs append them.
    pub fn check_data(&self, session: &Session) -> OlxResult<SteppedEventRequest> {
        let mut report = ValidationReport::new("stepped event");
        check_application(&mut report, &STEPPED_APPLICATIONS, self.application);
        let target = check_target(session, &mut report, "target", self.application, &self.target)?;
        let connection = check_connection(&mut report, self.application, Some(&self.connection));
        let impedance = check_impedance::<2>(&mut report, self.impedance.as_deref());
        if self.tiers < 0 {
            report.add("tiers", "an integer >= 0", self.tiers);
        }
        let mut device_flags = [false; 5];
        match expect_flags("device_flags", &self.device_flags, DEVICE_CLASSES.len()) {
            Ok(()) => {
                for (flag, value) in device_flags.iter_mut().zip(&self.device_flags) {
                    *flag = *value == 1;
                }
            }
            Err(issue) => report.issues.push(issue),
        }
        report.into_result(SteppedEventRequest {
            target,
            application: self.application.code(),
            percent: self.application.percent(),
            connection,
            impedance,
            device_flags,
            tiers: u32::try_from(self.tiers).unwrap_or_default(),
            addenda: Vec::new(),
        })
    }
}

/// Further fault applied at a time offset during a stepped event.
#[derive(Debug, Clone)]
pub struct SteppedEventAddendum {
    /// Seconds after fault inception
    pub time: f64,
    pub connection: String,
    pub impedance: Option<Vec<f64>>,
}

impl SteppedEventAddendum {
    pub fn new(time: f64, connection: impl Into<String>) -> Self {
        Self {
            time,
            connection: connection.into(),
            impedance: None,
        }
    }

    pub fn with_impedance(mut self, impedance: impl Into<Vec<f64>>) -> Self {
        self.impedance = Some(impedance.into());
        self
    }

    /// Ordering against other addenda is checked by the run.
    pub fn check_data(&self) -> OlxResult<AddendumRequest> {
        let mut report = ValidationReport::new("stepped event addendum");
        if !(self.time.is_finite() && self.time > 0.0) {
            report.add("time", "a time offset > 0 s", self.time);
        }
        let connection = check_connection(&mut report, Application::Bus, Some(&self.connection));
        let impedance = check_impedance::<2>(&mut report, self.impedance.as_deref());
        report.into_result(AddendumRequest {
            time: self.time,
            connection,
            impedance,
        })
    }
}

/// Any fault scenario.
#[derive(Debug, Clone)]
pub enum FaultScenario {
    Classical(ClassicalFault),
    Simultaneous(SimultaneousFault),
    SteppedEvent(SteppedEvent),
    SteppedEventAddendum(SteppedEventAddendum),
}

impl FaultScenario {
    pub fn family(&self) -> ScenarioFamily {
        match self {
            FaultScenario::Classical(_) => ScenarioFamily::Classical,
            FaultScenario::Simultaneous(_) => ScenarioFamily::Simultaneous,
            FaultScenario::SteppedEvent(_) | FaultScenario::SteppedEventAddendum(_) => {
                ScenarioFamily::SteppedEvent
            }
        }
    }

    pub fn check_data(&self, session: &Session) -> OlxResult<()> {
        match self {
            FaultScenario::Classical(fault) => fault.check_data(session).map(|_| ()),
            FaultScenario::Simultaneous(fault) => fault.check_data(session).map(|_| ()),
            FaultScenario::SteppedEvent(event) => event.check_data(session).map(|_| ()),
            FaultScenario::SteppedEventAddendum(addendum) => addendum.check_data().map(|_| ()),
        }
    }
}

impl From<ClassicalFault> for FaultScenario {
    fn from(fault: ClassicalFault) -> Self {
        FaultScenario::Classical(fault)
    }
}

impl From<SimultaneousFault> for FaultScenario {
    fn from(fault: SimultaneousFault) -> Self {
        FaultScenario::Simultaneous(fault)
    }
}

impl From<SteppedEvent> for FaultScenario {
    fn from(event: SteppedEvent) -> Self {
        FaultScenario::SteppedEvent(event)
    }
}

impl From<SteppedEventAddendum> for FaultScenario {
    fn from(addendum: SteppedEventAddendum) -> Self {
        FaultScenario::SteppedEventAddendum(addendum)
    }
}

fn application_label(application: &Application) -> String {
    match application {
        Application::Intermediate { end_open: false, .. } => "NN%".to_string(),
        Application::Intermediate { end_open: true, .. } => "NN%-EO".to_string(),
        other => other.to_string(),
    }
}

fn check_application(report: &mut ValidationReport, allowed: &[Application], application: Application) {
    if !allowed.contains(&application.shape()) {
        let labels: Vec<String> = allowed.iter().map(application_label).collect();
        report.add("application", one_of(labels.as_slice()), application);
        return;
    }
    if let Application::Intermediate { percent, .. } = application {
        if let Err(issue) = expect_between("application", percent, 0.0, 100.0) {
            report.issues.push(issue);
        }
    }
}

/// Handle of a live target whose kind suits `application`.
///
/// Kind problems are reported; stale targets fail outright.
fn check_target(
    session: &Session,
    report: &mut ValidationReport,
    field: &str,
    application: Application,
    target: &GenericEntity,
) -> OlxResult<Handle> {
    if target.is_deleted() {
        report.add(field, "a live object", format!("deleted {}", target.kind()));
        return Ok(Handle::NONE);
    }
    session.check(target.token(), target.kind())?;
    let kind = target.kind();
    match application {
        Application::Bus | Application::Bus2Bus => {
            if kind != EntityKind::Bus {
                report.add(field, format!("a BUS for {application}"), kind);
            }
        }
        Application::Outage => {
            if !kind.is_branch() {
                report.add(field, format!("a branch for {application}"), kind);
            }
        }
        Application::PhaseOpen => {
            if kind != EntityKind::Terminal {
                report.add(field, format!("a TERMINAL for {application}"), kind);
            }
        }
        Application::Intermediate { .. } => {
            if !matches!(kind, EntityKind::Terminal | EntityKind::RelayGroup) {
                report.add(field, "a TERMINAL or RLYGROUP on a LINE", kind);
            } else {
                let equipment = target.get(session, "EQUIPMENT")?;
                let governing = equipment.as_entity().map(GenericEntity::kind);
                if governing != Some(EntityKind::Line) {
                    let actual = match governing {
                        Some(other) => format!("{kind} on a {other}"),
                        None => format!("{kind} without protected equipment"),
                    };
                    report.add(field, "a TERMINAL or RLYGROUP on a LINE", actual);
                }
            }
        }
        _ => {
            if !matches!(kind, EntityKind::Terminal | EntityKind::RelayGroup) {
                report.add(field, format!("a TERMINAL or RLYGROUP for {application}"), kind);
            }
        }
    }
    Ok(target.handle())
}

/// Engine connection code, 0 when the application takes none.
fn check_connection(
    report: &mut ValidationReport,
    application: Application,
    connection: Option<&str>,
) -> i32 {
    let allowed = connections_for(application);
    let given = connection.map(str::trim).filter(|text| !text.is_empty());
    match given {
        None if allowed.is_empty() => 0,
        Some(text) if allowed.is_empty() => {
            report.add("connection", format!("no connection code for {application}"), format!("\"{text}\""));
            0
        }
        None => {
            report.add("connection", one_of(allowed), "nothing");
            0
        }
        Some(text) => {
            let normalized = text.to_ascii_uppercase();
            match connection_code(application, &normalized) {
                Some(code) => code,
                None => {
                    if let Err(issue) = expect_member("connection", text, allowed) {
                        report.issues.push(issue);
                    }
                    0
                }
            }
        }
    }
}

fn check_impedance<const N: usize>(report: &mut ValidationReport, impedance: Option<&[f64]>) -> [f64; N] {
    let mut out = [0.0; N];
    let Some(values) = impedance else {
        return out;
    };
    match expect_len("impedance", values, &[N]) {
        Ok(()) => {
            for (slot, value) in out.iter_mut().zip(values) {
                *slot = *value;
            }
        }
        Err(issue) => report.issues.push(issue),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::FAULT_CONNECTIONS;

    #[test]
    fn test_connection_check_reports_allowed_set() {
        let mut report = ValidationReport::new("test");
        assert_eq!(check_connection(&mut report, Application::Bus, Some("2lg:ab")), 2);
        assert!(report.is_empty());

        check_connection(&mut report, Application::Bus, Some("XX"));
        let issue = report.issue("connection").unwrap();
        assert!(issue.expected.contains("3LG"));
        assert!(issue.expected.contains("LL:AC"));
        assert_eq!(issue.actual, "\"XX\"");
        assert_eq!(FAULT_CONNECTIONS.len(), 16);
    }

    #[test]
    fn test_outage_application_takes_no_connection() {
        let mut report = ValidationReport::new("test");
        assert_eq!(check_connection(&mut report, Application::Outage, None), 0);
        assert!(report.is_empty());
        check_connection(&mut report, Application::Outage, Some("3LG"));
        assert_eq!(report.issue_count(), 1);
    }

    #[test]
    fn test_impedance_shapes() {
        let mut report = ValidationReport::new("test");
        assert_eq!(check_impedance::<2>(&mut report, None), [0.0, 0.0]);
        assert_eq!(check_impedance::<2>(&mut report, Some(&[0.1, 0.2][..])), [0.1, 0.2]);
        assert!(report.is_empty());
        check_impedance::<8>(&mut report, Some(&[0.1, 0.2][..]));
        assert_eq!(report.issue("impedance").unwrap().expected, "8 numbers");
    }

    #[test]
    fn test_application_families() {
        let mut report = ValidationReport::new("test");
        check_application(&mut report, &STEPPED_APPLICATIONS, "40%".parse().unwrap());
        check_application(&mut report, &CLASSICAL_APPLICATIONS, "40%-EO".parse().unwrap());
        assert!(report.is_empty());

        check_application(&mut report, &STEPPED_APPLICATIONS, Application::RemoteBus);
        let issue = report.issue("application").unwrap();
        assert_eq!(issue.expected, "one of Bus, Close-In, NN%");

        let mut report = ValidationReport::new("test");
        check_application(&mut report, &CLASSICAL_APPLICATIONS, "100%".parse().unwrap());
        assert!(report.issue("application").is_some());
    }
}
