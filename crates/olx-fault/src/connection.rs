//! Fault connection codes and fault applications.
//!
//! Connection codes stay strings on the scenario (they are what callers and
//! scenario files write) and are checked against the set that applies to the
//! scenario's application. Applications are parsed into [`Application`].
//!
//! | Application           | Connection set        |
//! |-----------------------|-----------------------|
//! | `Bus2Bus`             | [`BUS2BUS_CONNECTIONS`]   |
//! | `Phase-Open`          | [`PHASE_OPEN_CONNECTIONS`] |
//! | `Outage`              | none                  |
//! | everything else       | [`FAULT_CONNECTIONS`] |

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shunt fault connections: three phase, double line to ground, single line
/// to ground and line to line, in every phase permutation.
pub const FAULT_CONNECTIONS: [&str; 16] = [
    "3LG", "2LG:AB", "2LG:BA", "2LG:BC", "2LG:CB", "2LG:CA", "2LG:AC", "1LG:A", "1LG:B", "1LG:C",
    "LL:AB", "LL:BA", "LL:BC", "LL:CB", "LL:CA", "LL:AC",
];

/// Phase pairs joined by a bus-to-bus fault.
pub const BUS2BUS_CONNECTIONS: [&str; 6] = ["AA", "BB", "CC", "AB", "BC", "CA"];

/// Open conductors of a phase-open fault.
pub const PHASE_OPEN_CONNECTIONS: [&str; 7] = ["A", "B", "C", "AB", "BC", "CA", "ABC"];

/// Connection codes accepted for `application`, empty when it takes none.
pub fn connections_for(application: Application) -> &'static [&'static str] {
    match application {
        Application::Bus2Bus => &BUS2BUS_CONNECTIONS,
        Application::PhaseOpen => &PHASE_OPEN_CONNECTIONS,
        Application::Outage => &[],
        _ => &FAULT_CONNECTIONS,
    }
}

/// Engine code of a connection: 1-based position in its set.
pub fn connection_code(application: Application, connection: &str) -> Option<i32> {
    connections_for(application)
        .iter()
        .position(|code| *code == connection)
        .map(|index| index as i32 + 1)
}

/// Where a fault is applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Application {
    /// Whole bus
    Bus,
    /// At the relay group end of the branch
    CloseIn,
    /// Close-in with the far end open
    CloseInEndOpen,
    /// At the far bus of the branch
    RemoteBus,
    /// At the far end with the far breaker open
    LineEnd,
    /// Along the line, `percent` measured from the relay group end
    Intermediate { percent: f64, end_open: bool },
    /// Between two buses
    Bus2Bus,
    /// Branch taken out of service
    Outage,
    /// Open conductor at a branch end
    PhaseOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown fault application '{0}': expected Bus, Close-In, Close-In-EO, Remote-Bus, Line-End, NN%, NN%-EO, Bus2Bus, Outage or Phase-Open")]
pub struct UnknownApplication(pub String);

impl Application {
    /// Engine application code.
    pub fn code(self) -> i32 {
        match self {
            Application::Bus => 1,
            Application::CloseIn => 2,
            Application::CloseInEndOpen => 3,
            Application::RemoteBus => 4,
            Application::LineEnd => 5,
            Application::Intermediate { end_open: false, .. } => 6,
            Application::Intermediate { end_open: true, .. } => 7,
            Application::Bus2Bus => 8,
            Application::Outage => 9,
            Application::PhaseOpen => 10,
        }
    }

    /// Fault location sent with intermediate faults, 0 otherwise.
    pub fn percent(self) -> f64 {
        match self {
            Application::Intermediate { percent, .. } => percent,
            _ => 0.0,
        }
    }

    /// Same application with the intermediate location blanked out, for
    /// membership tests against a family's allowed list.
    pub(crate) fn shape(self) -> Self {
        match self {
            Application::Intermediate { end_open, .. } => Application::Intermediate {
                percent: 0.0,
                end_open,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Application::Bus => f.write_str("Bus"),
            Application::CloseIn => f.write_str("Close-In"),
            Application::CloseInEndOpen => f.write_str("Close-In-EO"),
            Application::RemoteBus => f.write_str("Remote-Bus"),
            Application::LineEnd => f.write_str("Line-End"),
            Application::Intermediate {
                percent,
                end_open: false,
            } => write!(f, "{percent}%"),
            Application::Intermediate {
                percent,
                end_open: true,
            } => write!(f, "{percent}%-EO"),
            Application::Bus2Bus => f.write_str("Bus2Bus"),
            Application::Outage => f.write_str("Outage"),
            Application::PhaseOpen => f.write_str("Phase-Open"),
        }
    }
}

impl FromStr for Application {
    type Err = UnknownApplication;

    /// Case-insensitive; `NN%` and `NN%-EO` take any number for `NN`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let upper = text.trim().to_ascii_uppercase();
        let named = match upper.as_str() {
            "BUS" => Some(Application::Bus),
            "CLOSE-IN" => Some(Application::CloseIn),
            "CLOSE-IN-EO" => Some(Application::CloseInEndOpen),
            "REMOTE-BUS" => Some(Application::RemoteBus),
            "LINE-END" => Some(Application::LineEnd),
            "BUS2BUS" => Some(Application::Bus2Bus),
            "OUTAGE" => Some(Application::Outage),
            "PHASE-OPEN" => Some(Application::PhaseOpen),
            _ => None,
        };
        if let Some(application) = named {
            return Ok(application);
        }
        let (number, end_open) = match upper.strip_suffix("%-EO") {
            Some(number) => (number, true),
            None => match upper.strip_suffix('%') {
                Some(number) => (number, false),
                None => return Err(UnknownApplication(text.to_string())),
            },
        };
        number
            .trim()
            .parse::<f64>()
            .map(|percent| Application::Intermediate { percent, end_open })
            .map_err(|_| UnknownApplication(text.to_string()))
    }
}

impl TryFrom<String> for Application {
    type Error = UnknownApplication;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<Application> for String {
    fn from(application: Application) -> Self {
        application.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_and_intermediate() {
        assert_eq!("close-in-eo".parse::<Application>().unwrap(), Application::CloseInEndOpen);
        assert_eq!(
            "35%".parse::<Application>().unwrap(),
            Application::Intermediate {
                percent: 35.0,
                end_open: false
            }
        );
        assert_eq!(
            "12.5%-EO".parse::<Application>().unwrap(),
            Application::Intermediate {
                percent: 12.5,
                end_open: true
            }
        );
        assert!("Middle".parse::<Application>().is_err());
        assert!("x%".parse::<Application>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["Bus", "Close-In", "Remote-Bus", "40%-EO", "Phase-Open", "Bus2Bus"] {
            let parsed: Application = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn test_connection_sets_follow_application() {
        assert_eq!(connection_code(Application::Bus, "3LG"), Some(1));
        assert_eq!(connection_code(Application::Bus, "LL:AC"), Some(16));
        assert_eq!(connection_code(Application::Bus2Bus, "CA"), Some(6));
        assert_eq!(connection_code(Application::Bus2Bus, "3LG"), None);
        assert_eq!(connection_code(Application::PhaseOpen, "ABC"), Some(7));
        assert!(connections_for(Application::Outage).is_empty());
    }
}
