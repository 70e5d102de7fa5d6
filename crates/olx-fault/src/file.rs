//! Scenario documents on disk (YAML or JSON).
//!
//! Targets are written as display strings (`[BUS] 'NEVADA' 132 kV`),
//! constructor strings (`BUS('NEVADA', 132)`) or GUIDs; the object kind comes
//! from the key itself. Codes stay strings.
//!
//! ```yaml
//! defaults:
//!   tiers: 2
//! scenarios:
//!   - type: classical
//!     target: "[BUS] 'NEVADA' 132 kV"
//!     application: Bus
//!     connection: "2LG:AB"
//!     impedance: [0.1, 0.2]
//!     outage:
//!       mode: Single
//!       around:
//!         origin: "[BUS] 'NEVADA' 132 kV"
//!         kinds: [L]
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use olx_core::{EntityKind, GenericEntity, OlxError, OlxResult, Session};

use crate::connection::Application;
use crate::outage::OutageSpec;
use crate::run::RunOptions;
use crate::scenario::{
    ClassicalFault, FaultScenario, SimultaneousFault, SteppedEvent, SteppedEventAddendum,
    DEVICE_CLASSES,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioDocument {
    /// Run options applied when the caller leaves them unset
    #[serde(default)]
    pub defaults: RunOptions,
    #[serde(default)]
    pub scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEntry {
    Classical {
        target: String,
        application: Application,
        connection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        impedance: Option<Vec<f64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outage: Option<OutageEntry>,
    },
    Simultaneous {
        targets: Vec<String>,
        application: Application,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        impedance: Option<Vec<f64>>,
    },
    SteppedEvent {
        target: String,
        application: Application,
        connection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        impedance: Option<Vec<f64>>,
        #[serde(default = "default_tiers")]
        tiers: i64,
        #[serde(default = "default_device_flags")]
        device_flags: Vec<i64>,
    },
    SteppedEventAddendum {
        time: f64,
        connection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        impedance: Option<Vec<f64>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutageEntry {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_admittance: Option<f64>,
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Candidates collected around an origin, added after `candidates`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub around: Option<OutageAround>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutageAround {
    pub origin: String,
    #[serde(default = "default_outage_tiers")]
    pub tiers: u32,
    #[serde(default = "default_outage_kinds")]
    pub kinds: Vec<String>,
}

fn default_tiers() -> i64 {
    1
}

fn default_device_flags() -> Vec<i64> {
    vec![1; DEVICE_CLASSES.len()]
}

fn default_outage_tiers() -> u32 {
    1
}

fn default_outage_kinds() -> Vec<String> {
    vec!["ALL".to_string()]
}

/// Read a scenario document, by extension or by trying YAML then JSON.
pub fn load_scenarios(path: &Path) -> OlxResult<ScenarioDocument> {
    let load = || -> anyhow::Result<ScenarioDocument> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading scenario file '{}'", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                serde_yaml::from_str(&data)
                    .with_context(|| format!("parsing scenario yaml '{}'", path.display()))
            }
            Some(ext) if ext.eq_ignore_ascii_case("json") => serde_json::from_str(&data)
                .with_context(|| format!("parsing scenario json '{}'", path.display())),
            _ => serde_yaml::from_str(&data)
                .or_else(|_| serde_json::from_str(&data))
                .with_context(|| format!("parsing scenario file '{}'", path.display())),
        }
    };
    load().map_err(OlxError::from)
}

impl ScenarioDocument {
    /// The document's run options under any the caller set.
    pub fn run_options(&self, caller: RunOptions) -> RunOptions {
        caller.or(self.defaults)
    }

    /// Resolve every target against the open network.
    pub fn into_scenarios(self, session: &Session) -> OlxResult<Vec<FaultScenario>> {
        session.ensure_open()?;
        let mut out = Vec::with_capacity(self.scenarios.len());
        for (n, entry) in self.scenarios.into_iter().enumerate() {
            let scenario = entry.into_scenario(session)?;
            debug!(entry = n, family = %scenario.family(), "scenario resolved");
            out.push(scenario);
        }
        Ok(out)
    }
}

impl ScenarioEntry {
    fn into_scenario(self, session: &Session) -> OlxResult<FaultScenario> {
        let scenario: FaultScenario = match self {
            ScenarioEntry::Classical {
                target,
                application,
                connection,
                impedance,
                outage,
            } => {
                let mut fault = ClassicalFault::new(resolve_target(session, &target)?, application, connection);
                fault.impedance = impedance;
                fault.outage = outage.map(|entry| entry.into_spec(session)).transpose()?;
                fault.into()
            }
            ScenarioEntry::Simultaneous {
                targets,
                application,
                connection,
                impedance,
            } => {
                let targets = targets
                    .iter()
                    .map(|text| resolve_target(session, text))
                    .collect::<OlxResult<Vec<_>>>()?;
                let mut fault = SimultaneousFault::new(targets, application);
                fault.connection = connection;
                fault.impedance = impedance;
                fault.into()
            }
            ScenarioEntry::SteppedEvent {
                target,
                application,
                connection,
                impedance,
                tiers,
                device_flags,
            } => {
                let mut event = SteppedEvent::new(resolve_target(session, &target)?, application, connection)
                    .with_tiers(tiers)
                    .with_device_flags(device_flags);
                event.impedance = impedance;
                event.into()
            }
            ScenarioEntry::SteppedEventAddendum {
                time,
                connection,
                impedance,
            } => {
                let mut addendum = SteppedEventAddendum::new(time, connection);
                addendum.impedance = impedance;
                addendum.into()
            }
        };
        Ok(scenario)
    }
}

impl OutageEntry {
    fn into_spec(self, session: &Session) -> OlxResult<OutageSpec> {
        let candidates = self
            .candidates
            .iter()
            .map(|text| resolve_target(session, text))
            .collect::<OlxResult<Vec<_>>>()?;
        let mut spec = OutageSpec::new(self.mode).with_candidates(candidates);
        spec.grounding_admittance = self.grounding_admittance;
        if let Some(around) = self.around {
            let origin = resolve_target(session, &around.origin)?;
            spec.add_candidates(session, &origin, around.tiers, around.kinds.as_slice())?;
        }
        Ok(spec)
    }
}

/// Resolve a key whose text names its own kind.
fn resolve_target(session: &Session, text: &str) -> OlxResult<GenericEntity> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('[') {
        let tag = rest.split(']').next().unwrap_or_default();
        let kind = EntityKind::from_tag(tag)
            .ok_or_else(|| OlxError::Parse(format!("unknown object tag in '{text}'")))?;
        return session.resolve_str(kind, text);
    }
    if text.contains('(') {
        return GenericEntity::from_ctor_string(session, text);
    }
    let handle = session.engine().find_by_string(text);
    if handle.is_live() {
        return session.wrap(handle);
    }
    Err(OlxError::Parse(format!(
        "scenario target '{text}' is not a display string, constructor string or known GUID"
    )))
}
