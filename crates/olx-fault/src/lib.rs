//! # olx-fault: Fault Scenarios and Results
//!
//! Typed fault scenarios for the engine behind an [`olx_core::Session`],
//! checked before they are run, and accessors for the results they produce.
//!
//! ```rust,ignore
//! use olx_core::{EntityKind, VoltageUnit};
//! use olx_fault::{run, Application, ClassicalFault, OutageSpec, RunOptions};
//!
//! let bus = session.resolve_str(EntityKind::Bus, "[BUS] 'NEVADA' 132 kV")?;
//! let mut outage = OutageSpec::new("Single");
//! outage.add_candidates(&session, &bus, 1, &["L"])?;
//!
//! let fault = ClassicalFault::new(bus.clone(), Application::Bus, "1LG:A")
//!     .with_impedance([0.1, 0.2])
//!     .with_outage(outage);
//! let results = run(&mut session, &[fault.into()], RunOptions::default())?;
//!
//! for result in &results {
//!     println!("{}: {}", result.description(&session)?, result.short_circuit_mva(&session)?);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`connection`] - Connection codes and fault applications
//! - [`scenario`] - Scenario variants and their checks
//! - [`outage`] - Outage lists and candidate collection
//! - [`run`] - Submitting a family of scenarios
//! - [`result`] - Reading currents, voltages, operate times and steps
//! - [`file`] - YAML/JSON scenario documents

pub mod connection;
pub mod file;
pub mod outage;
pub mod result;
pub mod run;
pub mod scenario;

pub use connection::{Application, UnknownApplication};
pub use file::{load_scenarios, OutageAround, OutageEntry, ScenarioDocument, ScenarioEntry};
pub use outage::{OutageBuilder, OutageMode, OutageSpec};
pub use result::{FaultResult, SequenceImpedance, StepResult, Triplet, XrRatios};
pub use run::{run, RunOptions};
pub use scenario::{
    ClassicalFault, FaultScenario, ScenarioFamily, SimultaneousFault, SteppedEvent,
    SteppedEventAddendum, DEVICE_CLASSES,
};
