//! The collaborator contract: primitives the access layer needs from the
//! network engine.
//!
//! The engine is reached only through these calls. Every primitive is
//! synchronous; failures return [`EngineFailure`] and the engine's own text is
//! fetched afterwards through [`Engine::last_error_message`], the way a C
//! interface reports errors. Lookups answer [`Handle::NONE`] when nothing
//! matches instead of failing.
//!
//! ```text
//! KeyResolver ──find_*──────────────┐
//! GenericEntity ─read/write/commit──┤
//! Navigator ─enumerate_related──────┼──> dyn Engine
//! OutageBuilder ─build_outage_...───┤
//! runs/results ─run_* / read_*──────┘
//! ```

use std::path::Path;

use tracing::warn;

use crate::error::OlxError;
use crate::handle::Handle;
use crate::kind::{EntityKind, SplitPart};

/// Marker returned by a failed primitive; the message lives in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFailure;

/// Result of a fallible primitive.
pub type Primitive<T> = Result<T, EngineFailure>;

/// Typed buffer exchanged by the field primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBuffer {
    Int(i64),
    Float(f64),
    Text(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Handle(Handle),
    Handles(Vec<Handle>),
}

impl FieldBuffer {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldBuffer::Int(_) => "int",
            FieldBuffer::Float(_) => "float",
            FieldBuffer::Text(_) => "string",
            FieldBuffer::Ints(_) => "int vector",
            FieldBuffer::Floats(_) => "float vector",
            FieldBuffer::Handle(_) => "handle",
            FieldBuffer::Handles(_) => "handle list",
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldBuffer::Float(v) => Some(*v),
            FieldBuffer::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldBuffer::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            FieldBuffer::Handle(h) => Some(*h),
            _ => None,
        }
    }
}

/// String side-data attached to a record outside its field table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Annotation {
    Memo,
    Tags,
    /// User-defined field, by upper-cased name
    UserField(String),
}

/// Phase quantities or symmetrical components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStyle {
    Phase,
    Sequence,
}

/// Unit requested from the pre-fault voltage primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageUnit {
    PerUnit,
    Kilovolts,
}

/// Engine encoding of an outage list attached to a classical fault.
#[derive(Debug, Clone, PartialEq)]
pub struct OutageRequest {
    pub mode: i32,
    pub grounding_admittance: f64,
    pub candidates: Vec<Handle>,
}

/// Engine encoding of one classical fault.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicalFaultRequest {
    pub target: Handle,
    pub application: i32,
    /// Fault location along the line for intermediate applications, else 0
    pub percent: f64,
    pub connection: i32,
    pub impedance: [f64; 2],
    pub outage: Option<OutageRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassicalRequest {
    pub faults: Vec<ClassicalFaultRequest>,
    pub clear_previous: bool,
    pub tiers: u32,
}

/// Engine encoding of one simultaneous fault component.
#[derive(Debug, Clone, PartialEq)]
pub struct SimultaneousFaultRequest {
    pub targets: Vec<Handle>,
    pub application: i32,
    pub percent: f64,
    pub connection: i32,
    pub impedance: [f64; 8],
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimultaneousRequest {
    pub faults: Vec<SimultaneousFaultRequest>,
    pub clear_previous: bool,
    pub tiers: u32,
}

/// Event appended to a stepped-event simulation at a time offset.
#[derive(Debug, Clone, PartialEq)]
pub struct AddendumRequest {
    pub time: f64,
    pub connection: i32,
    pub impedance: [f64; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct SteppedEventRequest {
    pub target: Handle,
    pub application: i32,
    pub percent: f64,
    pub connection: i32,
    pub impedance: [f64; 2],
    pub device_flags: [bool; 5],
    pub tiers: u32,
    pub addenda: Vec<AddendumRequest>,
}

/// One step of a stepped-event simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct StepBuffer {
    pub time: f64,
    pub current: f64,
    pub description: String,
    pub devices: Vec<Handle>,
}

/// Primitives required from the network engine.
pub trait Engine {
    // ---- lifecycle -------------------------------------------------------
    fn open_network(&mut self, path: &Path, read_only: bool) -> Primitive<()>;
    fn close_network(&mut self) -> Primitive<()>;
    fn new_network(&mut self) -> Primitive<()>;

    // ---- lookup ----------------------------------------------------------
    /// GUID or bracketed display string lookup.
    fn find_by_string(&self, text: &str) -> Handle;
    fn find_bus_by_number(&self, number: i64) -> Handle;
    fn find_bus_by_name(&self, name: &str, kv: f64) -> Handle;
    /// Bus-owned records keyed by their bus handles and circuit id.
    fn find_composite(&self, kind: EntityKind, buses: &[Handle], circuit_id: &str) -> Handle;
    /// Runtime kind of a live handle.
    fn kind_of(&self, handle: Handle) -> Option<EntityKind>;
    /// Half addressed by a handle of a split ground/phase device.
    fn split_part(&self, handle: Handle) -> Option<SplitPart>;
    /// The other half of a split device.
    fn companion_of(&self, handle: Handle) -> Handle;

    // ---- fields ----------------------------------------------------------
    fn read_field(&self, handle: Handle, code: u32) -> Primitive<FieldBuffer>;
    fn write_field(&mut self, handle: Handle, code: u32, value: &FieldBuffer) -> Primitive<()>;
    fn read_annotation(&self, handle: Handle, slot: &Annotation) -> Primitive<String>;
    fn write_annotation(&mut self, handle: Handle, slot: &Annotation, text: &str)
        -> Primitive<()>;
    fn setting_names(&self, handle: Handle) -> Primitive<Vec<String>>;
    fn read_setting(&self, handle: Handle, name: &str) -> Primitive<String>;
    fn write_setting(&mut self, handle: Handle, name: &str, value: &str) -> Primitive<()>;
    fn commit(&mut self, handle: Handle) -> Primitive<()>;
    fn delete(&mut self, handle: Handle) -> Primitive<()>;

    // ---- graph -----------------------------------------------------------
    /// Handles of `kind` related to `owner`; `None` enumerates the whole network.
    fn enumerate_related(&self, owner: Option<Handle>, kind: EntityKind) -> Vec<Handle>;
    fn build_outage_candidates(
        &self,
        origin: Handle,
        tier_depth: u32,
        kind_mask: u32,
    ) -> Primitive<Vec<Handle>>;

    // ---- runs (each returns the number of results produced) ---------------
    fn run_classical(&mut self, request: &ClassicalRequest) -> Primitive<usize>;
    fn run_simultaneous(&mut self, request: &SimultaneousRequest) -> Primitive<usize>;
    fn run_stepped_event(&mut self, request: &SteppedEventRequest) -> Primitive<usize>;

    // ---- results (1-based result index) -----------------------------------
    /// Flat `[re, im, re, im, ...]` buffer; `None` reads the fault point.
    fn read_fault_current(
        &self,
        index: usize,
        handle: Option<Handle>,
        style: ReadStyle,
    ) -> Primitive<Vec<f64>>;
    fn read_fault_voltage(
        &self,
        index: usize,
        handle: Handle,
        style: ReadStyle,
    ) -> Primitive<Vec<f64>>;
    fn read_operate_time(
        &self,
        index: usize,
        device: Handle,
        multiplier: f64,
        signal_only: bool,
    ) -> Primitive<f64>;
    /// `[re, im]` of the pre-fault bus voltage.
    fn read_pre_fault_voltage(
        &self,
        index: usize,
        bus: Handle,
        unit: VoltageUnit,
    ) -> Primitive<[f64; 2]>;
    /// `[MVA, X/R ANSI, X/R thevenin, R1, X1, R2, X2, R0, X0]`
    fn read_fault_summary(&self, index: usize) -> Primitive<Vec<f64>>;
    fn read_fault_description(&self, index: usize) -> Primitive<String>;
    fn read_step_count(&self) -> Primitive<usize>;
    fn read_step(&self, step: usize) -> Primitive<StepBuffer>;

    fn last_error_message(&self) -> String;
}

/// Wrap the engine's last error for a failed `operation`.
pub fn failure(engine: &dyn Engine, operation: impl Into<String>) -> OlxError {
    let operation = operation.into();
    let message = engine.last_error_message();
    warn!(%operation, %message, "engine call failed");
    OlxError::Engine { operation, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_accessors() {
        assert_eq!(FieldBuffer::Int(3).as_float(), Some(3.0));
        assert_eq!(FieldBuffer::Text("x".into()).as_text(), Some("x"));
        assert_eq!(FieldBuffer::Float(1.0).as_handle(), None);
        assert_eq!(FieldBuffer::Handles(vec![]).type_name(), "handle list");
    }
}
