//! In-memory engine for test suites.
//!
//! [`MockEngine`] keeps records in a map keyed by handle and answers every
//! [`Engine`] primitive from it. Display-string lookup compares against the
//! strings [`crate::keystr`] builds, so resolution round-trips exactly as it
//! would against a real engine. Fault runs solve nothing: results are
//! synthesized deterministically from the run request.
//!
//! The sample network opened from [`SAMPLE_PATH`]:
//!
//! ```text
//!   NEVADA 33 ── XFMR ── NEVADA 132 ── LINE ── OHIO 132 ── SWITCH ── TENNESSEE 132
//!                           │                     │                      │
//!                           └──── LINE ──── CLAYTOR 132 ────── LINE ─────┘
//!                       (stored CLAYTOR→NEVADA)   │
//!                                        XFMR3 ── CLAYTOR 33, CLAYTOR 13.8
//! ```
//!
//! NEVADA→OHIO and CLAYTOR→NEVADA are mutually coupled.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::config::OlxConfig;
use crate::engine::{
    Annotation, ClassicalRequest, Engine, EngineFailure, FieldBuffer, Primitive, ReadStyle,
    SimultaneousRequest, StepBuffer, SteppedEventRequest, VoltageUnit,
};
use crate::error::OlxResult;
use crate::handle::Handle;
use crate::key::is_guid;
use crate::keystr;
use crate::kind::{EntityKind, KeyShape, SplitPart};
use crate::schema::{self, ValueKind};
use crate::session::Session;

/// Path the mock engine recognizes as the sample network.
pub const SAMPLE_PATH: &str = "sample.olr";

/// Operate time reported for devices that do not trip.
pub const NO_TRIP_SECONDS: f64 = 9999.0;

/// Mutating engine call, as seen by a [`Journal`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Write { handle: Handle, code: u32 },
    Annotate { handle: Handle, slot: Annotation },
    Setting { handle: Handle, name: String },
    Commit(Handle),
    Delete(Handle),
    Run(&'static str),
}

#[derive(Debug, Default)]
struct JournalState {
    calls: Vec<Call>,
    failing_codes: HashSet<u32>,
    failing_handles: HashSet<Handle>,
}

/// Shared view into a [`MockEngine`] that outlives boxing it into a session.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    state: Rc<RefCell<JournalState>>,
}

impl Journal {
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Field writes issued so far.
    pub fn writes(&self) -> Vec<(Handle, u32)> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Write { handle, code } => Some((*handle, *code)),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Make every later write to field `code` fail.
    pub fn fail_writes_to(&self, code: u32) {
        self.state.borrow_mut().failing_codes.insert(code);
    }

    /// Make every later write to, or delete of, `handle` fail.
    pub fn fail_calls_on(&self, handle: Handle) {
        self.state.borrow_mut().failing_handles.insert(handle);
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn rejects(&self, code: u32) -> bool {
        self.state.borrow().failing_codes.contains(&code)
    }

    fn refuses(&self, handle: Handle) -> bool {
        self.state.borrow().failing_handles.contains(&handle)
    }
}

#[derive(Debug, Clone)]
struct Record {
    kind: EntityKind,
    part: Option<SplitPart>,
    companion: Handle,
    fields: BTreeMap<u32, FieldBuffer>,
    annotations: BTreeMap<Annotation, String>,
    settings: Vec<(String, String)>,
}

impl Record {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            part: None,
            companion: Handle::NONE,
            fields: BTreeMap::new(),
            annotations: BTreeMap::new(),
            settings: Vec::new(),
        }
    }

    fn put(&mut self, name: &str, value: FieldBuffer) {
        let code = schema::builtin().code(self.kind, name);
        debug_assert!(code.is_some(), "{} has no field {name}", self.kind);
        if let Some(code) = code {
            self.fields.insert(code, value);
        }
    }

    fn field(&self, name: &str) -> Option<&FieldBuffer> {
        let code = schema::builtin().code(self.kind, name)?;
        self.fields.get(&code)
    }

    fn handle(&self, name: &str) -> Handle {
        self.field(name)
            .and_then(FieldBuffer::as_handle)
            .unwrap_or(Handle::NONE)
    }

    fn text(&self, name: &str) -> String {
        self.field(name)
            .and_then(FieldBuffer::as_text)
            .unwrap_or_default()
            .to_string()
    }

    fn float(&self, name: &str) -> f64 {
        self.field(name)
            .and_then(FieldBuffer::as_float)
            .unwrap_or_default()
    }

    /// Buses a record hangs off, in field order.
    fn buses(&self) -> Vec<Handle> {
        ["BUS", "BUS1", "BUS2", "BUS3"]
            .iter()
            .map(|name| self.handle(name))
            .filter(Handle::is_live)
            .collect()
    }

    fn refers_to(&self, owner: Handle) -> bool {
        self.fields.values().any(|value| match value {
            FieldBuffer::Handle(h) => *h == owner,
            FieldBuffer::Handles(list) => list.contains(&owner),
            _ => false,
        })
    }
}

/// Records of one open network.
#[derive(Debug, Clone)]
struct Network {
    records: BTreeMap<Handle, Record>,
    next: i64,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            next: 1,
        }
    }
}

fn h(handle: Handle) -> FieldBuffer {
    FieldBuffer::Handle(handle)
}

fn t(text: &str) -> FieldBuffer {
    FieldBuffer::Text(text.to_string())
}

fn f(value: f64) -> FieldBuffer {
    FieldBuffer::Float(value)
}

fn i(value: i64) -> FieldBuffer {
    FieldBuffer::Int(value)
}

fn fv(values: &[f64]) -> FieldBuffer {
    FieldBuffer::Floats(values.to_vec())
}

fn guid(handle: Handle) -> String {
    format!("{{{:08X}-0000-4000-8000-{:012X}}}", handle.value(), handle.value())
}

impl Network {
    fn add(&mut self, kind: EntityKind, fields: Vec<(&str, FieldBuffer)>) -> Handle {
        let handle = Handle::new(self.next);
        self.next += 1;
        let mut record = Record::new(kind);
        for (name, value) in fields {
            record.put(name, value);
        }
        record.put("GUID", t(&guid(handle)));
        self.records.insert(handle, record);
        handle
    }

    fn set(&mut self, handle: Handle, name: &str, value: FieldBuffer) {
        if let Some(record) = self.records.get_mut(&handle) {
            record.put(name, value);
        }
    }

    fn bus(&mut self, name: &str, kv: f64, number: i64) -> Handle {
        self.add(
            EntityKind::Bus,
            vec![
                ("NAME", t(name)),
                ("KV", f(kv)),
                ("NO", i(number)),
                ("AREANO", i(1)),
                ("ZONENO", i(1)),
            ],
        )
    }

    /// Branch plus one terminal per end. Returns the branch and its terminals
    /// in bus order.
    fn branch(
        &mut self,
        kind: EntityKind,
        buses: &[Handle],
        cid: &str,
        mut fields: Vec<(&str, FieldBuffer)>,
    ) -> (Handle, Vec<Handle>) {
        let names = ["BUS1", "BUS2", "BUS3"];
        for (name, bus) in names.into_iter().zip(buses) {
            fields.push((name, h(*bus)));
        }
        fields.push(("CID", t(cid)));
        let branch = self.add(kind, fields);

        let code = kind.branch_code().map(String::from).unwrap_or_default();
        let ends: Vec<(Handle, Handle)> = match buses {
            [a, b] => vec![(*a, *b), (*b, *a)],
            [a, b, c] => vec![(*a, *b), (*b, *a), (*c, *a)],
            _ => Vec::new(),
        };
        let terminals = ends
            .into_iter()
            .map(|(near, far)| {
                self.add(
                    EntityKind::Terminal,
                    vec![
                        ("BUS1", h(near)),
                        ("BUS2", h(far)),
                        ("CID", t(cid)),
                        ("BRCODE", t(&code)),
                        ("EQUIPMENT", h(branch)),
                        ("FLAG", i(1)),
                    ],
                )
            })
            .collect();
        (branch, terminals)
    }

    /// Relay group at a terminal, keyed like the terminal.
    fn group(&mut self, terminal: Handle) -> Handle {
        let Some(end) = self.records.get(&terminal).cloned() else {
            return Handle::NONE;
        };
        self.add(
            EntityKind::RelayGroup,
            vec![
                ("BUS1", h(end.handle("BUS1"))),
                ("BUS2", h(end.handle("BUS2"))),
                ("CID", t(&end.text("CID"))),
                ("BRCODE", t(&end.text("BRCODE"))),
                ("OPFLAG", i(1)),
            ],
        )
    }

    fn device(
        &mut self,
        kind: EntityKind,
        group: Handle,
        id: &str,
        mut fields: Vec<(&str, FieldBuffer)>,
    ) -> Handle {
        fields.extend([("RLYGROUP", h(group)), ("ID", t(id))]);
        if !fields.iter().any(|(name, _)| *name == "FLAG") {
            fields.push(("FLAG", i(1)));
        }
        let device = self.add(kind, fields);
        let settings: &[(&str, &str)] = match kind {
            EntityKind::RelayOcGround | EntityKind::RelayOcPhase => {
                &[("PICKUP", "4.0"), ("TDIAL", "2.0"), ("CURVE", "CO8")]
            }
            EntityKind::RelayDsGround | EntityKind::RelayDsPhase => {
                &[("Z1", "3.5"), ("Z2", "6.0"), ("Z3", "9.0")]
            }
            EntityKind::Fuse => &[("RATING", "100")],
            EntityKind::Recloser => &[("FASTCURVE", "A"), ("SLOWCURVE", "C")],
            _ => &[],
        };
        if let Some(record) = self.records.get_mut(&device) {
            record.settings = settings
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
        }
        device
    }

    /// Ground and phase halves of a split device, ground first.
    fn split_device(&mut self, kind: EntityKind, group: Handle, id: &str) -> (Handle, Handle) {
        let fields = || {
            vec![
                ("TOTALOPS", i(3)),
                ("FASTOPS", i(1)),
                ("INTRPTIME", f(0.05)),
                ("RECLOSETIMES", fv(&[0.5, 2.0, 5.0])),
            ]
        };
        let ground = self.device(kind, group, id, fields());
        let phase = self.device(kind, group, id, fields());
        for (half, part, other) in [
            (ground, SplitPart::Ground, phase),
            (phase, SplitPart::Phase, ground),
        ] {
            if let Some(record) = self.records.get_mut(&half) {
                record.part = Some(part);
                record.companion = other;
            }
        }
        (ground, phase)
    }

    fn sample() -> Self {
        use EntityKind::*;
        let mut net = Network::default();

        let nv = net.bus("NEVADA", 132.0, 1);
        let oh = net.bus("OHIO", 132.0, 2);
        let cl = net.bus("CLAYTOR", 132.0, 3);
        let tn = net.bus("TENNESSEE", 132.0, 4);
        let nv33 = net.bus("NEVADA", 33.0, 5);
        let cl33 = net.bus("CLAYTOR", 33.0, 6);
        let cl14 = net.bus("CLAYTOR", 13.8, 7);
        net.set(nv, "SLACK", i(1));
        if let Some(bus) = net.records.get_mut(&nv) {
            bus.annotations.insert(Annotation::Memo, "Main substation".into());
        }

        let line = |name: &str, r: f64, x: f64| {
            vec![
                ("NAME", t(name)),
                ("R", f(r)),
                ("X", f(x)),
                ("R0", f(3.0 * r)),
                ("X0", f(3.0 * x)),
                ("B1", f(0.02)),
                ("LN", f(40.0)),
                ("FLAG", i(1)),
                ("RATG", fv(&[600.0, 700.0, 800.0, 900.0])),
                ("TYPE", t("ACSR")),
            ]
        };
        let (nv_oh, nv_oh_ends) = net.branch(Line, &[nv, oh], "1", line("NV-OH", 0.01, 0.08));
        net.branch(Line, &[oh, cl], "1", line("OH-CL", 0.012, 0.09));
        net.branch(Line, &[cl, tn], "1", line("CL-TN", 0.015, 0.1));
        let (cl_nv, cl_nv_ends) = net.branch(Line, &[cl, nv], "1", line("NV-CL", 0.02, 0.12));
        let (xfmr, xfmr_ends) = net.branch(
            Transformer2W,
            &[nv, nv33],
            "1",
            vec![
                ("NAME", t("NV-T1")),
                ("R", f(0.001)),
                ("X", f(0.05)),
                ("CONFIGP", i(3)),
                ("CONFIGS", i(2)),
                ("MVA", fv(&[100.0, 133.0, 166.0])),
                ("TAPP", f(132.0)),
                ("FLAG", i(1)),
            ],
        );
        net.branch(
            Transformer3W,
            &[cl, cl33, cl14],
            "1",
            vec![
                ("NAME", t("CL-T3")),
                ("ZPS", fv(&[0.001, 0.06])),
                ("ZPT", fv(&[0.002, 0.09])),
                ("ZST", fv(&[0.001, 0.04])),
                ("FLAG", i(1)),
            ],
        );
        net.branch(
            Switch,
            &[oh, tn],
            "1",
            vec![("NAME", t("OH-TN SW")), ("STAT", i(1)), ("RATING", f(1200.0)), ("DEFAULT", i(1)), ("FLAG", i(1))],
        );

        net.add(Generator, vec![("BUS", h(nv33)), ("FLAG", i(1)), ("SCHEDV", f(1.02)), ("REGBUS", h(nv33))]);
        net.add(
            GenUnit,
            vec![
                ("BUS", h(nv33)),
                ("CID", t("1")),
                ("FLAG", i(1)),
                ("Z1", fv(&[0.0, 0.2])),
                ("Z2", fv(&[0.0, 0.2])),
                ("Z0", fv(&[0.0, 0.05])),
                ("MVARATE", f(150.0)),
            ],
        );
        net.add(Load, vec![("BUS", h(oh)), ("FLAG", i(1))]);
        net.add(
            LoadUnit,
            vec![
                ("BUS", h(oh)),
                ("CID", t("1")),
                ("FLAG", i(1)),
                ("MW", fv(&[50.0, 0.0, 0.0])),
                ("MVAR", fv(&[10.0, 0.0, 0.0])),
            ],
        );
        net.add(Shunt, vec![("BUS", h(tn)), ("FLAG", i(1))]);
        net.add(
            ShuntUnit,
            vec![("BUS", h(tn)), ("CID", t("1")), ("FLAG", i(1)), ("B1", f(0.15)), ("B0", f(0.15))],
        );

        // Protection at both ends of NEVADA-OHIO, at NEVADA on the coupled
        // line, and at the high side of the NEVADA transformer.
        let group_nv = net.group(nv_oh_ends[0]);
        let group_oh = net.group(nv_oh_ends[1]);
        let group_cl_nv = net.group(cl_nv_ends[1]);
        let group_xfmr = net.group(xfmr_ends[0]);
        net.set(nv_oh, "RLYGROUP1", h(group_nv));
        net.set(nv_oh, "RLYGROUP2", h(group_oh));
        net.set(cl_nv, "RLYGROUP2", h(group_cl_nv));
        net.set(xfmr, "RLYGROUP1", h(group_xfmr));
        net.set(group_nv, "BACKUP", FieldBuffer::Handles(vec![group_cl_nv]));

        let oc = |polar: i64| {
            vec![
                ("CT", f(120.0)),
                ("TAP", f(4.0)),
                ("TDIAL", f(2.0)),
                ("INST", f(0.0)),
                ("CURVE", t("CO8")),
                ("POLAR", i(polar)),
            ]
        };
        let ds = || {
            vec![
                ("REACH", fv(&[3.5, 6.0, 9.0])),
                ("DELAY", fv(&[0.0, 0.3, 1.0])),
                ("KMAG", f(0.8)),
                ("KANG", f(-5.0)),
                ("TYPE", t("MHO")),
            ]
        };
        net.device(RelayOcGround, group_nv, "NV-G1", oc(2));
        net.device(RelayOcPhase, group_nv, "NV-P1", oc(1));
        net.device(RelayDsGround, group_nv, "NV-Z1G", ds());
        net.device(RelayDsPhase, group_nv, "NV-Z1P", ds());
        net.device(
            Scheme,
            group_nv,
            "POTT",
            vec![("LOGIC", t("POTT")), ("PILOTGROUP", h(group_oh))],
        );
        let mut out_of_service = oc(0);
        out_of_service.push(("FLAG", i(2)));
        net.device(RelayOcPhase, group_oh, "OH-P1", out_of_service);
        net.split_device(Recloser, group_oh, "R1");
        net.device(RelayOcGround, group_cl_nv, "CL-G1", oc(0));
        net.device(
            Fuse,
            group_xfmr,
            "F1",
            vec![("RATING", f(100.0)), ("TIMEMULT", f(1.0)), ("CURVE", t("K"))],
        );

        net.add(
            Breaker,
            vec![
                ("BUS", h(nv)),
                ("NAME", t("NV-B1")),
                ("FLAG", i(1)),
                ("OBJLST1", FieldBuffer::Handles(vec![nv_oh, xfmr])),
                ("RATING", f(40.0)),
                ("NACD", i(0)),
            ],
        );
        net.add(
            MutualPair,
            vec![
                ("LINE1", h(nv_oh)),
                ("LINE2", h(cl_nv)),
                ("FROM1", f(0.0)),
                ("TO1", f(100.0)),
                ("FROM2", f(10.0)),
                ("TO2", f(80.0)),
                ("R", f(0.02)),
                ("X", f(0.06)),
            ],
        );
        net
    }
}

/// A synthesized fault result.
#[derive(Debug, Clone)]
struct MockResult {
    target: Handle,
    connection: i32,
    /// Contingency number within its fault, 0 for the base case
    contingency: usize,
}

/// In-memory [`Engine`].
#[derive(Debug)]
pub struct MockEngine {
    network: Option<Network>,
    read_only: bool,
    results: Vec<MockResult>,
    steps: Vec<StepBuffer>,
    last_error: RefCell<String>,
    journal: Journal,
}

impl MockEngine {
    /// Engine that knows the sample network at [`SAMPLE_PATH`]; nothing is open yet.
    pub fn sample() -> Self {
        Self {
            network: None,
            read_only: false,
            results: Vec::new(),
            steps: Vec::new(),
            last_error: RefCell::new(String::new()),
            journal: Journal::default(),
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn fail<T>(&self, message: impl Into<String>) -> Primitive<T> {
        *self.last_error.borrow_mut() = message.into();
        Err(EngineFailure)
    }

    fn net(&self) -> Primitive<&Network> {
        match &self.network {
            Some(net) => Ok(net),
            None => self.fail("no network is open"),
        }
    }

    fn record(&self, handle: Handle) -> Primitive<&Record> {
        match self.net()?.records.get(&handle) {
            Some(record) => Ok(record),
            None => self.fail(format!("invalid handle {handle}")),
        }
    }

    /// Mutable record, refused on read-only networks.
    fn record_mut(&mut self, handle: Handle) -> Primitive<&mut Record> {
        if self.read_only {
            return self.fail("network was opened read-only");
        }
        if !self.net()?.records.contains_key(&handle) {
            return self.fail(format!("invalid handle {handle}"));
        }
        match self.network.as_mut().and_then(|net| net.records.get_mut(&handle)) {
            Some(record) => Ok(record),
            None => Err(EngineFailure),
        }
    }

    fn records(&self) -> impl Iterator<Item = (&Handle, &Record)> {
        self.network.iter().flat_map(|net| net.records.iter())
    }

    fn display(&self, handle: Handle, record: &Record) -> Option<String> {
        let text = match record.part {
            Some(part) => keystr::part_key_string(self, record.kind, handle, part),
            None => keystr::key_string(self, record.kind, handle),
        };
        text.ok()
    }

    fn result(&self, index: usize) -> Primitive<&MockResult> {
        match index.checked_sub(1).and_then(|i| self.results.get(i)) {
            Some(result) => Ok(result),
            None => self.fail(format!(
                "result index {index} out of range ({} results stored)",
                self.results.len()
            )),
        }
    }

    fn check_target(&self, handle: Handle) -> Primitive<()> {
        self.record(handle).map(|_| ())
    }

    fn store_results(&mut self, clear: bool, produced: Vec<MockResult>) -> usize {
        if clear {
            self.results.clear();
        }
        let count = produced.len();
        self.results.extend(produced);
        count
    }

    /// Result seed: distinct per stored result, so reads can be told apart.
    fn seed(&self, index: usize, result: &MockResult) -> f64 {
        1000.0 + 100.0 * index as f64 + 10.0 * result.contingency as f64 + result.connection as f64
    }
}

fn phasors(seed: f64, count: usize) -> Vec<f64> {
    (0..count)
        .flat_map(|k| {
            let k = k as f64;
            [seed * (1.0 + 0.1 * k), -0.5 * seed * (1.0 + 0.05 * k)]
        })
        .collect()
}

fn default_buffer(kind: ValueKind) -> FieldBuffer {
    match kind {
        ValueKind::Str => FieldBuffer::Text(String::new()),
        ValueKind::Int | ValueKind::Code(_) | ValueKind::Derived(_) => FieldBuffer::Int(0),
        ValueKind::Float => FieldBuffer::Float(0.0),
        ValueKind::FloatVec(n) => FieldBuffer::Floats(vec![0.0; n]),
        ValueKind::IntVec(n) => FieldBuffer::Ints(vec![0; n]),
        ValueKind::Ref(_) | ValueKind::Composite(_) => FieldBuffer::Handle(Handle::NONE),
        ValueKind::RefList(_) => FieldBuffer::Handles(Vec::new()),
    }
}

/// Phasor counts of a current read at an object of `kind`.
fn current_phasors(kind: EntityKind) -> Option<usize> {
    match kind {
        EntityKind::Bus
        | EntityKind::Generator
        | EntityKind::GenUnit
        | EntityKind::Load
        | EntityKind::LoadUnit
        | EntityKind::Shunt
        | EntityKind::ShuntUnit
        | EntityKind::Terminal
        | EntityKind::RelayGroup => Some(3),
        EntityKind::Transformer3W => Some(12),
        kind if kind.bus_count() == 2 => Some(6),
        _ => None,
    }
}

fn voltage_phasors(kind: EntityKind) -> Option<usize> {
    match kind {
        EntityKind::Bus | EntityKind::Terminal | EntityKind::RelayGroup => Some(3),
        EntityKind::Transformer3W => Some(9),
        kind if kind.bus_count() == 2 => Some(6),
        _ => None,
    }
}

impl Engine for MockEngine {
    fn open_network(&mut self, path: &Path, read_only: bool) -> Primitive<()> {
        if path != Path::new(SAMPLE_PATH) {
            self.network = None;
            return self.fail(format!("cannot open {}: no such network file", path.display()));
        }
        self.network = Some(Network::sample());
        self.read_only = read_only;
        self.results.clear();
        self.steps.clear();
        Ok(())
    }

    fn close_network(&mut self) -> Primitive<()> {
        self.net()?;
        self.network = None;
        self.results.clear();
        self.steps.clear();
        Ok(())
    }

    fn new_network(&mut self) -> Primitive<()> {
        self.network = Some(Network::default());
        self.read_only = false;
        self.results.clear();
        self.steps.clear();
        Ok(())
    }

    fn find_by_string(&self, text: &str) -> Handle {
        let text = text.trim();
        let found = if is_guid(text) {
            self.records()
                .find(|(_, record)| record.text("GUID").eq_ignore_ascii_case(text))
        } else {
            self.records()
                .find(|(handle, record)| self.display(**handle, record).as_deref() == Some(text))
        };
        found.map(|(handle, _)| *handle).unwrap_or(Handle::NONE)
    }

    fn find_bus_by_number(&self, number: i64) -> Handle {
        self.records()
            .find(|(_, r)| {
                r.kind == EntityKind::Bus && matches!(r.field("NO"), Some(FieldBuffer::Int(n)) if *n == number)
            })
            .map(|(handle, _)| *handle)
            .unwrap_or(Handle::NONE)
    }

    fn find_bus_by_name(&self, name: &str, kv: f64) -> Handle {
        self.records()
            .find(|(_, r)| {
                r.kind == EntityKind::Bus && r.text("NAME") == name && (r.float("KV") - kv).abs() < 1e-3
            })
            .map(|(handle, _)| *handle)
            .unwrap_or(Handle::NONE)
    }

    fn find_composite(&self, kind: EntityKind, buses: &[Handle], circuit_id: &str) -> Handle {
        let keyed_by_circuit = matches!(
            kind.key_shape(),
            KeyShape::BusUnit | KeyShape::TwoBus | KeyShape::ThreeBus
        );
        self.records()
            .find(|(_, r)| {
                let stored = r.buses();
                r.kind == kind
                    && stored.len() == buses.len()
                    && buses.iter().all(|bus| stored.contains(bus))
                    && (!keyed_by_circuit || r.text("CID") == circuit_id)
            })
            .map(|(handle, _)| *handle)
            .unwrap_or(Handle::NONE)
    }

    fn kind_of(&self, handle: Handle) -> Option<EntityKind> {
        self.network
            .as_ref()?
            .records
            .get(&handle)
            .map(|record| record.kind)
    }

    fn split_part(&self, handle: Handle) -> Option<SplitPart> {
        self.network.as_ref()?.records.get(&handle)?.part
    }

    fn companion_of(&self, handle: Handle) -> Handle {
        self.network
            .as_ref()
            .and_then(|net| net.records.get(&handle))
            .map(|record| record.companion)
            .unwrap_or(Handle::NONE)
    }

    fn read_field(&self, handle: Handle, code: u32) -> Primitive<FieldBuffer> {
        let record = self.record(handle)?;
        if let Some(value) = record.fields.get(&code) {
            return Ok(value.clone());
        }
        match schema::builtin().by_code(record.kind, code) {
            Some(field) => Ok(default_buffer(field.kind)),
            None => self.fail(format!("field code {code} is not defined for {}", record.kind)),
        }
    }

    fn write_field(&mut self, handle: Handle, code: u32, value: &FieldBuffer) -> Primitive<()> {
        let kind = self.record(handle)?.kind;
        if schema::builtin().by_code(kind, code).is_none() {
            return self.fail(format!("field code {code} is not defined for {kind}"));
        }
        if self.journal.rejects(code) {
            return self.fail(format!("value rejected for field code {code}"));
        }
        if self.journal.refuses(handle) {
            return self.fail(format!("record {handle} is locked"));
        }
        self.record_mut(handle)?.fields.insert(code, value.clone());
        self.journal.record(Call::Write { handle, code });
        Ok(())
    }

    fn read_annotation(&self, handle: Handle, slot: &Annotation) -> Primitive<String> {
        let record = self.record(handle)?;
        Ok(record.annotations.get(slot).cloned().unwrap_or_default())
    }

    fn write_annotation(&mut self, handle: Handle, slot: &Annotation, text: &str) -> Primitive<()> {
        self.record_mut(handle)?
            .annotations
            .insert(slot.clone(), text.to_string());
        self.journal.record(Call::Annotate {
            handle,
            slot: slot.clone(),
        });
        Ok(())
    }

    fn setting_names(&self, handle: Handle) -> Primitive<Vec<String>> {
        let record = self.record(handle)?;
        if !record.kind.has_settings() {
            return self.fail(format!("{} has no settings", record.kind));
        }
        Ok(record.settings.iter().map(|(name, _)| name.clone()).collect())
    }

    fn read_setting(&self, handle: Handle, name: &str) -> Primitive<String> {
        let record = self.record(handle)?;
        match record.settings.iter().find(|(known, _)| known == name) {
            Some((_, value)) => Ok(value.clone()),
            None => self.fail(format!("unknown setting {name}")),
        }
    }

    fn write_setting(&mut self, handle: Handle, name: &str, value: &str) -> Primitive<()> {
        if !self.record(handle)?.settings.iter().any(|(known, _)| known == name) {
            return self.fail(format!("unknown setting {name}"));
        }
        let record = self.record_mut(handle)?;
        if let Some(slot) = record.settings.iter_mut().find(|(known, _)| known == name) {
            slot.1 = value.to_string();
        }
        self.journal.record(Call::Setting {
            handle,
            name: name.to_string(),
        });
        Ok(())
    }

    fn commit(&mut self, handle: Handle) -> Primitive<()> {
        self.record_mut(handle)?;
        self.journal.record(Call::Commit(handle));
        Ok(())
    }

    fn delete(&mut self, handle: Handle) -> Primitive<()> {
        self.record_mut(handle)?;
        if self.journal.refuses(handle) {
            return self.fail(format!("record {handle} is locked"));
        }
        if let Some(net) = self.network.as_mut() {
            net.records.remove(&handle);
        }
        self.journal.record(Call::Delete(handle));
        Ok(())
    }

    fn enumerate_related(&self, owner: Option<Handle>, kind: EntityKind) -> Vec<Handle> {
        let owner_record = owner.and_then(|o| self.network.as_ref()?.records.get(&o));
        self.records()
            .filter(|(_, r)| r.kind == kind)
            .filter(|(_, r)| match (owner, owner_record) {
                (None, _) => true,
                (Some(_), None) => false,
                // Groups sit at a terminal by sharing its branch-end key.
                (Some(_), Some(end)) if end.kind == EntityKind::Terminal && kind == EntityKind::RelayGroup => {
                    ["BUS1", "BUS2"].iter().all(|n| r.handle(n) == end.handle(n))
                        && r.text("CID") == end.text("CID")
                        && r.text("BRCODE") == end.text("BRCODE")
                }
                (Some(owner), Some(group)) if group.kind == EntityKind::RelayGroup && kind.is_group_device() => {
                    r.handle("RLYGROUP") == owner
                }
                (Some(owner), Some(_)) => r.refers_to(owner),
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    fn build_outage_candidates(
        &self,
        origin: Handle,
        tier_depth: u32,
        kind_mask: u32,
    ) -> Primitive<Vec<Handle>> {
        let start = self.record(origin)?;
        if tier_depth == 0 {
            return self.fail("tier depth must be at least 1");
        }
        let start_buses = match start.kind {
            EntityKind::Bus => vec![origin],
            EntityKind::Terminal | EntityKind::RelayGroup => vec![start.handle("BUS1")],
            kind if kind.is_branch() => start.buses(),
            kind => return self.fail(format!("{kind} cannot be an outage origin")),
        };

        let mut graph: UnGraph<Handle, Handle> = UnGraph::new_undirected();
        let mut nodes: HashMap<Handle, NodeIndex> = HashMap::new();
        for (handle, record) in self.records() {
            if record.kind == EntityKind::Bus {
                nodes.insert(*handle, graph.add_node(*handle));
            }
        }
        for (handle, record) in self.records().filter(|(_, r)| r.kind.is_branch()) {
            let ends: Vec<NodeIndex> = record.buses().iter().filter_map(|b| nodes.get(b).copied()).collect();
            for (n, a) in ends.iter().enumerate() {
                for b in &ends[n + 1..] {
                    graph.add_edge(*a, *b, *handle);
                }
            }
        }

        let mut visited: HashSet<NodeIndex> = start_buses.iter().filter_map(|b| nodes.get(b).copied()).collect();
        let mut frontier: Vec<NodeIndex> = visited.iter().copied().collect();
        frontier.sort();
        let mut seen: HashSet<Handle> = HashSet::from([origin]);
        let mut out = Vec::new();
        for _ in 0..tier_depth {
            let mut next = Vec::new();
            for node in frontier {
                for edge in graph.edges(node) {
                    let branch = *edge.weight();
                    if seen.insert(branch) {
                        let bit = self.kind_of(branch).and_then(EntityKind::outage_bit).unwrap_or(0);
                        if bit & kind_mask != 0 {
                            out.push(branch);
                        }
                    }
                    let far = if edge.source() == node { edge.target() } else { edge.source() };
                    if visited.insert(far) {
                        next.push(far);
                    }
                }
            }
            frontier = next;
        }
        Ok(out)
    }

    fn run_classical(&mut self, request: &ClassicalRequest) -> Primitive<usize> {
        self.net()?;
        let mut produced = Vec::new();
        for fault in &request.faults {
            self.check_target(fault.target)?;
            let contingencies = match &fault.outage {
                None => 0,
                Some(outage) => {
                    let n = outage.candidates.len();
                    match outage.mode {
                        1 | 2 => n,
                        3 => n + n * n.saturating_sub(1) / 2,
                        4 => 1,
                        mode => return self.fail(format!("bad outage mode {mode}")),
                    }
                }
            };
            produced.extend((0..=contingencies).map(|contingency| MockResult {
                target: fault.target,
                connection: fault.connection,
                contingency,
            }));
        }
        self.steps.clear();
        self.journal.record(Call::Run("classical"));
        Ok(self.store_results(request.clear_previous, produced))
    }

    fn run_simultaneous(&mut self, request: &SimultaneousRequest) -> Primitive<usize> {
        self.net()?;
        for fault in &request.faults {
            for target in &fault.targets {
                self.check_target(*target)?;
            }
        }
        let Some(first) = request.faults.first() else {
            return self.fail("no faults in simultaneous request");
        };
        let result = MockResult {
            target: first.targets.first().copied().unwrap_or(Handle::NONE),
            connection: first.connection,
            contingency: 0,
        };
        self.steps.clear();
        self.journal.record(Call::Run("simultaneous"));
        Ok(self.store_results(request.clear_previous, vec![result]))
    }

    fn run_stepped_event(&mut self, request: &SteppedEventRequest) -> Primitive<usize> {
        let target = self.record(request.target)?;
        let display = self.display(request.target, target).unwrap_or_default();
        let bus = match target.kind {
            EntityKind::Bus => request.target,
            _ => target.handle("BUS1"),
        };
        let seed = 2000.0 + request.connection as f64;

        let watched: Vec<EntityKind> = [
            EntityKind::RelayOcPhase,
            EntityKind::RelayOcGround,
            EntityKind::RelayDsPhase,
            EntityKind::RelayDsGround,
            EntityKind::Scheme,
        ]
        .into_iter()
        .zip(request.device_flags)
        .filter_map(|(kind, on)| on.then_some(kind))
        .collect();
        let mut tripped = Vec::new();
        for (handle, record) in self.records() {
            if !watched.contains(&record.kind) || record.part == Some(SplitPart::Phase) {
                continue;
            }
            let group = self.network.as_ref().and_then(|net| net.records.get(&record.handle("RLYGROUP")));
            let in_service = matches!(record.field("FLAG"), Some(FieldBuffer::Int(1)));
            if in_service && group.is_some_and(|g| g.handle("BUS1") == bus) {
                tripped.push(*handle);
            }
        }

        let mut steps = vec![StepBuffer {
            time: 0.0,
            current: seed,
            description: format!("Fault inception at {display}"),
            devices: Vec::new(),
        }];
        if !tripped.is_empty() {
            steps.push(StepBuffer {
                time: 0.3,
                current: 0.0,
                description: format!("{} device(s) operated", tripped.len()),
                devices: tripped,
            });
        }
        for addendum in &request.addenda {
            steps.push(StepBuffer {
                time: addendum.time,
                current: seed + addendum.connection as f64,
                description: format!("Event at {} s, connection code {}", addendum.time, addendum.connection),
                devices: Vec::new(),
            });
        }
        steps.sort_by(|a, b| a.time.total_cmp(&b.time));

        let result = MockResult {
            target: request.target,
            connection: request.connection,
            contingency: 0,
        };
        self.steps = steps;
        self.journal.record(Call::Run("stepped-event"));
        Ok(self.store_results(true, vec![result]))
    }

    fn read_fault_current(
        &self,
        index: usize,
        handle: Option<Handle>,
        style: ReadStyle,
    ) -> Primitive<Vec<f64>> {
        let result = self.result(index)?;
        let mut seed = self.seed(index, result);
        if style == ReadStyle::Sequence {
            seed /= 3.0;
        }
        match handle {
            None => Ok(phasors(seed, 3)),
            Some(handle) => {
                let kind = self.record(handle)?.kind;
                match current_phasors(kind) {
                    Some(count) => Ok(phasors(seed / (1.0 + handle.value() as f64 / 100.0), count)),
                    None => self.fail(format!("current is not available for {kind}")),
                }
            }
        }
    }

    fn read_fault_voltage(
        &self,
        index: usize,
        handle: Handle,
        style: ReadStyle,
    ) -> Primitive<Vec<f64>> {
        let result = self.result(index)?;
        let kind = self.record(handle)?.kind;
        let mut seed = 0.5 + (handle.value() % 7) as f64 * 0.05 + 0.001 * result.connection as f64;
        if style == ReadStyle::Sequence {
            seed /= 2.0;
        }
        match voltage_phasors(kind) {
            Some(count) => Ok(phasors(seed, count)),
            None => self.fail(format!("voltage is not available for {kind}")),
        }
    }

    fn read_operate_time(
        &self,
        index: usize,
        device: Handle,
        multiplier: f64,
        signal_only: bool,
    ) -> Primitive<f64> {
        self.result(index)?;
        let record = self.record(device)?;
        if !record.kind.is_timed_device() {
            return self.fail(format!("{} has no operating characteristic", record.kind));
        }
        if matches!(record.field("FLAG"), Some(FieldBuffer::Int(2))) {
            return Ok(NO_TRIP_SECONDS);
        }
        let base = (0.2 + 0.01 * (device.value() % 10) as f64) * multiplier;
        Ok(if signal_only { base } else { base + 0.05 })
    }

    fn read_pre_fault_voltage(
        &self,
        index: usize,
        bus: Handle,
        unit: VoltageUnit,
    ) -> Primitive<[f64; 2]> {
        self.result(index)?;
        let record = self.record(bus)?;
        if record.kind != EntityKind::Bus {
            return self.fail(format!("{} is not a bus", record.kind));
        }
        Ok(match unit {
            VoltageUnit::PerUnit => [1.0, 0.0],
            VoltageUnit::Kilovolts => [record.float("KV") / 3f64.sqrt(), 0.0],
        })
    }

    fn read_fault_summary(&self, index: usize) -> Primitive<Vec<f64>> {
        let result = self.result(index)?;
        let mva = 1500.0 + self.seed(index, result) / 10.0;
        Ok(vec![mva, 12.5, 11.8, 0.01, 0.1, 0.011, 0.1, 0.03, 0.3])
    }

    fn read_fault_description(&self, index: usize) -> Primitive<String> {
        let result = self.result(index)?;
        let display = self
            .record(result.target)
            .ok()
            .and_then(|record| self.display(result.target, record))
            .unwrap_or_else(|| result.target.to_string());
        let outage = match result.contingency {
            0 => String::new(),
            n => format!(" with outage contingency {n}"),
        };
        Ok(format!(
            "{index}. Fault on {display}, connection code {}{outage}",
            result.connection
        ))
    }

    fn read_step_count(&self) -> Primitive<usize> {
        if self.steps.is_empty() {
            return self.fail("no stepped-event simulation has run");
        }
        Ok(self.steps.len())
    }

    fn read_step(&self, step: usize) -> Primitive<StepBuffer> {
        match step.checked_sub(1).and_then(|i| self.steps.get(i)) {
            Some(buffer) => Ok(buffer.clone()),
            None => self.fail(format!("step {step} out of range")),
        }
    }

    fn last_error_message(&self) -> String {
        self.last_error.borrow().clone()
    }
}

/// Session over the sample network, opened read-write.
pub fn sample_session() -> OlxResult<Session> {
    journaled_session().map(|(session, _)| session)
}

/// [`sample_session`] plus a view of the engine's call journal.
pub fn journaled_session() -> OlxResult<(Session, Journal)> {
    let engine = MockEngine::sample();
    let journal = engine.journal();
    let mut session = Session::new(Box::new(engine), OlxConfig::default());
    session.open_default(SAMPLE_PATH)?;
    Ok((session, journal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> MockEngine {
        let mut engine = MockEngine::sample();
        engine.open_network(Path::new(SAMPLE_PATH), false).unwrap();
        engine
    }

    #[test]
    fn test_display_lookup_matches_key_strings() {
        let engine = open();
        let bus = engine.find_by_string("[BUS] 'NEVADA' 132 kV");
        assert_eq!(engine.kind_of(bus), Some(EntityKind::Bus));
        assert_eq!(engine.find_bus_by_number(1), bus);
        assert_eq!(engine.find_bus_by_name("NEVADA", 132.0), bus);
        assert!(engine.find_by_string("[BUS] 'NOWHERE' 1 kV").is_none());
        let guid = engine.read_field(bus, EntityKind::Bus.code_base() + 99).unwrap();
        assert_eq!(engine.find_by_string(guid.as_text().unwrap()), bus);
    }

    #[test]
    fn test_split_devices_answer_legacy_tags() {
        let engine = open();
        let ground = engine.find_by_string(
            "[RECLSRG] 'R1' on 'OHIO' 132 kV - 'NEVADA' 132 kV 1 L",
        );
        let phase = engine.find_by_string(
            "[RECLSRP] 'R1' on 'OHIO' 132 kV - 'NEVADA' 132 kV 1 L",
        );
        assert!(ground.is_live() && phase.is_live());
        assert_eq!(engine.companion_of(ground), phase);
        assert_eq!(engine.split_part(phase), Some(SplitPart::Phase));
    }

    #[test]
    fn test_outage_tiers_grow_monotonically() {
        let engine = open();
        let nv = engine.find_bus_by_number(1);
        let one = engine.build_outage_candidates(nv, 1, 0x3f).unwrap();
        let two = engine.build_outage_candidates(nv, 2, 0x3f).unwrap();
        assert_eq!(one.len(), 3);
        assert!(one.iter().all(|b| two.contains(b)));
        assert!(two.len() > one.len());
        let lines_only = engine.build_outage_candidates(nv, 1, 1).unwrap();
        assert_eq!(lines_only.len(), 2);
        assert!(engine.build_outage_candidates(nv, 0, 1).is_err());
    }

    #[test]
    fn test_read_only_networks_refuse_writes() {
        let mut engine = MockEngine::sample();
        engine.open_network(Path::new(SAMPLE_PATH), true).unwrap();
        let bus = engine.find_bus_by_number(1);
        let code = EntityKind::Bus.code_base() + 1;
        assert!(engine.write_field(bus, code, &FieldBuffer::Text("X".into())).is_err());
        assert!(engine.last_error_message().contains("read-only"));
    }
}
