use crate::kind::EntityKind;

use super::{Access, Derivation, FieldSchema, Origin, ValueKind};

const BUS: &[EntityKind] = &[EntityKind::Bus];
const LINE: &[EntityKind] = &[EntityKind::Line];
const RELAY_GROUP: &[EntityKind] = &[EntityKind::RelayGroup];
const BRANCHES: &[EntityKind] = &EntityKind::BRANCHES;
const BREAKER_OBJECTS: &[EntityKind] = &[
    EntityKind::Line,
    EntityKind::Transformer2W,
    EntityKind::Transformer3W,
    EntityKind::PhaseShifter,
    EntityKind::SeriesDevice,
    EntityKind::Switch,
    EntityKind::Generator,
    EntityKind::Load,
    EntityKind::Shunt,
];

const IN_SERVICE: ValueKind = ValueKind::Code(&[1, 2]);
const ON_OFF: ValueKind = ValueKind::Code(&[0, 1]);

struct Table {
    kind: EntityKind,
    fields: Vec<FieldSchema>,
}

impl Table {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    fn push(&mut self, n: u32, name: &str, description: &str, kind: ValueKind, access: Access) {
        self.fields.push(FieldSchema {
            name: name.to_string(),
            code: if n == 0 { 0 } else { self.kind.code_base() + n },
            description: description.to_string(),
            kind,
            access,
            origin: Origin::Builtin,
        });
    }

    fn rw(&mut self, n: u32, name: &str, description: &str, kind: ValueKind) -> &mut Self {
        self.push(n, name, description, kind, Access::ReadWrite);
        self
    }

    fn ro(&mut self, n: u32, name: &str, description: &str, kind: ValueKind) -> &mut Self {
        self.push(n, name, description, kind, Access::ReadOnly);
        self
    }

    fn derived(&mut self, name: &str, description: &str, rule: Derivation) -> &mut Self {
        let access = match rule {
            Derivation::Memo | Derivation::Tags => Access::ReadWrite,
            _ => Access::ReadOnly,
        };
        self.push(0, name, description, ValueKind::Derived(rule), access);
        self
    }

    /// Branch endpoints and circuit id, codes 1..=3.
    fn two_bus(&mut self) -> &mut Self {
        self.ro(1, "BUS1", "Bus 1", ValueKind::Ref(BUS))
            .ro(2, "BUS2", "Bus 2", ValueKind::Ref(BUS))
            .ro(3, "CID", "Circuit ID", ValueKind::Str)
    }

    /// Relay group membership and device id, codes 1..=3.
    fn group_device(&mut self) -> &mut Self {
        self.ro(1, "RLYGROUP", "Relay group", ValueKind::Ref(RELAY_GROUP))
            .rw(2, "ID", "ID", ValueKind::Str)
            .rw(3, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
    }

    fn finish(mut self) -> Vec<FieldSchema> {
        self.derived("KEYSTR", "Natural-key display string", Derivation::KeyString)
            .derived("PARAMSTR", "Parameter map string", Derivation::ParamString)
            .derived("CTORSTR", "Constructor string", Derivation::CtorString);
        if !self.kind.is_relationship_only() {
            self.derived("MEMO", "Memo", Derivation::Memo)
                .derived("TAGS", "Tags", Derivation::Tags);
        }
        self.ro(99, "GUID", "Globally unique identifier", ValueKind::Str);
        self.fields
    }
}

pub(super) fn table(kind: EntityKind) -> Vec<FieldSchema> {
    let mut t = Table::new(kind);
    match kind {
        EntityKind::Bus => {
            t.rw(1, "NAME", "Name", ValueKind::Str)
                .rw(2, "KV", "Nominal kV", ValueKind::Float)
                .rw(3, "NO", "Bus number", ValueKind::Int)
                .rw(4, "AREANO", "Area number", ValueKind::Int)
                .rw(5, "ZONENO", "Zone number", ValueKind::Int)
                .rw(6, "LOCATION", "Location", ValueKind::Str)
                .rw(7, "SLACK", "System slack bus: 1-yes; 0-no", ON_OFF)
                .rw(8, "MIDPOINT", "Three-winding transformer mid-point: 1-yes; 0-no", ON_OFF)
                .derived("TERMINALS", "Branch ends at this bus", Derivation::Terminals);
        }
        EntityKind::Generator => {
            t.ro(1, "BUS", "Bus", ValueKind::Ref(BUS))
                .rw(2, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .rw(3, "REFANGLE", "Reference angle", ValueKind::Float)
                .rw(4, "SCHEDP", "Scheduled real power (MW)", ValueKind::Float)
                .rw(5, "SCHEDV", "Scheduled voltage (pu)", ValueKind::Float)
                .rw(6, "REGBUS", "Controlled bus", ValueKind::Ref(BUS));
        }
        EntityKind::GenUnit => {
            t.ro(1, "BUS", "Bus", ValueKind::Ref(BUS))
                .ro(2, "CID", "Unit ID", ValueKind::Str)
                .rw(3, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .rw(4, "Z1", "Positive sequence impedance [R, X]", ValueKind::FloatVec(2))
                .rw(5, "Z2", "Negative sequence impedance [R, X]", ValueKind::FloatVec(2))
                .rw(6, "Z0", "Zero sequence impedance [R, X]", ValueKind::FloatVec(2))
                .rw(7, "MVARATE", "MVA rating", ValueKind::Float);
        }
        EntityKind::Load => {
            t.ro(1, "BUS", "Bus", ValueKind::Ref(BUS))
                .rw(2, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE);
        }
        EntityKind::LoadUnit => {
            t.ro(1, "BUS", "Bus", ValueKind::Ref(BUS))
                .ro(2, "CID", "Unit ID", ValueKind::Str)
                .rw(3, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .rw(4, "MW", "Real power [const P, const I, const Z]", ValueKind::FloatVec(3))
                .rw(5, "MVAR", "Reactive power [const P, const I, const Z]", ValueKind::FloatVec(3));
        }
        EntityKind::Shunt => {
            t.ro(1, "BUS", "Bus", ValueKind::Ref(BUS))
                .rw(2, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE);
        }
        EntityKind::ShuntUnit => {
            t.ro(1, "BUS", "Bus", ValueKind::Ref(BUS))
                .ro(2, "CID", "Unit ID", ValueKind::Str)
                .rw(3, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .rw(4, "G1", "Positive sequence conductance", ValueKind::Float)
                .rw(5, "B1", "Positive sequence susceptance", ValueKind::Float)
                .rw(6, "G0", "Zero sequence conductance", ValueKind::Float)
                .rw(7, "B0", "Zero sequence susceptance", ValueKind::Float);
        }
        EntityKind::Line => {
            t.two_bus()
                .rw(4, "NAME", "Name", ValueKind::Str)
                .rw(5, "R", "Positive sequence resistance", ValueKind::Float)
                .rw(6, "X", "Positive sequence reactance", ValueKind::Float)
                .rw(7, "R0", "Zero sequence resistance", ValueKind::Float)
                .rw(8, "X0", "Zero sequence reactance", ValueKind::Float)
                .rw(9, "B1", "Positive sequence susceptance", ValueKind::Float)
                .rw(10, "B0", "Zero sequence susceptance", ValueKind::Float)
                .rw(11, "LN", "Length", ValueKind::Float)
                .rw(12, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .rw(13, "RATG", "Ratings [A, B, C, D]", ValueKind::FloatVec(4))
                .rw(14, "TYPE", "Conductor type", ValueKind::Str)
                .ro(15, "RLYGROUP1", "Relay group at bus 1", ValueKind::Ref(RELAY_GROUP))
                .ro(16, "RLYGROUP2", "Relay group at bus 2", ValueKind::Ref(RELAY_GROUP));
        }
        EntityKind::Transformer2W => {
            t.two_bus()
                .rw(4, "NAME", "Name", ValueKind::Str)
                .rw(5, "R", "Positive sequence resistance", ValueKind::Float)
                .rw(6, "X", "Positive sequence reactance", ValueKind::Float)
                .rw(7, "R0", "Zero sequence resistance", ValueKind::Float)
                .rw(8, "X0", "Zero sequence reactance", ValueKind::Float)
                .rw(9, "CONFIGP", "Primary winding: 1-wye; 2-delta; 3-grounded wye", ValueKind::Code(&[1, 2, 3]))
                .rw(10, "CONFIGS", "Secondary winding: 1-wye; 2-delta; 3-grounded wye", ValueKind::Code(&[1, 2, 3]))
                .rw(11, "MVA", "Ratings [base, FOA1, FOA2]", ValueKind::FloatVec(3))
                .rw(12, "TAPP", "Primary tap (kV)", ValueKind::Float)
                .rw(13, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .ro(14, "RLYGROUP1", "Relay group at bus 1", ValueKind::Ref(RELAY_GROUP))
                .ro(15, "RLYGROUP2", "Relay group at bus 2", ValueKind::Ref(RELAY_GROUP));
        }
        EntityKind::Transformer3W => {
            t.ro(1, "BUS1", "Bus 1", ValueKind::Ref(BUS))
                .ro(2, "BUS2", "Bus 2", ValueKind::Ref(BUS))
                .ro(3, "BUS3", "Bus 3", ValueKind::Ref(BUS))
                .ro(4, "CID", "Circuit ID", ValueKind::Str)
                .rw(5, "NAME", "Name", ValueKind::Str)
                .rw(6, "ZPS", "Primary-secondary impedance [R, X]", ValueKind::FloatVec(2))
                .rw(7, "ZPT", "Primary-tertiary impedance [R, X]", ValueKind::FloatVec(2))
                .rw(8, "ZST", "Secondary-tertiary impedance [R, X]", ValueKind::FloatVec(2))
                .rw(9, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE);
        }
        EntityKind::PhaseShifter => {
            t.two_bus()
                .rw(4, "NAME", "Name", ValueKind::Str)
                .rw(5, "ANGLE", "Shift angle (degrees)", ValueKind::Float)
                .rw(6, "CNTL", "Control mode: 0-fixed; 1-power; 2-angle", ValueKind::Code(&[0, 1, 2]))
                .rw(7, "R", "Positive sequence resistance", ValueKind::Float)
                .rw(8, "X", "Positive sequence reactance", ValueKind::Float)
                .rw(9, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE);
        }
        EntityKind::SeriesDevice => {
            t.two_bus()
                .rw(4, "NAME", "Name", ValueKind::Str)
                .rw(5, "R", "Resistance", ValueKind::Float)
                .rw(6, "X", "Reactance", ValueKind::Float)
                .rw(7, "IPR", "Protective level current", ValueKind::Float)
                .rw(8, "SBYPASS", "Bypassed: 1-yes; 0-no", ON_OFF)
                .rw(9, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE);
        }
        EntityKind::Switch => {
            t.two_bus()
                .rw(4, "NAME", "Name", ValueKind::Str)
                .rw(5, "STAT", "Status: 1-closed; 0-open", ON_OFF)
                .rw(6, "RATING", "Current rating (A)", ValueKind::Float)
                .rw(7, "DEFAULT", "Default position: 1-closed; 0-open", ON_OFF)
                .rw(8, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE);
        }
        EntityKind::MutualPair => {
            t.ro(1, "LINE1", "Line 1", ValueKind::Ref(LINE))
                .ro(2, "LINE2", "Line 2", ValueKind::Ref(LINE))
                .rw(3, "FROM1", "Coupled span start on line 1 (%)", ValueKind::Float)
                .rw(4, "TO1", "Coupled span end on line 1 (%)", ValueKind::Float)
                .rw(5, "FROM2", "Coupled span start on line 2 (%)", ValueKind::Float)
                .rw(6, "TO2", "Coupled span end on line 2 (%)", ValueKind::Float)
                .rw(7, "R", "Mutual resistance", ValueKind::Float)
                .rw(8, "X", "Mutual reactance", ValueKind::Float);
        }
        EntityKind::Terminal => {
            t.two_bus()
                .ro(4, "BRCODE", "Branch code", ValueKind::Str)
                .ro(5, "EQUIPMENT", "Branch", ValueKind::Ref(BRANCHES))
                .ro(6, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .derived("RLYGROUP", "Relay group at this end", Derivation::OwningGroup);
        }
        EntityKind::RelayGroup => {
            t.two_bus()
                .ro(4, "BRCODE", "Branch code", ValueKind::Str)
                .rw(5, "NOTE", "Annotation", ValueKind::Str)
                .rw(6, "OPFLAG", "Operation flag: 1-active; 2-out of service", IN_SERVICE)
                .rw(7, "BACKUP", "Backup relay groups", ValueKind::RefList(RELAY_GROUP))
                .derived("EQUIPMENT", "Protected branch", Derivation::Equipment)
                .derived("DEVICES", "Protective devices in the group", Derivation::Devices);
        }
        EntityKind::RelayOcGround | EntityKind::RelayOcPhase => {
            t.group_device()
                .rw(4, "CT", "CT ratio", ValueKind::Float)
                .rw(5, "TAP", "Tap (A)", ValueKind::Float)
                .rw(6, "TDIAL", "Time dial", ValueKind::Float)
                .rw(7, "INST", "Instantaneous pickup (A)", ValueKind::Float)
                .rw(8, "CURVE", "Time-current curve", ValueKind::Str)
                .rw(9, "POLAR", "Directionality", ValueKind::Int);
        }
        EntityKind::RelayDsGround | EntityKind::RelayDsPhase => {
            t.group_device()
                .rw(4, "REACH", "Zone reaches (ohm)", ValueKind::FloatVec(3))
                .rw(5, "DELAY", "Zone delays (s)", ValueKind::FloatVec(3))
                .rw(6, "KMAG", "Zero sequence compensation magnitude", ValueKind::Float)
                .rw(7, "KANG", "Zero sequence compensation angle", ValueKind::Float)
                .rw(8, "TYPE", "Relay type", ValueKind::Str);
        }
        EntityKind::Fuse => {
            t.group_device()
                .rw(4, "RATING", "Current rating (A)", ValueKind::Float)
                .rw(5, "TIMEMULT", "Time multiplier", ValueKind::Float)
                .rw(6, "CURVE", "Time-current curve", ValueKind::Str);
        }
        EntityKind::Recloser => {
            t.group_device()
                .rw(4, "TOTALOPS", "Total operations to lockout", ValueKind::Int)
                .rw(5, "FASTOPS", "Fast operations", ValueKind::Int)
                .rw(6, "INTRPTIME", "Interrupting time (s)", ValueKind::Float)
                .rw(7, "RECLOSETIMES", "Reclosing intervals (s)", ValueKind::FloatVec(3))
                .rw(8, "ASSETID", "Asset ID", ValueKind::Str);
        }
        EntityKind::Scheme => {
            t.group_device()
                .rw(4, "LOGIC", "Scheme logic", ValueKind::Str)
                .rw(5, "PILOTGROUP", "Remote relay group", ValueKind::Composite(EntityKind::RelayGroup));
        }
        EntityKind::Breaker => {
            t.ro(1, "BUS", "Bus", ValueKind::Ref(BUS))
                .rw(2, "NAME", "Name", ValueKind::Str)
                .rw(3, "FLAG", "In-service flag: 1-active; 2-out of service", IN_SERVICE)
                .rw(4, "OBJLST1", "Protected equipment", ValueKind::RefList(BREAKER_OBJECTS))
                .rw(5, "RATING", "Interrupting rating (kA)", ValueKind::Float)
                .rw(6, "NACD", "Non-AC decrement: 1-yes; 0-no", ON_OFF);
        }
    }
    t.finish()
}
