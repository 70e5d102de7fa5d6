//! Canonical display and constructor strings.
//!
//! Both forms are built from the fields that make up a kind's natural key,
//! read straight through the engine:
//!
//! ```text
//! [BUS] 'NEVADA' 132 kV
//! [LINE] 'NEVADA' 132 kV - 'OHIO' 132 kV 1
//! [OCRLYG] 'NV-G1' on 'NEVADA' 132 kV - 'OHIO' 132 kV 1 L
//! LINE(BUS('NEVADA', 132), BUS('OHIO', 132), '1')
//! ```
//!
//! The display form is what the engine's string lookup accepts; the
//! constructor form is parsed back by [`crate::key::parse_ctor`].

use crate::engine::{self, Engine, FieldBuffer};
use crate::error::{OlxError, OlxResult};
use crate::handle::Handle;
use crate::key::quote;
use crate::kind::{EntityKind, KeyShape, SplitPart};
use crate::schema;
use crate::units::Kilovolts;

/// `[TAG] body` for an object of `kind`.
pub fn key_string(engine: &dyn Engine, kind: EntityKind, handle: Handle) -> OlxResult<String> {
    Ok(format!("[{}] {}", kind.tag(), body(engine, kind, handle)?))
}

/// Display string of one half of a split device, tagged with its legacy
/// ground or phase tag.
pub fn part_key_string(
    engine: &dyn Engine,
    kind: EntityKind,
    handle: Handle,
    part: SplitPart,
) -> OlxResult<String> {
    let tag = match (kind.split_tags(), part) {
        (Some([ground, _]), SplitPart::Ground) => ground,
        (Some([_, phase]), SplitPart::Phase) => phase,
        (None, _) => kind.tag(),
    };
    Ok(format!("[{tag}] {}", body(engine, kind, handle)?))
}

/// Display string without its tag.
pub fn body(engine: &dyn Engine, kind: EntityKind, handle: Handle) -> OlxResult<String> {
    let r = Reader::new(engine, kind, handle);
    Ok(match kind.key_shape() {
        KeyShape::Bus => format!("{} {} kV", quote(&r.text("NAME")?), kv_label(&r)?),
        KeyShape::TwoBus => format!(
            "{} - {} {}",
            bus_body(engine, r.handle("BUS1")?)?,
            bus_body(engine, r.handle("BUS2")?)?,
            r.text("CID")?
        ),
        KeyShape::ThreeBus => format!(
            "{} - {} - {} {}",
            bus_body(engine, r.handle("BUS1")?)?,
            bus_body(engine, r.handle("BUS2")?)?,
            bus_body(engine, r.handle("BUS3")?)?,
            r.text("CID")?
        ),
        KeyShape::BusOwned => bus_body(engine, r.handle("BUS")?)?,
        KeyShape::BusUnit => format!("{} {}", bus_body(engine, r.handle("BUS")?)?, r.text("CID")?),
        KeyShape::BranchEnd => format!(
            "{} - {} {} {}",
            bus_body(engine, r.handle("BUS1")?)?,
            bus_body(engine, r.handle("BUS2")?)?,
            r.text("CID")?,
            r.text("BRCODE")?
        ),
        KeyShape::GroupDevice => format!(
            "{} on {}",
            quote(&r.text("ID")?),
            body(engine, EntityKind::RelayGroup, r.handle("RLYGROUP")?)?
        ),
        KeyShape::BusNamed => format!(
            "{} {}",
            bus_body(engine, r.handle("BUS")?)?,
            quote(&r.text("NAME")?)
        ),
        KeyShape::LinePair => format!(
            "{} & {}",
            body(engine, EntityKind::Line, r.handle("LINE1")?)?,
            body(engine, EntityKind::Line, r.handle("LINE2")?)?
        ),
    })
}

/// Round-trippable constructor form.
pub fn ctor_string(engine: &dyn Engine, kind: EntityKind, handle: Handle) -> OlxResult<String> {
    let r = Reader::new(engine, kind, handle);
    let bus = |name: &str| -> OlxResult<String> {
        ctor_string(engine, EntityKind::Bus, r.handle(name)?)
    };
    let args = match kind.key_shape() {
        KeyShape::Bus => format!("{}, {}", quote(&r.text("NAME")?), kv_label(&r)?),
        KeyShape::TwoBus => format!("{}, {}, {}", bus("BUS1")?, bus("BUS2")?, quote(&r.text("CID")?)),
        KeyShape::ThreeBus => format!(
            "{}, {}, {}, {}",
            bus("BUS1")?,
            bus("BUS2")?,
            bus("BUS3")?,
            quote(&r.text("CID")?)
        ),
        KeyShape::BusOwned => bus("BUS")?,
        KeyShape::BusUnit => format!("{}, {}", bus("BUS")?, quote(&r.text("CID")?)),
        KeyShape::BranchEnd => format!(
            "{}, {}, {}, {}",
            bus("BUS1")?,
            bus("BUS2")?,
            quote(&r.text("CID")?),
            quote(&r.text("BRCODE")?)
        ),
        KeyShape::GroupDevice => format!(
            "{}, {}",
            ctor_string(engine, EntityKind::RelayGroup, r.handle("RLYGROUP")?)?,
            quote(&r.text("ID")?)
        ),
        KeyShape::BusNamed => format!("{}, {}", bus("BUS")?, quote(&r.text("NAME")?)),
        KeyShape::LinePair => format!(
            "{}, {}",
            ctor_string(engine, EntityKind::Line, r.handle("LINE1")?)?,
            ctor_string(engine, EntityKind::Line, r.handle("LINE2")?)?
        ),
    };
    Ok(format!("{}({args})", kind.tag()))
}

fn bus_body(engine: &dyn Engine, bus: Handle) -> OlxResult<String> {
    body(engine, EntityKind::Bus, bus)
}

fn kv_label(r: &Reader<'_>) -> OlxResult<String> {
    Ok(Kilovolts(r.float("KV")?).label())
}

/// Reads builtin fields of one object by name.
pub(crate) struct Reader<'a> {
    engine: &'a dyn Engine,
    kind: EntityKind,
    handle: Handle,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(engine: &'a dyn Engine, kind: EntityKind, handle: Handle) -> Self {
        Self {
            engine,
            kind,
            handle,
        }
    }

    pub(crate) fn read(&self, name: &str) -> OlxResult<FieldBuffer> {
        let code = schema::builtin()
            .code(self.kind, name)
            .ok_or_else(|| OlxError::UnknownField {
                kind: self.kind,
                field: name.to_string(),
                valid: schema::builtin().all_fields(self.kind),
            })?;
        self.engine
            .read_field(self.handle, code)
            .map_err(|_| engine::failure(self.engine, format!("read {}.{name}", self.kind)))
    }

    pub(crate) fn text(&self, name: &str) -> OlxResult<String> {
        match self.read(name)? {
            FieldBuffer::Text(text) => Ok(text),
            FieldBuffer::Int(v) => Ok(v.to_string()),
            other => Err(OlxError::mismatch(name, "string", other.type_name())),
        }
    }

    pub(crate) fn float(&self, name: &str) -> OlxResult<f64> {
        let buffer = self.read(name)?;
        buffer
            .as_float()
            .ok_or_else(|| OlxError::mismatch(name, "float", buffer.type_name()))
    }

    pub(crate) fn handle(&self, name: &str) -> OlxResult<Handle> {
        let buffer = self.read(name)?;
        buffer
            .as_handle()
            .filter(Handle::is_live)
            .ok_or_else(|| OlxError::mismatch(name, "live handle", buffer.type_name()))
    }

    /// Handle field that may legitimately be empty.
    pub(crate) fn optional_handle(&self, name: &str) -> OlxResult<Option<Handle>> {
        match self.read(name)? {
            FieldBuffer::Handle(h) => Ok(h.found()),
            other => Err(OlxError::mismatch(name, "handle", other.type_name())),
        }
    }
}
