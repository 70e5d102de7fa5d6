//! Key resolution: polymorphic [`Key`] to validated handle.
//!
//! String keys go to the engine's string lookup and the runtime kind of the
//! answer is checked against the requested kind. Composite keys are read
//! according to the kind's [`KeyShape`]; their sub-keys are resolved
//! recursively and the composite is matched by walking the engine's
//! relationship enumeration from the first resolved bus.

use tracing::debug;

use crate::engine::Engine;
use crate::entity::EntityRef;
use crate::error::{OlxError, OlxResult};
use crate::handle::Handle;
use crate::key::Key;
use crate::keystr::Reader;
use crate::kind::{EntityKind, KeyShape, SplitPart};
use crate::mutual::OrientationCase;
use crate::session::Session;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub handle: Handle,
    /// Other half of a split ground/phase device
    pub companion: Option<Handle>,
    /// The key listed the buses of a two-bus branch opposite to storage
    pub reversed: bool,
    /// Caller's frame for a mutual pair resolved from a `[line, line]` key
    pub orientation: Option<OrientationCase>,
}

impl Resolved {
    fn plain(handle: Handle) -> Self {
        Self {
            handle,
            companion: None,
            reversed: false,
            orientation: None,
        }
    }
}

pub struct KeyResolver<'s> {
    session: &'s Session,
}

impl<'s> KeyResolver<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    fn engine(&self) -> &'s dyn Engine {
        self.session.engine()
    }

    pub fn resolve(&self, kind: EntityKind, key: &Key) -> OlxResult<Resolved> {
        self.session.ensure_open()?;
        let resolved = match key {
            Key::Handle(handle) => self.by_handle(kind, *handle, key),
            Key::Guid(text) => self.by_string(kind, text),
            Key::Display(text) => self.by_display(kind, text),
            Key::Entity(entity) => self.by_entity(kind, entity),
            Key::Name(_) | Key::Number(_) | Key::Real(_) => self.by_scalar(kind, key),
            Key::Composite(parts) => self.by_composite(kind, parts, key),
        }?;
        debug!(%kind, %key, handle = %resolved.handle, "key resolved");
        Ok(resolved)
    }

    /// Primary/companion split for a handle of `kind`. The ground half is
    /// always the primary when both halves exist.
    pub fn normalize(&self, kind: EntityKind, handle: Handle) -> Resolved {
        if !kind.is_split() {
            return Resolved::plain(handle);
        }
        let engine = self.engine();
        let other = engine.companion_of(handle).found();
        let (handle, companion) = match (engine.split_part(handle), other) {
            (Some(SplitPart::Phase), Some(ground)) => (ground, Some(handle)),
            _ => (handle, other),
        };
        Resolved {
            companion,
            ..Resolved::plain(handle)
        }
    }

    fn not_found(kind: EntityKind, key: impl std::fmt::Display) -> OlxError {
        OlxError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    fn invalid(kind: EntityKind, reason: impl Into<String>) -> OlxError {
        OlxError::InvalidKey {
            kind,
            reason: reason.into(),
        }
    }

    /// Check the runtime kind of a found handle.
    fn expect_kind(&self, kind: EntityKind, handle: Handle, key: &str) -> OlxResult<Resolved> {
        match self.engine().kind_of(handle) {
            Some(actual) if actual == kind => Ok(self.normalize(kind, handle)),
            Some(actual) => Err(Self::invalid(
                kind,
                format!("{key} names a {actual}, not a {kind}"),
            )),
            None => Err(Self::not_found(kind, key)),
        }
    }

    fn by_handle(&self, kind: EntityKind, handle: Handle, key: &Key) -> OlxResult<Resolved> {
        if handle.is_deleted() {
            return Err(OlxError::Deleted { kind });
        }
        if handle.is_none() {
            return Err(Self::not_found(kind, key));
        }
        self.expect_kind(kind, handle, &key.to_string())
    }

    fn by_string(&self, kind: EntityKind, text: &str) -> OlxResult<Resolved> {
        match self.engine().find_by_string(text).found() {
            Some(handle) => self.expect_kind(kind, handle, text),
            None => Err(Self::not_found(kind, text)),
        }
    }

    fn by_display(&self, kind: EntityKind, text: &str) -> OlxResult<Resolved> {
        let (tag, body) = split_display(text)
            .ok_or_else(|| Self::invalid(kind, format!("malformed display string {text}")))?;

        // `[OCRLY] ...` / `[DSRLY] ...`: own variant first, then the sibling.
        if let (Some(family), Some(sibling)) = (kind.family_tag(), kind.sibling()) {
            if tag == family {
                let own = format!("[{}] {body}", kind.tag());
                if let Some(handle) = self.engine().find_by_string(&own).found() {
                    return self.expect_kind(kind, handle, &own);
                }
                let other = format!("[{}] {body}", sibling.tag());
                if self.engine().find_by_string(&other).found().is_some() {
                    return Err(Self::invalid(
                        kind,
                        format!("{text} names a {sibling}, not a {kind}"),
                    ));
                }
                return Err(Self::not_found(kind, text));
            }
        }

        // Joined tag of a split device: ground half, then phase half.
        if let Some(part_tags) = kind.split_tags() {
            if tag == kind.tag() {
                for part_tag in part_tags {
                    let candidate = format!("[{part_tag}] {body}");
                    if let Some(handle) = self.engine().find_by_string(&candidate).found() {
                        return self.expect_kind(kind, handle, &candidate);
                    }
                }
                return Err(Self::not_found(kind, text));
            }
        }

        self.by_string(kind, &format!("[{tag}] {body}"))
    }

    fn by_entity(&self, kind: EntityKind, entity: &EntityRef) -> OlxResult<Resolved> {
        self.session.check(entity.token, entity.kind)?;
        if entity.handle.is_deleted() {
            return Err(OlxError::Deleted { kind: entity.kind });
        }
        if entity.kind != kind {
            return Err(Self::invalid(
                kind,
                format!("entity is a {}, not a {kind}", entity.kind),
            ));
        }
        Ok(Resolved {
            companion: entity.companion,
            ..Resolved::plain(entity.handle)
        })
    }

    fn by_scalar(&self, kind: EntityKind, key: &Key) -> OlxResult<Resolved> {
        if kind != EntityKind::Bus {
            return Err(Self::invalid(
                kind,
                format!("{key} is not a {kind} key; expected a display string, GUID or composite key"),
            ));
        }
        match key {
            Key::Number(number) => self
                .engine()
                .find_bus_by_number(*number)
                .found()
                .map(Resolved::plain)
                .ok_or_else(|| Self::not_found(kind, key)),
            Key::Name(name) => self.bus_by_name(name),
            _ => Err(Self::invalid(
                kind,
                format!("{key}: a bus key is a number, a name or [name, kV]"),
            )),
        }
    }

    fn bus_by_name(&self, name: &str) -> OlxResult<Resolved> {
        let engine = self.engine();
        let mut matches = Vec::new();
        for handle in engine.enumerate_related(None, EntityKind::Bus) {
            if Reader::new(engine, EntityKind::Bus, handle).text("NAME")? == name {
                matches.push(handle);
            }
        }
        match matches.as_slice() {
            [] => Err(Self::not_found(EntityKind::Bus, format!("'{name}'"))),
            [one] => Ok(Resolved::plain(*one)),
            [first, ..] if !self.session.config().session.ambiguous_bus_names_fail => {
                Ok(Resolved::plain(*first))
            }
            many => Err(Self::invalid(
                EntityKind::Bus,
                format!(
                    "name '{name}' matches {} buses; use [name, kV] instead",
                    many.len()
                ),
            )),
        }
    }

    fn bus(&self, key: &Key) -> OlxResult<Handle> {
        Ok(self.resolve(EntityKind::Bus, key)?.handle)
    }

    fn by_composite(&self, kind: EntityKind, parts: &[Key], key: &Key) -> OlxResult<Resolved> {
        let arity = |expected: &str| {
            Self::invalid(kind, format!("{key}: expected {expected}"))
        };
        let text = |part: &Key, what: &str| {
            part.text()
                .ok_or_else(|| Self::invalid(kind, format!("{key}: {what} must be text")))
        };
        match kind.key_shape() {
            KeyShape::Bus => match parts {
                [single] => self.by_scalar(kind, single),
                [name, kv] => {
                    let name = text(name, "bus name")?;
                    let kv = kv
                        .number()
                        .ok_or_else(|| Self::invalid(kind, format!("{key}: kV must be numeric")))?;
                    self.engine()
                        .find_bus_by_name(&name, kv)
                        .found()
                        .map(Resolved::plain)
                        .ok_or_else(|| Self::not_found(kind, key))
                }
                _ => Err(arity("[number], [name] or [name, kV]")),
            },
            KeyShape::TwoBus => match parts {
                [b1, b2, cid] => {
                    let buses = [self.bus(b1)?, self.bus(b2)?];
                    self.branch(kind, &buses, &text(cid, "circuit id")?, key)
                }
                _ => Err(arity("[bus1, bus2, circuit id]")),
            },
            KeyShape::ThreeBus => match parts {
                [b1, b2, b3, cid] => {
                    let buses = [self.bus(b1)?, self.bus(b2)?, self.bus(b3)?];
                    self.branch(kind, &buses, &text(cid, "circuit id")?, key)
                }
                _ => Err(arity("[bus1, bus2, bus3, circuit id]")),
            },
            KeyShape::BusOwned => match parts {
                [bus] => self.composite(kind, &[self.bus(bus)?], "", key),
                _ => Err(arity("[bus]")),
            },
            KeyShape::BusUnit => match parts {
                [bus, cid] => {
                    let bus = self.bus(bus)?;
                    self.composite(kind, &[bus], &text(cid, "unit id")?, key)
                }
                _ => Err(arity("[bus, unit id]")),
            },
            KeyShape::BranchEnd => match parts {
                [b1, b2, cid] => self.branch_end(kind, b1, b2, &text(cid, "circuit id")?, None, key),
                [b1, b2, cid, code] => {
                    let code = text(code, "branch code")?;
                    self.branch_end(kind, b1, b2, &text(cid, "circuit id")?, Some(&code), key)
                }
                _ => Err(arity("[bus1, bus2, circuit id, branch code]")),
            },
            KeyShape::GroupDevice => match parts {
                [group, id] => {
                    let group = self.resolve(EntityKind::RelayGroup, group)?.handle;
                    self.group_device(kind, group, &text(id, "device id")?, key)
                }
                _ => Err(arity("[relay group, device id]")),
            },
            KeyShape::BusNamed => match parts {
                [bus, name] => {
                    let bus = self.bus(bus)?;
                    let name = text(name, "name")?;
                    self.first_related(kind, bus, key, |r| Ok(r.text("NAME")? == name))
                }
                _ => Err(arity("[bus, name]")),
            },
            KeyShape::LinePair => match parts {
                [first, second] => self.line_pair(first, second, key),
                _ => Err(arity("[line, line]")),
            },
        }
    }

    fn composite(
        &self,
        kind: EntityKind,
        buses: &[Handle],
        circuit_id: &str,
        key: &Key,
    ) -> OlxResult<Resolved> {
        match self.engine().find_composite(kind, buses, circuit_id).found() {
            Some(handle) => self.expect_kind(kind, handle, &key.to_string()),
            None => Err(Self::not_found(kind, key)),
        }
    }

    /// First object of `kind` related to `owner` that passes `matches`.
    fn first_related(
        &self,
        kind: EntityKind,
        owner: Handle,
        key: &Key,
        mut matches: impl FnMut(&Reader<'_>) -> OlxResult<bool>,
    ) -> OlxResult<Resolved> {
        let engine = self.engine();
        for handle in engine.enumerate_related(Some(owner), kind) {
            if engine.kind_of(handle) != Some(kind) {
                continue;
            }
            if matches(&Reader::new(engine, kind, handle))? {
                return Ok(self.normalize(kind, handle));
            }
        }
        Err(Self::not_found(kind, key))
    }

    /// Branch equipment between `buses`, in either bus order.
    fn branch(
        &self,
        kind: EntityKind,
        buses: &[Handle],
        circuit_id: &str,
        key: &Key,
    ) -> OlxResult<Resolved> {
        let names = ["BUS1", "BUS2", "BUS3"];
        let mut first_stored = Handle::NONE;
        let mut resolved = self.first_related(kind, buses[0], key, |r| {
            let mut stored = Vec::with_capacity(buses.len());
            for name in &names[..buses.len()] {
                stored.push(r.handle(name)?);
            }
            let same_set = stored.len() == buses.len()
                && stored.iter().all(|h| buses.contains(h))
                && buses.iter().all(|h| stored.contains(h));
            if same_set && r.text("CID")? == circuit_id {
                first_stored = stored[0];
                return Ok(true);
            }
            Ok(false)
        })?;
        resolved.reversed = first_stored != buses[0];
        Ok(resolved)
    }

    fn branch_end(
        &self,
        kind: EntityKind,
        bus1: &Key,
        bus2: &Key,
        circuit_id: &str,
        branch_code: Option<&str>,
        key: &Key,
    ) -> OlxResult<Resolved> {
        let near = self.bus(bus1)?;
        let far = self.bus(bus2)?;
        self.first_related(kind, near, key, |r| {
            Ok(r.handle("BUS1")? == near
                && r.handle("BUS2")? == far
                && r.text("CID")? == circuit_id
                && match branch_code {
                    Some(code) => r.text("BRCODE")?.eq_ignore_ascii_case(code),
                    None => true,
                })
        })
    }

    fn group_device(
        &self,
        kind: EntityKind,
        group: Handle,
        id: &str,
        key: &Key,
    ) -> OlxResult<Resolved> {
        self.first_related(kind, group, key, |r| Ok(r.text("ID")? == id))
    }

    fn line_pair(&self, first: &Key, second: &Key, key: &Key) -> OlxResult<Resolved> {
        let kind = EntityKind::MutualPair;
        let a = self.resolve(EntityKind::Line, first)?;
        let b = self.resolve(EntityKind::Line, second)?;
        if a.handle == b.handle {
            return Err(Self::invalid(kind, format!("{key}: both keys name the same line")));
        }
        let mut swapped = false;
        let mut resolved = self.first_related(kind, a.handle, key, |r| {
            let stored = (r.handle("LINE1")?, r.handle("LINE2")?);
            if stored == (a.handle, b.handle) {
                return Ok(true);
            }
            if stored == (b.handle, a.handle) {
                swapped = true;
                return Ok(true);
            }
            Ok(false)
        })?;
        resolved.orientation = Some(OrientationCase {
            swapped,
            first_reversed: a.reversed,
            second_reversed: b.reversed,
        });
        Ok(resolved)
    }
}

/// Split `[TAG] body` into an upper-cased tag and the trimmed body.
pub fn split_display(text: &str) -> Option<(String, &str)> {
    let rest = text.trim().strip_prefix('[')?;
    let close = rest.find(']')?;
    let tag = rest[..close].trim().to_ascii_uppercase();
    if tag.is_empty() {
        return None;
    }
    Some((tag, rest[close + 1..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings_split_into_tag_and_body() {
        assert_eq!(
            split_display(" [bus]  'NEVADA' 132 kV "),
            Some(("BUS".to_string(), "'NEVADA' 132 kV"))
        );
        assert_eq!(split_display("[] x"), None);
        assert_eq!(split_display("BUS 'x'"), None);
    }
}
