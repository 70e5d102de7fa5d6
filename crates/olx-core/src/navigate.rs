//! Traversal of the engine's relationship graph.
//!
//! Everything here is built on the single "enumerate related handles of kind
//! K" primitive plus reads of the key fields that link records together:
//!
//! ```text
//! Bus ──TERMINALS──> Terminal ──RLYGROUP──> RelayGroup ──DEVICES──> relays, fuses, ...
//!  ^                    │                       │
//!  └──BUS1/BUS2─── EQUIPMENT (branch) <──EQUIPMENT┘
//! ```

use crate::entity::GenericEntity;
use crate::error::{OlxError, OlxResult};
use crate::handle::Handle;
use crate::keystr::Reader;
use crate::kind::EntityKind;
use crate::session::Session;

pub struct RelationshipNavigator<'s> {
    session: &'s Session,
}

impl<'s> RelationshipNavigator<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    fn live(&self, entity: &GenericEntity) -> OlxResult<Handle> {
        if entity.is_deleted() {
            return Err(OlxError::Deleted {
                kind: entity.kind(),
            });
        }
        self.session.check(entity.token(), entity.kind())?;
        Ok(entity.handle())
    }

    fn expect(&self, entity: &GenericEntity, kind: EntityKind, operation: &'static str) -> OlxResult<Handle> {
        let handle = self.live(entity)?;
        if entity.kind() != kind {
            return Err(OlxError::Unsupported {
                kind: entity.kind(),
                operation,
            });
        }
        Ok(handle)
    }

    fn reader(&self, kind: EntityKind, handle: Handle) -> Reader<'s> {
        Reader::new(self.session.engine(), kind, handle)
    }

    /// Objects of `kind` related to `entity`, split devices listed once.
    pub fn related(&self, entity: &GenericEntity, kind: EntityKind) -> OlxResult<Vec<GenericEntity>> {
        let owner = self.live(entity)?;
        self.wrap_all(self.session.engine().enumerate_related(Some(owner), kind), kind)
    }

    fn wrap_all(&self, handles: Vec<Handle>, kind: EntityKind) -> OlxResult<Vec<GenericEntity>> {
        let mut out: Vec<GenericEntity> = Vec::new();
        for handle in handles {
            if self.session.engine().kind_of(handle) != Some(kind) {
                continue;
            }
            let entity = self.session.wrap(handle)?;
            if !out.contains(&entity) {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Branch ends whose near bus is `bus`.
    pub fn terminals(&self, bus: &GenericEntity) -> OlxResult<Vec<GenericEntity>> {
        let bus_handle = self.expect(bus, EntityKind::Bus, "terminals")?;
        let mut out = Vec::new();
        for terminal in self.related(bus, EntityKind::Terminal)? {
            if self.reader(EntityKind::Terminal, terminal.handle()).handle("BUS1")? == bus_handle {
                out.push(terminal);
            }
        }
        Ok(out)
    }

    /// Relay group mounted at a terminal, if any.
    pub fn relay_group_at(&self, terminal: &GenericEntity) -> OlxResult<Option<GenericEntity>> {
        self.expect(terminal, EntityKind::Terminal, "relay_group_at")?;
        Ok(self.related(terminal, EntityKind::RelayGroup)?.into_iter().next())
    }

    /// The branch a relay group protects, found from its bus pair, circuit id
    /// and branch code.
    pub fn protected_equipment(&self, group: &GenericEntity) -> OlxResult<Option<GenericEntity>> {
        let handle = self.expect(group, EntityKind::RelayGroup, "protected_equipment")?;
        let r = self.reader(EntityKind::RelayGroup, handle);
        let (near, far, cid, code) = (
            r.handle("BUS1")?,
            r.handle("BUS2")?,
            r.text("CID")?,
            r.text("BRCODE")?,
        );
        let Some(kind) = code.chars().next().and_then(EntityKind::from_branch_code) else {
            return Ok(None);
        };
        let bus_fields: &[&str] = match kind.bus_count() {
            3 => &["BUS1", "BUS2", "BUS3"],
            _ => &["BUS1", "BUS2"],
        };
        for candidate in self.session.engine().enumerate_related(Some(near), kind) {
            let b = self.reader(kind, candidate);
            let mut buses = Vec::with_capacity(bus_fields.len());
            for name in bus_fields {
                buses.push(b.handle(name)?);
            }
            if buses.contains(&near) && buses.contains(&far) && b.text("CID")? == cid {
                return self.session.wrap(candidate).map(Some);
            }
        }
        Ok(None)
    }

    /// Protective devices in a relay group, ordered by kind.
    pub fn devices(&self, group: &GenericEntity) -> OlxResult<Vec<GenericEntity>> {
        self.expect(group, EntityKind::RelayGroup, "devices")?;
        let mut out = Vec::new();
        for kind in EntityKind::ALL.into_iter().filter(|k| k.is_group_device()) {
            out.extend(self.related(group, kind)?);
        }
        Ok(out)
    }

    /// Buses an object is attached to, in field order.
    pub fn buses(&self, entity: &GenericEntity) -> OlxResult<Vec<GenericEntity>> {
        let handle = self.live(entity)?;
        if entity.kind() == EntityKind::Bus {
            return Ok(vec![entity.clone()]);
        }
        let schema = self.session.schema();
        let r = self.reader(entity.kind(), handle);
        let mut out = Vec::new();
        for name in ["BUS", "BUS1", "BUS2", "BUS3"] {
            if schema.code(entity.kind(), name).is_some() {
                if let Some(bus) = r.optional_handle(name)? {
                    out.push(self.session.wrap(bus)?);
                }
            }
        }
        Ok(out)
    }

    /// Branch equipment of every kind connected to a bus.
    pub fn branches_at(&self, bus: &GenericEntity) -> OlxResult<Vec<GenericEntity>> {
        self.expect(bus, EntityKind::Bus, "branches_at")?;
        let mut out = Vec::new();
        for kind in EntityKind::BRANCHES {
            out.extend(self.related(bus, kind)?);
        }
        Ok(out)
    }

    /// Buses one branch away from `bus`.
    pub fn neighbors(&self, bus: &GenericEntity) -> OlxResult<Vec<GenericEntity>> {
        let mut out: Vec<GenericEntity> = Vec::new();
        for branch in self.branches_at(bus)? {
            for other in self.buses(&branch)? {
                if &other != bus && !out.contains(&other) {
                    out.push(other);
                }
            }
        }
        Ok(out)
    }
}
