//! Uniform wrapper over engine records.
//!
//! A [`GenericEntity`] is a kind, a handle, an optional companion handle for
//! split ground/phase devices, and the [`SessionToken`] it was resolved under.
//! Every operation checks the token and the deleted marker first, then goes
//! through the schema: engine-backed fields are read and written with the
//! engine's field primitives, derived fields are computed here.
//!
//! Writes are all-or-nothing per call: every pair is validated before the
//! first engine write is issued.
//!
//! ```ignore
//! let mut line = session.resolve_str(EntityKind::Line, "[LINE] 'NEVADA' 132 kV - 'OHIO' 132 kV 1")?;
//! line.change_map(&mut session, &BTreeMap::from([
//!     ("R".to_string(), Value::Float(0.012)),
//!     ("X".to_string(), Value::Float(0.08)),
//! ]))?;
//! line.post_data(&mut session)?;
//! ```

use std::collections::BTreeMap;

use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::engine::{Annotation, FieldBuffer};
use crate::error::{OlxError, OlxResult};
use crate::handle::Handle;
use crate::key::{parse_ctor, Key};
use crate::keystr;
use crate::kind::EntityKind;
use crate::mutual::{is_geometry_field, CouplingGeometry, OrientationCase, GEOMETRY_FIELDS};
use crate::navigate::RelationshipNavigator;
use crate::resolve::Resolved;
use crate::schema::{method_names, Derivation, FieldSchema, Origin, ValueKind};
use crate::session::{Session, SessionToken};
use crate::validate;
use crate::value::Value;

/// Copyable handle and kind pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub handle: Handle,
    pub companion: Option<Handle>,
    pub token: SessionToken,
}

/// Field selection for [`GenericEntity::get_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldQuery {
    /// Every field except aggregate derivations
    All,
    One(String),
    Many(Vec<String>),
}

impl From<&str> for FieldQuery {
    fn from(name: &str) -> Self {
        FieldQuery::One(name.to_string())
    }
}

/// Explicit dynamic attribute access.
pub trait Attributes {
    fn get(&self, session: &Session, field: &str) -> OlxResult<Value>;
    fn set(&mut self, session: &mut Session, field: &str, value: Value) -> OlxResult<()>;
    fn field_names(&self, session: &Session) -> OlxResult<Vec<String>>;
}

/// Lazily built per-instance state.
#[derive(Debug, Clone, Default)]
struct Extension {
    attributes: OnceCell<Vec<String>>,
    settings: OnceCell<Vec<String>>,
    /// Coupling geometry written since the last commit, in the caller's frame
    geometry: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct GenericEntity {
    kind: EntityKind,
    handle: Handle,
    companion: Option<Handle>,
    token: SessionToken,
    orientation: Option<OrientationCase>,
    ext: Extension,
}

/// A validated write, ready to be issued.
enum Staged {
    Field {
        name: String,
        code: u32,
        buffer: FieldBuffer,
    },
    Annotation {
        name: String,
        slot: Annotation,
        text: String,
    },
    Geometry {
        name: String,
        value: f64,
    },
}

impl GenericEntity {
    pub(crate) fn from_resolved(kind: EntityKind, resolved: Resolved, token: SessionToken) -> Self {
        Self {
            kind,
            handle: resolved.handle,
            companion: resolved.companion,
            token,
            orientation: resolved.orientation,
            ext: Extension::default(),
        }
    }

    /// Parse a constructor string and resolve it.
    pub fn from_ctor_string(session: &Session, text: &str) -> OlxResult<Self> {
        let (kind, args) = parse_ctor(text)?;
        session.resolve(kind, &Key::Composite(args))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn companion(&self) -> Option<Handle> {
        self.companion
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Caller frame recorded when a mutual pair was resolved from `[line, line]`.
    pub fn orientation(&self) -> OrientationCase {
        self.orientation.unwrap_or(OrientationCase::IDENTITY)
    }

    pub fn is_deleted(&self) -> bool {
        self.handle.is_deleted()
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.kind,
            handle: self.handle,
            companion: self.companion,
            token: self.token,
        }
    }

    /// Handle after the deleted and session checks.
    fn live(&self, session: &Session) -> OlxResult<Handle> {
        if self.handle.is_deleted() {
            return Err(OlxError::Deleted { kind: self.kind });
        }
        session.check(self.token, self.kind)?;
        Ok(self.handle)
    }

    fn schema<'s>(&self, session: &'s Session, name: &str) -> OlxResult<&'s FieldSchema> {
        session
            .schema()
            .lookup(self.kind, name)
            .ok_or_else(|| self.unknown_field(session, name))
    }

    fn unknown_field(&self, session: &Session, name: &str) -> OlxError {
        let mut valid = session.schema().all_fields(self.kind);
        valid.extend(method_names().iter().map(|m| m.to_string()));
        OlxError::UnknownField {
            kind: self.kind,
            field: name.to_string(),
            valid,
        }
    }

    // ---- reads -----------------------------------------------------------

    pub fn get_data(&self, session: &Session, query: FieldQuery) -> OlxResult<Value> {
        match query {
            FieldQuery::All => self.get_all(session),
            FieldQuery::One(name) => self.get(session, &name),
            FieldQuery::Many(names) => self.get_many(session, &names),
        }
    }

    pub fn get(&self, session: &Session, name: &str) -> OlxResult<Value> {
        let handle = self.live(session)?;
        let field = self.schema(session, name)?;
        if field.origin == Origin::UserDefined {
            return self.read_annotation(session, &Annotation::UserField(field.name.clone()));
        }
        if let ValueKind::Derived(rule) = field.kind {
            return self.derive(session, rule);
        }
        if self.kind == EntityKind::MutualPair && is_geometry_field(&field.name) {
            let caller = self.orientation().inverse().apply(self.stored_geometry(session)?);
            let value = caller.get(&field.name).unwrap_or_default();
            return Ok(Value::Float(value));
        }
        let buffer = session
            .engine()
            .read_field(handle, field.code)
            .map_err(|_| session.engine_error(format!("read {}", field.name)))?;
        self.to_value(session, buffer)
    }

    /// Whole-record read, aggregate derivations excluded, sorted by name.
    pub fn get_all(&self, session: &Session) -> OlxResult<Value> {
        self.live(session)?;
        let mut out = BTreeMap::new();
        for field in session.schema().fields(self.kind) {
            if field.in_record() {
                out.insert(field.name.clone(), self.get(session, &field.name)?);
            }
        }
        Ok(Value::Map(out))
    }

    pub fn get_many<S: AsRef<str>>(&self, session: &Session, names: &[S]) -> OlxResult<Value> {
        self.live(session)?;
        let mut out = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            out.insert(name.trim().to_ascii_uppercase(), self.get(session, name)?);
        }
        Ok(Value::Map(out))
    }

    fn to_value(&self, session: &Session, buffer: FieldBuffer) -> OlxResult<Value> {
        Ok(match buffer {
            FieldBuffer::Int(v) => Value::Int(v),
            FieldBuffer::Float(v) => Value::Float(v),
            FieldBuffer::Text(text) => Value::Str(text),
            FieldBuffer::Ints(values) => Value::Ints(values),
            FieldBuffer::Floats(values) => Value::Floats(values),
            FieldBuffer::Handle(h) if h.is_none() => Value::Null,
            FieldBuffer::Handle(h) => Value::Entity(session.wrap(h)?),
            FieldBuffer::Handles(handles) => Value::Entities(
                handles
                    .into_iter()
                    .filter(Handle::is_live)
                    .map(|h| session.wrap(h))
                    .collect::<OlxResult<Vec<_>>>()?,
            ),
        })
    }

    fn derive(&self, session: &Session, rule: Derivation) -> OlxResult<Value> {
        let navigator = RelationshipNavigator::new(session);
        Ok(match rule {
            Derivation::KeyString => Value::Str(self.key_string(session)?),
            Derivation::ParamString => Value::Str(self.param_string(session)?),
            Derivation::CtorString => Value::Str(self.ctor_string(session)?),
            Derivation::Memo => self.read_annotation(session, &Annotation::Memo)?,
            Derivation::Tags => self.read_annotation(session, &Annotation::Tags)?,
            Derivation::OwningGroup => navigator
                .relay_group_at(self)?
                .map(Value::Entity)
                .unwrap_or(Value::Null),
            Derivation::Equipment => navigator
                .protected_equipment(self)?
                .map(Value::Entity)
                .unwrap_or(Value::Null),
            Derivation::Devices => Value::Entities(navigator.devices(self)?),
            Derivation::Terminals => Value::Entities(navigator.terminals(self)?),
        })
    }

    fn read_annotation(&self, session: &Session, slot: &Annotation) -> OlxResult<Value> {
        let handle = self.live(session)?;
        session
            .engine()
            .read_annotation(handle, slot)
            .map(Value::Str)
            .map_err(|_| session.engine_error(format!("read {}", annotation_name(slot))))
    }

    fn stored_geometry(&self, session: &Session) -> OlxResult<CouplingGeometry> {
        let handle = self.live(session)?;
        let mut values = [0.0; 6];
        for (slot, name) in values.iter_mut().zip(GEOMETRY_FIELDS) {
            let code = self.schema(session, name)?.code;
            let buffer = session
                .engine()
                .read_field(handle, code)
                .map_err(|_| session.engine_error(format!("read {name}")))?;
            *slot = buffer
                .as_float()
                .ok_or_else(|| OlxError::mismatch(name, "float", buffer.type_name()))?;
        }
        Ok(CouplingGeometry::from_values(values))
    }

    /// Sorted field names of this entity's kind.
    pub fn attributes(&self, session: &Session) -> OlxResult<&[String]> {
        self.live(session)?;
        Ok(self
            .ext
            .attributes
            .get_or_init(|| session.schema().all_fields(self.kind)))
    }

    // ---- writes ----------------------------------------------------------

    pub fn change_data(
        &mut self,
        session: &mut Session,
        name: &str,
        value: impl Into<Value>,
    ) -> OlxResult<()> {
        self.change_pairs(session, &[(name.to_string(), value.into())])
    }

    pub fn change_map(
        &mut self,
        session: &mut Session,
        values: &BTreeMap<String, Value>,
    ) -> OlxResult<()> {
        let pairs: Vec<(String, Value)> = values
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        self.change_pairs(session, &pairs)
    }

    /// Parallel name and value lists.
    pub fn change_lists(
        &mut self,
        session: &mut Session,
        names: &[&str],
        values: Vec<Value>,
    ) -> OlxResult<()> {
        if names.len() != values.len() {
            return Err(OlxError::mismatch(
                "values",
                format!("{} values", names.len()),
                format!("{} values", values.len()),
            ));
        }
        let pairs: Vec<(String, Value)> = names
            .iter()
            .map(|name| name.to_string())
            .zip(values)
            .collect();
        self.change_pairs(session, &pairs)
    }

    pub fn change_pairs(
        &mut self,
        session: &mut Session,
        pairs: &[(String, Value)],
    ) -> OlxResult<()> {
        let handle = self.live(session)?;
        let staged = pairs
            .iter()
            .map(|(name, value)| self.stage(session, name, value))
            .collect::<OlxResult<Vec<_>>>()?;
        for write in staged {
            self.issue(session, handle, write)?;
        }
        Ok(())
    }

    fn stage(&self, session: &Session, name: &str, value: &Value) -> OlxResult<Staged> {
        let field = self.schema(session, name)?;
        let name = field.name.clone();
        if !field.is_writable() {
            return Err(OlxError::ReadOnlyField {
                kind: self.kind,
                field: name,
            });
        }
        let text = |value: &Value| match value {
            Value::Str(text) => Ok(text.clone()),
            other => Err(OlxError::mismatch(&field.name, "string", other.type_name())),
        };
        if field.origin == Origin::UserDefined {
            let text = text(value)?;
            return Ok(Staged::Annotation {
                slot: Annotation::UserField(name.clone()),
                name,
                text,
            });
        }
        match field.derivation() {
            Some(Derivation::Memo) => {
                return Ok(Staged::Annotation {
                    text: text(value)?,
                    name,
                    slot: Annotation::Memo,
                })
            }
            Some(Derivation::Tags) => {
                return Ok(Staged::Annotation {
                    text: text(value)?,
                    name,
                    slot: Annotation::Tags,
                })
            }
            _ => {}
        }
        if self.kind == EntityKind::MutualPair && is_geometry_field(&name) {
            let value = match value.as_float() {
                Some(v) if v.is_finite() => v,
                _ => return Err(OlxError::mismatch(&name, "number", value)),
            };
            return Ok(Staged::Geometry { name, value });
        }
        let buffer = validate::coerce(session, self.kind, field, value)?;
        Ok(Staged::Field {
            name,
            code: field.code,
            buffer,
        })
    }

    fn issue(&mut self, session: &mut Session, handle: Handle, write: Staged) -> OlxResult<()> {
        match write {
            Staged::Field { name, code, buffer } => {
                session
                    .engine_mut()
                    .write_field(handle, code, &buffer)
                    .map_err(|_| session.engine_error(format!("write {name}")))?;
                if let Some(companion) = self.companion {
                    session
                        .engine_mut()
                        .write_field(companion, code, &buffer)
                        .map_err(|_| self.half_applied(session, "write", &name))?;
                }
                debug!(kind = %self.kind, %handle, field = %name, "field written");
            }
            Staged::Annotation { name, slot, text } => {
                session
                    .engine_mut()
                    .write_annotation(handle, &slot, &text)
                    .map_err(|_| session.engine_error(format!("write {name}")))?;
                if let Some(companion) = self.companion {
                    session
                        .engine_mut()
                        .write_annotation(companion, &slot, &text)
                        .map_err(|_| self.half_applied(session, "write", &name))?;
                }
            }
            Staged::Geometry { name, value } => {
                self.ext.geometry.insert(name, value);
            }
        }
        Ok(())
    }

    /// Commit pending changes, flushing buffered coupling geometry first.
    pub fn post_data(&mut self, session: &mut Session) -> OlxResult<()> {
        let handle = self.live(session)?;
        if self.kind.is_relationship_only() {
            return Err(OlxError::Unsupported {
                kind: self.kind,
                operation: "post_data",
            });
        }
        if !self.ext.geometry.is_empty() {
            let case = self.orientation();
            let mut caller = case.inverse().apply(self.stored_geometry(session)?);
            for (name, value) in &self.ext.geometry {
                caller.set(name, *value);
            }
            let stored = case.apply(caller);
            for (name, value) in GEOMETRY_FIELDS.iter().zip(stored.values()) {
                let code = self.schema(session, name)?.code;
                session
                    .engine_mut()
                    .write_field(handle, code, &FieldBuffer::Float(value))
                    .map_err(|_| session.engine_error(format!("write {name}")))?;
            }
            debug!(%handle, %case, "coupling geometry flushed");
        }
        session
            .engine_mut()
            .commit(handle)
            .map_err(|_| session.engine_error(format!("commit {}", self.kind)))?;
        if let Some(companion) = self.companion {
            session
                .engine_mut()
                .commit(companion)
                .map_err(|_| session.engine_error(format!("commit {} companion", self.kind)))?;
        }
        self.ext.geometry.clear();
        Ok(())
    }

    /// Delete the record; the instance is unusable afterwards.
    pub fn delete(&mut self, session: &mut Session) -> OlxResult<()> {
        let handle = self.live(session)?;
        if self.kind.is_relationship_only() {
            return Err(OlxError::Unsupported {
                kind: self.kind,
                operation: "delete",
            });
        }
        session
            .engine_mut()
            .delete(handle)
            .map_err(|_| session.engine_error(format!("delete {}", self.kind)))?;
        self.handle = handle.deleted();
        if let Some(companion) = self.companion {
            session
                .engine_mut()
                .delete(companion)
                .map_err(|_| self.half_applied(session, "delete", "record"))?;
            self.companion = Some(companion.deleted());
        }
        debug!(kind = %self.kind, %handle, "deleted");
        Ok(())
    }

    /// Engine failure on the companion half of a split device, after the
    /// primary half already took the change.
    fn half_applied(&self, session: &Session, verb: &str, what: &str) -> OlxError {
        session.engine_error(format!(
            "{verb} {what} on {} companion (primary half already applied)",
            self.kind
        ))
    }

    // ---- serialization ---------------------------------------------------

    pub fn key_string(&self, session: &Session) -> OlxResult<String> {
        let handle = self.live(session)?;
        keystr::key_string(session.engine(), self.kind, handle)
    }

    pub fn ctor_string(&self, session: &Session) -> OlxResult<String> {
        let handle = self.live(session)?;
        keystr::ctor_string(session.engine(), self.kind, handle)
    }

    /// JSON object of the whole-record read; entities appear as key strings.
    pub fn param_string(&self, session: &Session) -> OlxResult<String> {
        let record = self.get_all(session)?;
        Ok(serde_json::to_string(&to_json(session, &record)?)?)
    }

    // ---- relay settings --------------------------------------------------

    pub fn setting_names(&self, session: &Session) -> OlxResult<&[String]> {
        let handle = self.live(session)?;
        if !self.kind.has_settings() {
            return Err(OlxError::Unsupported {
                kind: self.kind,
                operation: "setting_names",
            });
        }
        if let Some(names) = self.ext.settings.get() {
            return Ok(names);
        }
        let names = session
            .engine()
            .setting_names(handle)
            .map_err(|_| session.engine_error("read setting names"))?;
        Ok(self.ext.settings.get_or_init(|| names))
    }

    fn setting_name(&self, session: &Session, name: &str) -> OlxResult<String> {
        let names = self.setting_names(session)?;
        names
            .iter()
            .find(|known| known.eq_ignore_ascii_case(name.trim()))
            .cloned()
            .ok_or_else(|| OlxError::UnknownField {
                kind: self.kind,
                field: name.to_string(),
                valid: names.to_vec(),
            })
    }

    pub fn get_setting(&self, session: &Session, name: &str) -> OlxResult<String> {
        let name = self.setting_name(session, name)?;
        session
            .engine()
            .read_setting(self.handle, &name)
            .map_err(|_| session.engine_error(format!("read setting {name}")))
    }

    pub fn set_setting(&self, session: &mut Session, name: &str, value: &str) -> OlxResult<()> {
        let name = self.setting_name(session, name)?;
        session
            .engine_mut()
            .write_setting(self.handle, &name, value)
            .map_err(|_| session.engine_error(format!("write setting {name}")))
    }
}

fn annotation_name(slot: &Annotation) -> &str {
    match slot {
        Annotation::Memo => "MEMO",
        Annotation::Tags => "TAGS",
        Annotation::UserField(name) => name,
    }
}

fn to_json(session: &Session, value: &Value) -> OlxResult<serde_json::Value> {
    use serde_json::Value as Json;
    Ok(match value {
        Value::Null => Json::Null,
        Value::Int(v) => Json::from(*v),
        Value::Float(v) => Json::from(*v),
        Value::Str(text) => Json::from(text.as_str()),
        Value::Ints(values) => Json::from(values.clone()),
        Value::Floats(values) => Json::from(values.clone()),
        Value::List(items) => Json::Array(
            items
                .iter()
                .map(|item| to_json(session, item))
                .collect::<OlxResult<_>>()?,
        ),
        Value::Entity(entity) => Json::from(entity.key_string(session)?),
        Value::Entities(entities) => Json::Array(
            entities
                .iter()
                .map(|e| e.key_string(session).map(Json::from))
                .collect::<OlxResult<_>>()?,
        ),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(name, item)| Ok((name.clone(), to_json(session, item)?)))
                .collect::<OlxResult<_>>()?,
        ),
    })
}

impl Attributes for GenericEntity {
    fn get(&self, session: &Session, field: &str) -> OlxResult<Value> {
        GenericEntity::get(self, session, field)
    }

    fn set(&mut self, session: &mut Session, field: &str, value: Value) -> OlxResult<()> {
        self.change_data(session, field, value)
    }

    fn field_names(&self, session: &Session) -> OlxResult<Vec<String>> {
        self.attributes(session).map(<[String]>::to_vec)
    }
}

impl PartialEq for GenericEntity {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token && self.kind == other.kind && self.handle == other.handle
    }
}

impl Eq for GenericEntity {}

impl std::hash::Hash for GenericEntity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.token.hash(state);
        self.kind.hash(state);
        self.handle.hash(state);
    }
}

impl From<EntityRef> for GenericEntity {
    fn from(r: EntityRef) -> Self {
        Self {
            kind: r.kind,
            handle: r.handle,
            companion: r.companion,
            token: r.token,
            orientation: None,
            ext: Extension::default(),
        }
    }
}

impl std::fmt::Display for GenericEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.handle)
    }
}
