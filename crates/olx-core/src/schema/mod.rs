//! Per-kind field tables.
//!
//! Each [`EntityKind`] owns a table mapping an upper-cased field name to its
//! external field code, a description and a [`ValueKind`]. Code `0` marks a
//! derived field computed by the access layer rather than read through the
//! engine's field primitive. Engine codes are allocated as
//! `kind.code_base() + n`.
//!
//! The tables carry a representative set of fields per kind; they are data,
//! the dispatch logic in `entity` does not special-case kinds beyond the rules
//! in [`special_codes`].

mod tables;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{OlxError, OlxResult};
use crate::kind::EntityKind;

/// Shape of the values a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    /// Fixed-length float vector
    FloatVec(usize),
    /// Fixed-length int vector
    IntVec(usize),
    /// Integer restricted to an enumerated set
    Code(&'static [i64]),
    /// Handle of an object of one of the listed kinds
    Ref(&'static [EntityKind]),
    RefList(&'static [EntityKind]),
    /// Natural-key tuple of the given kind, resolved to a handle
    Composite(EntityKind),
    Derived(Derivation),
}

/// Rules for fields the access layer computes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    KeyString,
    ParamString,
    CtorString,
    Memo,
    Tags,
    /// Relay group mounted at a terminal
    OwningGroup,
    /// Branch protected by a relay group
    Equipment,
    /// Devices mounted in a relay group
    Devices,
    /// Branch ends at a bus
    Terminals,
}

impl Derivation {
    /// Expensive or self-referential derivations left out of whole-record reads.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Derivation::KeyString
                | Derivation::ParamString
                | Derivation::CtorString
                | Derivation::Devices
                | Derivation::Terminals
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Builtin,
    UserDefined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    /// External field code; 0 for derived and user-defined fields
    pub code: u32,
    pub description: String,
    pub kind: ValueKind,
    pub access: Access,
    pub origin: Origin,
}

impl FieldSchema {
    pub fn derivation(&self) -> Option<Derivation> {
        match self.kind {
            ValueKind::Derived(derivation) => Some(derivation),
            _ => None,
        }
    }

    /// Writable through the generic set path.
    pub fn is_writable(&self) -> bool {
        if self.access == Access::ReadOnly {
            return false;
        }
        if self.origin == Origin::UserDefined {
            return true;
        }
        match self.derivation() {
            Some(derivation) => matches!(derivation, Derivation::Memo | Derivation::Tags),
            None => self.code != 0,
        }
    }

    /// Included in whole-record reads.
    pub fn in_record(&self) -> bool {
        !self.derivation().is_some_and(Derivation::is_aggregate)
    }
}

/// Kind-specific code sets that narrow a field's generic [`ValueKind`].
pub fn special_codes(kind: EntityKind, field: &str) -> Option<&'static [i64]> {
    match (kind, field) {
        (EntityKind::RelayOcGround, "POLAR") => Some(&[0, 1, 2, 3]),
        (EntityKind::RelayOcPhase, "POLAR") => Some(&[0, 1]),
        _ => None,
    }
}

/// Entity operations listed alongside field names in unknown-field errors.
pub fn method_names() -> &'static [&'static str] {
    &[
        "change_data",
        "ctor_string",
        "delete",
        "get_data",
        "get_setting",
        "key_string",
        "param_string",
        "post_data",
        "set_setting",
        "setting_names",
    ]
}

/// Field tables for every kind.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: BTreeMap<EntityKind, Vec<FieldSchema>>,
}

static BUILTIN: Lazy<SchemaRegistry> = Lazy::new(|| SchemaRegistry {
    tables: EntityKind::ALL
        .into_iter()
        .map(|kind| (kind, tables::table(kind)))
        .collect(),
});

/// Shared read-only copy of the built-in tables.
pub fn builtin() -> &'static SchemaRegistry {
    &BUILTIN
}

impl SchemaRegistry {
    /// Fresh, extendable copy of the built-in tables.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Case-insensitive field lookup.
    pub fn lookup(&self, kind: EntityKind, name: &str) -> Option<&FieldSchema> {
        let upper = name.trim().to_ascii_uppercase();
        self.tables
            .get(&kind)?
            .iter()
            .find(|field| field.name == upper)
    }

    /// External code of a builtin engine-backed field.
    pub fn code(&self, kind: EntityKind, name: &str) -> Option<u32> {
        self.lookup(kind, name)
            .map(|field| field.code)
            .filter(|code| *code != 0)
    }

    /// Reverse lookup by external code.
    pub fn by_code(&self, kind: EntityKind, code: u32) -> Option<&FieldSchema> {
        if code == 0 {
            return None;
        }
        self.tables.get(&kind)?.iter().find(|f| f.code == code)
    }

    /// Sorted field names, user-defined fields included.
    pub fn all_fields(&self, kind: EntityKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields(kind)
            .iter()
            .map(|field| field.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn fields(&self, kind: EntityKind) -> &[FieldSchema] {
        self.tables.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Append a user-defined string field to `kind`.
    pub fn extend(&mut self, kind: EntityKind, name: &str) -> OlxResult<()> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.is_empty() || !upper.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(OlxError::Config(format!(
                "invalid user-defined field name '{name}'"
            )));
        }
        if self.lookup(kind, &upper).is_some() {
            return Err(OlxError::Config(format!(
                "{kind} already has a field named {upper}"
            )));
        }
        self.tables.entry(kind).or_default().push(FieldSchema {
            description: format!("User-defined field {upper}"),
            name: upper,
            code: 0,
            kind: ValueKind::Str,
            access: Access::ReadWrite,
            origin: Origin::UserDefined,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = SchemaRegistry::builtin();
        let field = registry.lookup(EntityKind::Bus, "kv").unwrap();
        assert_eq!(field.name, "KV");
        assert_eq!(field.code, EntityKind::Bus.code_base() + 2);
        assert!(registry.lookup(EntityKind::Bus, "NOPE").is_none());
    }

    #[test]
    fn test_every_kind_carries_common_fields() {
        let registry = SchemaRegistry::builtin();
        for kind in EntityKind::ALL {
            for name in ["KEYSTR", "PARAMSTR", "CTORSTR", "GUID"] {
                assert!(registry.lookup(kind, name).is_some(), "{kind} lacks {name}");
            }
            let annotated = registry.lookup(kind, "MEMO").is_some();
            assert_eq!(annotated, !kind.is_relationship_only(), "{kind} memo");
        }
    }

    #[test]
    fn test_codes_are_unique_within_the_registry() {
        let registry = SchemaRegistry::builtin();
        let mut seen = std::collections::HashSet::new();
        for kind in EntityKind::ALL {
            for field in registry.fields(kind) {
                if field.code != 0 {
                    assert!(seen.insert(field.code), "{kind}.{} reuses a code", field.name);
                    assert!(field.code >= kind.code_base() && field.code < kind.code_base() + 100);
                }
            }
        }
    }

    #[test]
    fn test_all_fields_is_sorted_and_includes_extensions() {
        let mut registry = SchemaRegistry::builtin();
        registry.extend(EntityKind::Line, "owner").unwrap();
        let names = registry.all_fields(EntityKind::Line);
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"OWNER".to_string()));
        let field = registry.lookup(EntityKind::Line, "OWNER").unwrap();
        assert!(field.is_writable());
        assert_eq!(field.origin, Origin::UserDefined);
        assert!(registry.extend(EntityKind::Line, "Owner").is_err());
        assert!(registry.extend(EntityKind::Line, "").is_err());
        // builtin tables are untouched
        assert!(builtin().lookup(EntityKind::Line, "OWNER").is_none());
    }

    #[test]
    fn test_aggregates_stay_out_of_records() {
        let registry = SchemaRegistry::builtin();
        let keystr = registry.lookup(EntityKind::Bus, "KEYSTR").unwrap();
        assert!(!keystr.in_record());
        assert!(!keystr.is_writable());
        let memo = registry.lookup(EntityKind::Bus, "MEMO").unwrap();
        assert!(memo.in_record());
        assert!(memo.is_writable());
    }

    #[test]
    fn test_polar_codes_depend_on_kind() {
        assert_eq!(
            special_codes(EntityKind::RelayOcGround, "POLAR"),
            Some(&[0, 1, 2, 3][..])
        );
        assert_eq!(special_codes(EntityKind::RelayOcPhase, "POLAR"), Some(&[0, 1][..]));
        assert_eq!(special_codes(EntityKind::Line, "POLAR"), None);
    }
}
