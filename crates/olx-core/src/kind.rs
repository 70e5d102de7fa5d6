//! The closed set of record kinds the engine stores.

use serde::{Deserialize, Serialize};

/// Record category of an engine object.
///
/// The set is closed: every kind has a display tag, a natural-key shape and a
/// block of external field codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Bus,
    Generator,
    GenUnit,
    Load,
    LoadUnit,
    Shunt,
    ShuntUnit,
    Line,
    Transformer2W,
    Transformer3W,
    PhaseShifter,
    SeriesDevice,
    Switch,
    MutualPair,
    /// Branch end; pure relationship record with no settable fields.
    Terminal,
    RelayGroup,
    RelayOcGround,
    RelayOcPhase,
    RelayDsGround,
    RelayDsPhase,
    Fuse,
    /// Stored by the engine as a ground half and a phase half.
    Recloser,
    Scheme,
    Breaker,
}

/// How a kind's natural (composite) key is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// `[name, kV]` or `[number]`
    Bus,
    /// `[bus1, bus2, circuit]`
    TwoBus,
    /// `[bus1, bus2, bus3, circuit]`
    ThreeBus,
    /// `[bus]`
    BusOwned,
    /// `[bus, circuit]`
    BusUnit,
    /// `[bus1, bus2, circuit, branch code]`
    BranchEnd,
    /// `[relay group, id]`
    GroupDevice,
    /// `[bus, name]`
    BusNamed,
    /// `[line, line]`
    LinePair,
}

/// Which half of a split ground/phase device a handle addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitPart {
    Ground,
    Phase,
}

impl EntityKind {
    pub const ALL: [EntityKind; 24] = [
        EntityKind::Bus,
        EntityKind::Generator,
        EntityKind::GenUnit,
        EntityKind::Load,
        EntityKind::LoadUnit,
        EntityKind::Shunt,
        EntityKind::ShuntUnit,
        EntityKind::Line,
        EntityKind::Transformer2W,
        EntityKind::Transformer3W,
        EntityKind::PhaseShifter,
        EntityKind::SeriesDevice,
        EntityKind::Switch,
        EntityKind::MutualPair,
        EntityKind::Terminal,
        EntityKind::RelayGroup,
        EntityKind::RelayOcGround,
        EntityKind::RelayOcPhase,
        EntityKind::RelayDsGround,
        EntityKind::RelayDsPhase,
        EntityKind::Fuse,
        EntityKind::Recloser,
        EntityKind::Scheme,
        EntityKind::Breaker,
    ];

    /// Kinds that carry a branch code and can be taken out of service as outages.
    pub const BRANCHES: [EntityKind; 6] = [
        EntityKind::Line,
        EntityKind::Transformer2W,
        EntityKind::Transformer3W,
        EntityKind::PhaseShifter,
        EntityKind::SeriesDevice,
        EntityKind::Switch,
    ];

    /// Tag used inside display strings (`[TAG] ...`) and constructor strings.
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Bus => "BUS",
            EntityKind::Generator => "GEN",
            EntityKind::GenUnit => "GENUNIT",
            EntityKind::Load => "LOAD",
            EntityKind::LoadUnit => "LOADUNIT",
            EntityKind::Shunt => "SHUNT",
            EntityKind::ShuntUnit => "SHUNTUNIT",
            EntityKind::Line => "LINE",
            EntityKind::Transformer2W => "XFMR",
            EntityKind::Transformer3W => "XFMR3",
            EntityKind::PhaseShifter => "SHIFTER",
            EntityKind::SeriesDevice => "SERIESRC",
            EntityKind::Switch => "SWITCH",
            EntityKind::MutualPair => "MULINE",
            EntityKind::Terminal => "TERMINAL",
            EntityKind::RelayGroup => "RLYGROUP",
            EntityKind::RelayOcGround => "OCRLYG",
            EntityKind::RelayOcPhase => "OCRLYP",
            EntityKind::RelayDsGround => "DSRLYG",
            EntityKind::RelayDsPhase => "DSRLYP",
            EntityKind::Fuse => "FUSE",
            EntityKind::Recloser => "RECLSR",
            EntityKind::Scheme => "SCHEME",
            EntityKind::Breaker => "BREAKER",
        }
    }

    /// Inverse of [`EntityKind::tag`] (case-insensitive).
    pub fn from_tag(tag: &str) -> Option<Self> {
        let upper = tag.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.tag() == upper)
    }

    pub fn key_shape(self) -> KeyShape {
        match self {
            EntityKind::Bus => KeyShape::Bus,
            EntityKind::Generator | EntityKind::Load | EntityKind::Shunt => KeyShape::BusOwned,
            EntityKind::GenUnit | EntityKind::LoadUnit | EntityKind::ShuntUnit => {
                KeyShape::BusUnit
            }
            EntityKind::Line
            | EntityKind::Transformer2W
            | EntityKind::PhaseShifter
            | EntityKind::SeriesDevice
            | EntityKind::Switch => KeyShape::TwoBus,
            EntityKind::Transformer3W => KeyShape::ThreeBus,
            EntityKind::MutualPair => KeyShape::LinePair,
            EntityKind::Terminal | EntityKind::RelayGroup => KeyShape::BranchEnd,
            EntityKind::RelayOcGround
            | EntityKind::RelayOcPhase
            | EntityKind::RelayDsGround
            | EntityKind::RelayDsPhase
            | EntityKind::Fuse
            | EntityKind::Recloser
            | EntityKind::Scheme => KeyShape::GroupDevice,
            EntityKind::Breaker => KeyShape::BusNamed,
        }
    }

    /// First external field code of the kind's block; field codes are `base + n`.
    pub fn code_base(self) -> u32 {
        let index = Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or_default() as u32;
        1100 + index * 100
    }

    /// One-letter branch code (`L`, `X`, `T`, `P`, `S`, `W`) for branch equipment.
    pub fn branch_code(self) -> Option<char> {
        match self {
            EntityKind::Line => Some('L'),
            EntityKind::Transformer2W => Some('X'),
            EntityKind::Transformer3W => Some('T'),
            EntityKind::PhaseShifter => Some('P'),
            EntityKind::SeriesDevice => Some('S'),
            EntityKind::Switch => Some('W'),
            _ => None,
        }
    }

    /// Bit of the engine's outage-candidate kind mask.
    pub fn outage_bit(self) -> Option<u32> {
        Self::BRANCHES
            .iter()
            .position(|kind| *kind == self)
            .map(|index| 1 << index)
    }

    pub fn from_branch_code(code: char) -> Option<Self> {
        let code = code.to_ascii_uppercase();
        Self::BRANCHES
            .into_iter()
            .find(|kind| kind.branch_code() == Some(code))
    }

    /// Ground/phase sibling within a relay family.
    pub fn sibling(self) -> Option<Self> {
        match self {
            EntityKind::RelayOcGround => Some(EntityKind::RelayOcPhase),
            EntityKind::RelayOcPhase => Some(EntityKind::RelayOcGround),
            EntityKind::RelayDsGround => Some(EntityKind::RelayDsPhase),
            EntityKind::RelayDsPhase => Some(EntityKind::RelayDsGround),
            _ => None,
        }
    }

    /// Family tag shared by a ground/phase relay pair (`OCRLY`, `DSRLY`).
    pub fn family_tag(self) -> Option<&'static str> {
        match self {
            EntityKind::RelayOcGround | EntityKind::RelayOcPhase => Some("OCRLY"),
            EntityKind::RelayDsGround | EntityKind::RelayDsPhase => Some("DSRLY"),
            _ => None,
        }
    }

    /// Legacy ground and phase tags of a split device, in resolution order.
    pub fn split_tags(self) -> Option<[&'static str; 2]> {
        match self {
            EntityKind::Recloser => Some(["RECLSRG", "RECLSRP"]),
            _ => None,
        }
    }

    pub fn is_split(self) -> bool {
        self.split_tags().is_some()
    }

    /// Relationship wrappers have no settable fields; commit and delete are refused.
    pub fn is_relationship_only(self) -> bool {
        matches!(self, EntityKind::Terminal)
    }

    pub fn is_branch(self) -> bool {
        self.branch_code().is_some()
    }

    /// Number of buses a branch connects (0 for non-branch kinds).
    pub fn bus_count(self) -> usize {
        match self.key_shape() {
            KeyShape::TwoBus => 2,
            KeyShape::ThreeBus => 3,
            _ => 0,
        }
    }

    /// Devices that live in a relay group.
    pub fn is_group_device(self) -> bool {
        self.key_shape() == KeyShape::GroupDevice
    }

    /// Devices with a time-current characteristic (operate times are defined).
    pub fn is_timed_device(self) -> bool {
        matches!(
            self,
            EntityKind::RelayOcGround
                | EntityKind::RelayOcPhase
                | EntityKind::RelayDsGround
                | EntityKind::RelayDsPhase
                | EntityKind::Fuse
                | EntityKind::Recloser
        )
    }

    /// Kinds whose settings are addressed by name through the engine.
    pub fn has_settings(self) -> bool {
        self.is_timed_device()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip_for_every_kind() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EntityKind::from_tag("line"), Some(EntityKind::Line));
        assert_eq!(EntityKind::from_tag("OCRLY"), None);
    }

    #[test]
    fn test_code_bases_do_not_overlap() {
        let mut bases: Vec<u32> = EntityKind::ALL.iter().map(|k| k.code_base()).collect();
        bases.sort_unstable();
        bases.dedup();
        assert_eq!(bases.len(), EntityKind::ALL.len());
        assert_eq!(EntityKind::Bus.code_base(), 1100);
    }

    #[test]
    fn test_branch_codes_cover_branch_kinds() {
        for kind in EntityKind::BRANCHES {
            let code = kind.branch_code().unwrap();
            assert_eq!(EntityKind::from_branch_code(code), Some(kind));
        }
        assert_eq!(EntityKind::from_branch_code('l'), Some(EntityKind::Line));
        assert_eq!(EntityKind::from_branch_code('Q'), None);
        assert_eq!(EntityKind::Line.outage_bit(), Some(1));
        assert_eq!(EntityKind::Switch.outage_bit(), Some(32));
        assert_eq!(EntityKind::Bus.outage_bit(), None);
    }

    #[test]
    fn test_relay_siblings_are_symmetric() {
        for kind in EntityKind::ALL {
            if let Some(sibling) = kind.sibling() {
                assert_eq!(sibling.sibling(), Some(kind));
                assert_eq!(sibling.family_tag(), kind.family_tag());
            }
        }
        assert!(EntityKind::Recloser.is_split());
        assert!(EntityKind::Terminal.is_relationship_only());
    }
}
