//! Outage lists attached to classical faults.
//!
//! An [`OutageSpec`] names the branches to take out of service and how the
//! engine should combine them ([`OutageMode`]). Candidate lists are usually
//! grown with [`OutageBuilder`], which asks the engine for the branches within
//! a number of tiers of an origin and filters them by kind.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use olx_core::validate::{expect_non_negative, one_of};
use olx_core::{
    EntityKind, GenericEntity, OlxError, OlxResult, OutageRequest, Session, ValidationReport,
};

/// How the candidates of an outage list are combined into contingencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutageMode {
    /// One branch at a time
    Single,
    /// One branch at a time, grounded at both ends through an admittance
    SingleGrounded,
    /// One and two branches at a time
    Double,
    /// Every candidate at once
    All,
}

impl OutageMode {
    pub const ALL: [OutageMode; 4] = [
        OutageMode::Single,
        OutageMode::SingleGrounded,
        OutageMode::Double,
        OutageMode::All,
    ];

    /// Engine mode code.
    pub fn code(self) -> i32 {
        match self {
            OutageMode::Single => 1,
            OutageMode::SingleGrounded => 2,
            OutageMode::Double => 3,
            OutageMode::All => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutageMode::Single => "Single",
            OutageMode::SingleGrounded => "SingleGrounded",
            OutageMode::Double => "Double",
            OutageMode::All => "All",
        }
    }

    /// Case-insensitive; separators are ignored (`single-gnd`, `SINGLE_GROUNDED`).
    pub fn parse(text: &str) -> Option<Self> {
        let squashed: String = text
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();
        match squashed.as_str() {
            "SINGLE" => Some(OutageMode::Single),
            "SINGLEGROUNDED" | "SINGLEGND" => Some(OutageMode::SingleGrounded),
            "DOUBLE" => Some(OutageMode::Double),
            "ALL" => Some(OutageMode::All),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outage list of a classical fault.
///
/// `mode` is kept as supplied and checked by [`OutageSpec::check_data`].
#[derive(Debug, Clone)]
pub struct OutageSpec {
    pub mode: String,
    /// Grounding admittance in mho; only meaningful for `SingleGrounded`
    pub grounding_admittance: Option<f64>,
    pub candidates: Vec<GenericEntity>,
}

impl OutageSpec {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            grounding_admittance: None,
            candidates: Vec::new(),
        }
    }

    pub fn with_grounding_admittance(mut self, mho: f64) -> Self {
        self.grounding_admittance = Some(mho);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<GenericEntity>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn mode(&self) -> Option<OutageMode> {
        OutageMode::parse(&self.mode)
    }

    /// Validate and encode for the engine.
    pub fn check_data(&self, session: &Session) -> OlxResult<OutageRequest> {
        let mut report = ValidationReport::new("outage");
        let request = self.collect(session, &mut report)?;
        report.into_result(request)
    }

    /// Record every problem in `report` and return the encoding built from
    /// whatever was valid. Session errors are returned, not reported.
    pub(crate) fn collect(
        &self,
        session: &Session,
        report: &mut ValidationReport,
    ) -> OlxResult<OutageRequest> {
        let mode = self.mode();
        if mode.is_none() {
            let names: Vec<&str> = OutageMode::ALL.iter().map(|m| m.name()).collect();
            report.add("mode", one_of(names.as_slice()), format!("\"{}\"", self.mode));
        }

        match (mode, self.grounding_admittance) {
            (Some(OutageMode::SingleGrounded), None) => report.add(
                "grounding_admittance",
                "a value >= 0 for SingleGrounded",
                "nothing",
            ),
            (Some(OutageMode::SingleGrounded) | None, Some(mho)) => {
                if let Err(issue) = expect_non_negative("grounding_admittance", mho) {
                    report.issues.push(issue);
                }
            }
            (Some(other), Some(mho)) => report.add(
                "grounding_admittance",
                format!("no value for mode {other}"),
                mho,
            ),
            _ => {}
        }

        if self.candidates.is_empty() {
            report.add("candidates", "at least one branch", "an empty list");
        }
        let mut handles = Vec::with_capacity(self.candidates.len());
        for (n, candidate) in self.candidates.iter().enumerate() {
            let field = format!("candidates[{n}]");
            if candidate.is_deleted() {
                report.add(field, "a live branch", format!("deleted {}", candidate.kind()));
                continue;
            }
            session.check(candidate.token(), candidate.kind())?;
            if candidate.kind().outage_bit().is_none() {
                report.add(field, one_of(&EntityKind::BRANCHES), candidate.kind());
                continue;
            }
            if !handles.contains(&candidate.handle()) {
                handles.push(candidate.handle());
            }
        }

        Ok(OutageRequest {
            mode: mode.map(OutageMode::code).unwrap_or_default(),
            grounding_admittance: self.grounding_admittance.unwrap_or_default(),
            candidates: handles,
        })
    }

    /// Grow the candidate list from `origin`. Returns how many were added.
    pub fn add_candidates<S: AsRef<str>>(
        &mut self,
        session: &Session,
        origin: &GenericEntity,
        tiers: u32,
        wanted: &[S],
    ) -> OlxResult<usize> {
        let found = OutageBuilder::new(session).build(origin, tiers, wanted, &self.candidates)?;
        let added = found.len();
        self.candidates.extend(found);
        Ok(added)
    }
}

/// Collects outage candidates around an origin through the engine.
pub struct OutageBuilder<'s> {
    session: &'s Session,
}

impl<'s> OutageBuilder<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Translate wanted kinds into the engine's kind mask.
    ///
    /// Entries are branch codes (`L`, `X`, `T`, `P`, `S`, `W`), branch kind
    /// tags (`LINE`, `XFMR`, ...) or `ALL`.
    pub fn kind_mask<S: AsRef<str>>(wanted: &[S]) -> OlxResult<u32> {
        let mut report = ValidationReport::new("outage candidates");
        let mask = mask_into(wanted, &mut report);
        report.into_result(mask)
    }

    /// Branches of the wanted kinds within `tiers` of `origin`, skipping
    /// anything already in `existing`.
    ///
    /// Tier 1 holds the branches at the origin's buses; each further tier
    /// reaches one bus further out.
    pub fn build<S: AsRef<str>>(
        &self,
        origin: &GenericEntity,
        tiers: u32,
        wanted: &[S],
        existing: &[GenericEntity],
    ) -> OlxResult<Vec<GenericEntity>> {
        let mut report = ValidationReport::new("outage candidates");
        if tiers == 0 {
            report.add("tiers", "at least 1", tiers);
        }
        let mask = mask_into(wanted, &mut report);
        report.into_result(())?;

        if origin.is_deleted() {
            return Err(OlxError::Deleted {
                kind: origin.kind(),
            });
        }
        self.session.check(origin.token(), origin.kind())?;
        let kind = origin.kind();
        let origin_kind = kind.is_branch()
            || matches!(kind, EntityKind::Bus | EntityKind::Terminal | EntityKind::RelayGroup);
        if !origin_kind {
            return Err(OlxError::Unsupported {
                kind,
                operation: "outage origin",
            });
        }

        let handles = self
            .session
            .engine()
            .build_outage_candidates(origin.handle(), tiers, mask)
            .map_err(|_| self.session.engine_error(format!("build outage candidates from {origin}")))?;

        let mut seen: HashSet<_> = existing.iter().map(GenericEntity::handle).collect();
        let mut out = Vec::new();
        for handle in handles {
            if seen.insert(handle) {
                out.push(self.session.wrap(handle)?);
            }
        }
        debug!(%origin, tiers, mask, found = out.len(), "outage candidates built");
        Ok(out)
    }
}

fn mask_into<S: AsRef<str>>(wanted: &[S], report: &mut ValidationReport) -> u32 {
    if wanted.is_empty() {
        report.add("wanted", "at least one branch kind", "an empty list");
    }
    let mut mask = 0;
    for (n, entry) in wanted.iter().enumerate() {
        let text = entry.as_ref().trim();
        if text.eq_ignore_ascii_case("ALL") {
            mask |= EntityKind::BRANCHES
                .iter()
                .filter_map(|kind| kind.outage_bit())
                .fold(0, |acc, bit| acc | bit);
            continue;
        }
        let mut chars = text.chars();
        let kind = match (chars.next(), chars.next()) {
            (Some(code), None) => EntityKind::from_branch_code(code),
            _ => EntityKind::from_tag(text).filter(|kind| kind.is_branch()),
        };
        match kind.and_then(EntityKind::outage_bit) {
            Some(bit) => mask |= bit,
            None => report.add(
                format!("wanted[{n}]"),
                "a branch code (L, X, T, P, S, W), a branch kind tag or ALL",
                format!("\"{text}\""),
            ),
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(OutageMode::parse("SingleGrounded"), Some(OutageMode::SingleGrounded));
        assert_eq!(OutageMode::parse("single-gnd"), Some(OutageMode::SingleGrounded));
        assert_eq!(OutageMode::parse("ALL"), Some(OutageMode::All));
        assert_eq!(OutageMode::parse("triple"), None);
        assert_eq!(OutageMode::Double.code(), 3);
    }

    #[test]
    fn test_kind_mask() {
        assert_eq!(OutageBuilder::kind_mask(&["L"]).unwrap(), 1);
        assert_eq!(OutageBuilder::kind_mask(&["xfmr", "W"]).unwrap(), 2 | 32);
        assert_eq!(OutageBuilder::kind_mask(&["ALL"]).unwrap(), 0x3f);

        let err = OutageBuilder::kind_mask(&["L", "BUS", "Q"]).unwrap_err();
        let OlxError::ValidationFailed(report) = err else {
            panic!("expected a validation failure");
        };
        assert_eq!(report.issue_count(), 2);
        assert!(report.issue("wanted[1]").is_some());
        assert!(report.issue("wanted[2]").is_some());
    }
}
