use serde::{Deserialize, Serialize};

/// Opaque engine handle.
///
/// Positive values address live records, negated values mark records deleted
/// through this layer, and zero is the engine's "not found" answer. Handles are
/// only comparable within one open network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(i64);

impl Handle {
    pub const NONE: Handle = Handle(0);

    #[inline]
    pub fn new(value: i64) -> Self {
        Handle(value)
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// The deleted marker for this handle. Idempotent.
    #[inline]
    pub fn deleted(&self) -> Self {
        Handle(-self.0.abs())
    }

    /// `Some(self)` when live, `None` for the not-found answer.
    #[inline]
    pub fn found(self) -> Option<Self> {
        self.is_live().then_some(self)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_states() {
        let h = Handle::new(42);
        assert!(h.is_live());
        assert!(h.deleted().is_deleted());
        assert_eq!(h.deleted().deleted(), h.deleted());
        assert_eq!(Handle::NONE.found(), None);
        assert_eq!(h.found(), Some(h));
    }
}
