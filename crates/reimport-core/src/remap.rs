//! # Identifier Remapping
//!
//! Translation table from export-time burst identifiers to the identifiers
//! the store assigned on re-import.
//!
//! Bursts are reconstructed before anything that references them, so a
//! `resolve` that misses is a broken call order, not bad input. It is
//! reported as `ImportError::UnmappedIdentifier` and aborts the import.

use crate::formats::OldBurstId;
use crate::types::BurstId;
use crate::{ImportError, Result};
use std::collections::BTreeMap;

/// Old -> new burst identifiers for one import invocation.
#[derive(Debug, Clone, Default)]
pub struct IdentifierRemapper {
    bursts: BTreeMap<OldBurstId, BurstId>,
}

impl IdentifierRemapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `old` was re-created as `new`.
    ///
    /// Recording the same pair twice is a no-op. Re-binding an old id to a
    /// different new id is rejected.
    pub fn record(&mut self, old: OldBurstId, new: BurstId) -> Result<()> {
        match self.bursts.get(&old) {
            Some(existing) if *existing != new => Err(ImportError::Store(format!(
                "burst {} already mapped to {}, refusing {}",
                old, existing, new
            ))),
            Some(_) => Ok(()),
            None => {
                tracing::debug!(old = %old, new = %new, "burst id remapped");
                self.bursts.insert(old, new);
                Ok(())
            }
        }
    }

    /// The new id recorded for `old`.
    pub fn resolve(&self, old: &OldBurstId) -> Result<BurstId> {
        self.bursts
            .get(old)
            .copied()
            .ok_or_else(|| ImportError::UnmappedIdentifier(old.to_string()))
    }

    pub fn len(&self) -> usize {
        self.bursts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bursts.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_after_record() {
        let mut remap = IdentifierRemapper::new();
        remap
            .record(OldBurstId::new("7"), BurstId(42))
            .expect("record");
        assert_eq!(remap.resolve(&OldBurstId::new("7")).expect("resolve"), BurstId(42));
        assert_eq!(remap.resolve(&OldBurstId::new("7")).expect("resolve"), BurstId(42));
        assert_eq!(remap.len(), 1);
    }

    #[test]
    fn resolve_before_record_is_contract_violation() {
        let remap = IdentifierRemapper::new();
        assert!(remap.is_empty());
        assert!(matches!(
            remap.resolve(&OldBurstId::new("3")),
            Err(ImportError::UnmappedIdentifier(id)) if id == "3"
        ));
    }

    #[test]
    fn rebinding_rejected_identical_accepted() {
        let mut remap = IdentifierRemapper::new();
        remap.record(OldBurstId::new("1"), BurstId(10)).expect("first");
        remap
            .record(OldBurstId::new("1"), BurstId(10))
            .expect("identical");
        assert!(remap.record(OldBurstId::new("1"), BurstId(11)).is_err());
        assert_eq!(remap.resolve(&OldBurstId::new("1")).expect("resolve"), BurstId(10));
    }
}
