// 📒 Bond Registry - surname to MKF allocation bookkeeping
//
// Owns the available pool and the per-surname bond lists. Every identifier
// lives in exactly one place: the pool, or one surname's bond list.

use crate::identifier::{MkfId, POOL_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

// ============================================================================
// BOND ERRORS
// ============================================================================

/// A bind or unbind that cannot be applied. The registry is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BondError {
    /// The surname already holds this identifier
    #[error("{id} is already bound to {surname}")]
    AlreadyBound { surname: String, id: MkfId },

    /// The identifier is not in the available pool (held by another surname)
    #[error("{id} is not in the available pool")]
    Unavailable { id: MkfId },

    /// The surname does not hold this identifier
    #[error("{id} is not bound to {surname}")]
    NotBound { surname: String, id: MkfId },
}

// ============================================================================
// SURNAME RECORD
// ============================================================================

/// One surname and the identifiers allocated to it
///
/// The bond list is kept sorted numerically for display. A record with an
/// empty bond list is legitimate and survives save/load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurnameRecord {
    pub surname: String,
    pub bonds: Vec<MkfId>,
}

impl SurnameRecord {
    /// Bond list as a display string, e.g. "MKF1, MKF3"
    pub fn bond_display(&self) -> String {
        self.bonds
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ============================================================================
// BOND REGISTRY
// ============================================================================

/// Registry of surname records plus the available pool
///
/// Records keep insertion order (file order after a load), which is also the
/// enumeration order used by `find`. The pool is a BTreeSet so it stays
/// sorted numerically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondRegistry {
    records: Vec<SurnameRecord>,
    available: BTreeSet<MkfId>,
}

impl BondRegistry {
    /// Create an empty registry with the full 900-identifier pool
    pub fn new() -> Self {
        BondRegistry {
            records: Vec::new(),
            available: MkfId::all().collect(),
        }
    }

    /// Allocate an identifier from the pool to a surname
    ///
    /// Creates the surname record if it does not exist yet. The record's
    /// bond list is re-sorted numerically after the append.
    pub fn bind(&mut self, surname: &str, id: MkfId) -> Result<(), BondError> {
        let surname = surname.trim();

        if let Some(record) = self.records.iter().find(|r| r.surname == surname) {
            if record.bonds.contains(&id) {
                return Err(BondError::AlreadyBound {
                    surname: surname.to_string(),
                    id,
                });
            }
        }

        if !self.available.remove(&id) {
            return Err(BondError::Unavailable { id });
        }

        let index = self.record_index(surname);
        let record = &mut self.records[index];
        record.bonds.push(id);
        record.bonds.sort();

        Ok(())
    }

    /// Return an identifier from a surname's bond list to the pool
    ///
    /// The record survives with an empty bond list once its last bond is
    /// removed.
    pub fn unbind(&mut self, surname: &str, id: MkfId) -> Result<(), BondError> {
        let surname = surname.trim();

        let record = match self.records.iter_mut().find(|r| r.surname == surname) {
            Some(record) => record,
            None => {
                return Err(BondError::NotBound {
                    surname: surname.to_string(),
                    id,
                })
            }
        };

        match record.bonds.iter().position(|bond| *bond == id) {
            Some(position) => {
                record.bonds.remove(position);
                self.available.insert(id);
                Ok(())
            }
            None => Err(BondError::NotBound {
                surname: surname.to_string(),
                id,
            }),
        }
    }

    /// The surname holding an identifier, if any
    ///
    /// Scans records in registry order. With the partition invariant intact
    /// there is at most one holder.
    pub fn find(&self, id: MkfId) -> Option<&str> {
        self.records
            .iter()
            .find(|record| record.bonds.contains(&id))
            .map(|record| record.surname.as_str())
    }

    /// Register a surname with an empty bond list
    ///
    /// Returns false (and changes nothing) if the trimmed surname is empty
    /// or already present.
    pub fn add_surname(&mut self, surname: &str) -> bool {
        let surname = surname.trim();
        if surname.is_empty() || self.records.iter().any(|r| r.surname == surname) {
            return false;
        }

        self.records.push(SurnameRecord {
            surname: surname.to_string(),
            bonds: Vec::new(),
        });
        true
    }

    /// All records, in registry order (for display)
    pub fn records(&self) -> &[SurnameRecord] {
        &self.records
    }

    /// Identifiers currently in the pool, in numeric order
    pub fn available(&self) -> impl Iterator<Item = MkfId> + '_ {
        self.available.iter().copied()
    }

    pub fn is_available(&self, id: MkfId) -> bool {
        self.available.contains(&id)
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn bound_count(&self) -> usize {
        POOL_SIZE as usize - self.available.len()
    }

    pub fn surname_count(&self) -> usize {
        self.records.len()
    }

    /// Check that the pool and the bond lists partition the full domain
    ///
    /// Used by tests and by debug assertions after a load. Not on the hot
    /// path of bind/unbind, which preserve the partition by construction.
    pub fn verify_partition(&self) -> Result<(), String> {
        let mut seen: BTreeSet<MkfId> = self.available.clone();

        for record in &self.records {
            for &id in &record.bonds {
                if !seen.insert(id) {
                    return Err(format!("{} appears in more than one place", id));
                }
            }
        }

        if seen.len() != POOL_SIZE as usize {
            return Err(format!(
                "pool and bond lists cover {} of {} identifiers",
                seen.len(),
                POOL_SIZE
            ));
        }

        Ok(())
    }

    /// Index of the surname's record, creating an empty record if missing
    fn record_index(&mut self, surname: &str) -> usize {
        match self.records.iter().position(|r| r.surname == surname) {
            Some(index) => index,
            None => {
                self.records.push(SurnameRecord {
                    surname: surname.to_string(),
                    bonds: Vec::new(),
                });
                self.records.len() - 1
            }
        }
    }
}

impl Default for BondRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u16) -> MkfId {
        MkfId::new(n).unwrap()
    }

    #[test]
    fn test_new_registry_has_full_pool() {
        let registry = BondRegistry::new();

        assert_eq!(registry.available_count(), POOL_SIZE as usize);
        assert_eq!(registry.bound_count(), 0);
        assert_eq!(registry.surname_count(), 0);
        assert!(registry.verify_partition().is_ok());
    }

    #[test]
    fn test_bind_moves_identifier_out_of_pool() {
        let mut registry = BondRegistry::new();

        registry.bind("Smith", id(5)).unwrap();

        assert!(!registry.is_available(id(5)));
        assert_eq!(registry.available_count(), POOL_SIZE as usize - 1);
        assert_eq!(registry.bound_count(), 1);
        assert!(registry.verify_partition().is_ok());
    }

    #[test]
    fn test_bind_creates_surname_record() {
        let mut registry = BondRegistry::new();

        registry.bind("Smith", id(5)).unwrap();

        let records = registry.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].surname, "Smith");
        assert_eq!(records[0].bonds, vec![id(5)]);
    }

    #[test]
    fn test_bind_trims_surname() {
        let mut registry = BondRegistry::new();

        registry.bind("  Smith  ", id(5)).unwrap();
        registry.bind("Smith", id(6)).unwrap();

        assert_eq!(registry.surname_count(), 1);
        assert_eq!(registry.records()[0].bonds, vec![id(5), id(6)]);
    }

    #[test]
    fn test_bind_keeps_bonds_sorted() {
        let mut registry = BondRegistry::new();

        registry.bind("Smith", id(10)).unwrap();
        registry.bind("Smith", id(2)).unwrap();
        registry.bind("Smith", id(700)).unwrap();

        assert_eq!(registry.records()[0].bonds, vec![id(2), id(10), id(700)]);
    }

    #[test]
    fn test_bind_same_identifier_twice_fails() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();

        let err = registry.bind("Smith", id(5)).unwrap_err();

        assert_eq!(
            err,
            BondError::AlreadyBound {
                surname: "Smith".to_string(),
                id: id(5),
            }
        );
        assert_eq!(registry.records()[0].bonds, vec![id(5)]);
        assert!(registry.verify_partition().is_ok());
    }

    #[test]
    fn test_bind_identifier_held_elsewhere_fails() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();

        let before = registry.clone();
        let err = registry.bind("Jones", id(5)).unwrap_err();

        assert_eq!(err, BondError::Unavailable { id: id(5) });
        assert_eq!(registry, before);
    }

    #[test]
    fn test_unbind_returns_identifier_to_pool() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();

        registry.unbind("Smith", id(5)).unwrap();

        assert!(registry.is_available(id(5)));
        assert_eq!(registry.available_count(), POOL_SIZE as usize);
        assert!(registry.verify_partition().is_ok());
    }

    #[test]
    fn test_unbind_keeps_empty_record() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();

        registry.unbind("Smith", id(5)).unwrap();

        assert_eq!(registry.surname_count(), 1);
        assert_eq!(registry.records()[0].surname, "Smith");
        assert!(registry.records()[0].bonds.is_empty());
    }

    #[test]
    fn test_unbind_not_bound_fails_without_mutation() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();
        let before = registry.clone();

        let err = registry.unbind("Smith", id(6)).unwrap_err();
        assert_eq!(
            err,
            BondError::NotBound {
                surname: "Smith".to_string(),
                id: id(6),
            }
        );

        let err = registry.unbind("Jones", id(5)).unwrap_err();
        assert_eq!(
            err,
            BondError::NotBound {
                surname: "Jones".to_string(),
                id: id(5),
            }
        );

        assert_eq!(registry, before);
    }

    #[test]
    fn test_find_returns_holder() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();
        registry.bind("Jones", id(7)).unwrap();

        assert_eq!(registry.find(id(5)), Some("Smith"));
        assert_eq!(registry.find(id(7)), Some("Jones"));
    }

    #[test]
    fn test_find_on_available_identifier_returns_none() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();

        assert_eq!(registry.find(id(6)), None);
    }

    #[test]
    fn test_add_surname() {
        let mut registry = BondRegistry::new();

        assert!(registry.add_surname("  Smith "));
        assert!(!registry.add_surname("Smith")); // duplicate
        assert!(!registry.add_surname("   ")); // empty after trim

        assert_eq!(registry.surname_count(), 1);
        assert!(registry.records()[0].bonds.is_empty());
        assert_eq!(registry.available_count(), POOL_SIZE as usize);
    }

    #[test]
    fn test_binding_all_identifiers_empties_pool() {
        let mut registry = BondRegistry::new();

        for (index, id) in MkfId::all().enumerate() {
            let surname = if index % 2 == 0 { "Smith" } else { "Jones" };
            registry.bind(surname, id).unwrap();
        }

        assert_eq!(registry.available_count(), 0);
        assert_eq!(registry.bound_count(), POOL_SIZE as usize);
        assert!(registry.verify_partition().is_ok());

        // The pool is empty, so a further bind to a third surname fails
        // with no mutation
        let before = registry.clone();
        let err = registry.bind("Garcia", id(1)).unwrap_err();
        assert_eq!(err, BondError::Unavailable { id: id(1) });
        assert_eq!(registry, before);
    }

    #[test]
    fn test_verify_partition_detects_corruption() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(5)).unwrap();

        // Force the identifier back into the pool while Smith still holds it
        registry.available.insert(id(5));

        assert!(registry.verify_partition().is_err());
    }

    #[test]
    fn test_bond_display() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(3)).unwrap();
        registry.bind("Smith", id(1)).unwrap();

        assert_eq!(registry.records()[0].bond_display(), "MKF1, MKF3");

        registry.add_surname("Jones");
        assert_eq!(registry.records()[1].bond_display(), "");
    }
}
