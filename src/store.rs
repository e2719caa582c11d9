// 💾 Bond Store - line-oriented persistence for the registry
//
// One record per line:
//
//   Surname: Smith - Bonds: MKF1, MKF3
//   Surname: Jones - Bonds:
//
// A line with no " - Bonds:" separator is a surname with an empty bond
// list. Malformed lines are skipped with a warning, never a hard failure;
// the available pool is recomputed from whatever loaded.

use crate::identifier::MkfId;
use crate::registry::{BondRegistry, SurnameRecord};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File used when no path argument and no environment override is given
pub const DEFAULT_FILE: &str = "MKFBonds.txt";

/// Environment variable overriding the bond file location
pub const FILE_ENV_VAR: &str = "MKF_BONDS_FILE";

const SURNAME_PREFIX: &str = "Surname:";
const BONDS_SEPARATOR: &str = " - Bonds:";

/// Resolve the bond file path from the environment, falling back to
/// [`DEFAULT_FILE`] in the working directory
pub fn default_path() -> PathBuf {
    std::env::var_os(FILE_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE))
}

// ============================================================================
// ERRORS & WARNINGS
// ============================================================================

/// File-level failure. The caller's in-memory state is untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a line (or one token of a line) was rejected during load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// Line does not start with "Surname:"
    MissingPrefix,
    /// Surname is empty after trimming
    EmptySurname,
    /// Token is not a valid MKF identifier
    InvalidIdentifier(String),
    /// Identifier already bound earlier in the file; the later occurrence
    /// is dropped so the partition invariant holds after every load
    DuplicateIdentifier(MkfId),
    /// Surname already appeared on an earlier line; the whole line is
    /// dropped
    DuplicateSurname(String),
}

/// A non-fatal problem found while loading, with its 1-based line number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line: usize,
    pub kind: WarningKind,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WarningKind::MissingPrefix => {
                write!(f, "line {}: no \"Surname:\" prefix, line skipped", self.line)
            }
            WarningKind::EmptySurname => {
                write!(f, "line {}: empty surname, line skipped", self.line)
            }
            WarningKind::InvalidIdentifier(token) => {
                write!(
                    f,
                    "line {}: {:?} is not an MKF identifier, token skipped",
                    self.line, token
                )
            }
            WarningKind::DuplicateIdentifier(id) => {
                write!(
                    f,
                    "line {}: {} is already bound, token skipped",
                    self.line, id
                )
            }
            WarningKind::DuplicateSurname(surname) => {
                write!(
                    f,
                    "line {}: surname {:?} appears twice, line skipped",
                    self.line, surname
                )
            }
        }
    }
}

/// A freshly loaded registry plus whatever was rejected on the way in
#[derive(Debug)]
pub struct LoadOutcome {
    pub registry: BondRegistry,
    pub warnings: Vec<ParseWarning>,
}

// ============================================================================
// READ
// ============================================================================

/// Parse persisted lines into a fresh registry
///
/// The available pool comes out as the full domain minus everything bound
/// by the accepted lines. Duplicate bindings are rejected (warned) rather
/// than silently assigned to one of the claimants.
pub fn read_registry<R: BufRead>(reader: R) -> io::Result<LoadOutcome> {
    let mut registry = BondRegistry::new();
    let mut warnings = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;

        let content = line.trim_end_matches('\r').trim_start();
        if content.is_empty() {
            continue;
        }

        let rest = match content.strip_prefix(SURNAME_PREFIX) {
            Some(rest) => rest,
            None => {
                warnings.push(ParseWarning {
                    line: line_number,
                    kind: WarningKind::MissingPrefix,
                });
                continue;
            }
        };

        let (name_part, bonds_part) = match rest.split_once(BONDS_SEPARATOR) {
            Some((name, bonds)) => (name, Some(bonds)),
            None => (rest, None),
        };

        let surname = name_part.trim();
        if surname.is_empty() {
            warnings.push(ParseWarning {
                line: line_number,
                kind: WarningKind::EmptySurname,
            });
            continue;
        }

        if !registry.add_surname(surname) {
            warnings.push(ParseWarning {
                line: line_number,
                kind: WarningKind::DuplicateSurname(surname.to_string()),
            });
            continue;
        }

        let bonds = match bonds_part {
            Some(bonds) => bonds,
            None => continue, // bare "Surname: <name>" line, empty bond list
        };

        for token in bonds.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            match token.parse::<MkfId>() {
                Ok(id) => {
                    if registry.bind(surname, id).is_err() {
                        warnings.push(ParseWarning {
                            line: line_number,
                            kind: WarningKind::DuplicateIdentifier(id),
                        });
                    }
                }
                Err(_) => {
                    warnings.push(ParseWarning {
                        line: line_number,
                        kind: WarningKind::InvalidIdentifier(token.to_string()),
                    });
                }
            }
        }
    }

    debug_assert!(registry.verify_partition().is_ok());

    Ok(LoadOutcome { registry, warnings })
}

/// Load the registry from a file
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<LoadOutcome, StoreError> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    read_registry(BufReader::new(file)).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// WRITE
// ============================================================================

/// Serialize every record, one line per surname, empty bond lists included
pub fn write_registry<W: Write>(mut writer: W, registry: &BondRegistry) -> io::Result<()> {
    for record in registry.records() {
        writeln!(
            writer,
            "{} {}{} {}",
            SURNAME_PREFIX,
            record.surname,
            BONDS_SEPARATOR,
            record.bond_display()
        )?;
    }
    Ok(())
}

/// Save the registry to a file
pub fn save_file<P: AsRef<Path>>(path: P, registry: &BondRegistry) -> Result<(), StoreError> {
    let path = path.as_ref();

    let file = File::create(path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = BufWriter::new(file);
    write_registry(&mut writer, registry).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// JSON EXPORT
// ============================================================================

/// Registry snapshot for the `export` mode
#[derive(Debug, Serialize)]
pub struct RegistryExport<'a> {
    pub surnames: &'a [SurnameRecord],
    pub available: Vec<MkfId>,
    pub available_count: usize,
    pub bound_count: usize,
}

/// Serialize the registry (records plus derived pool) as pretty JSON
pub fn export_json<W: Write>(writer: W, registry: &BondRegistry) -> serde_json::Result<()> {
    let export = RegistryExport {
        surnames: registry.records(),
        available: registry.available().collect(),
        available_count: registry.available_count(),
        bound_count: registry.bound_count(),
    };
    serde_json::to_writer_pretty(writer, &export)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::POOL_SIZE;

    fn id(n: u16) -> MkfId {
        MkfId::new(n).unwrap()
    }

    fn load_str(input: &str) -> LoadOutcome {
        read_registry(input.as_bytes()).unwrap()
    }

    #[test]
    fn test_load_smith_jones_example() {
        let outcome = load_str("Surname: Smith - Bonds: MKF3, MKF1\nSurname: Jones - Bonds: \n");

        assert!(outcome.warnings.is_empty());

        let registry = &outcome.registry;
        assert_eq!(registry.available_count(), POOL_SIZE as usize - 2);
        assert!(!registry.is_available(id(1)));
        assert!(!registry.is_available(id(3)));

        let records = registry.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].surname, "Smith");
        assert_eq!(records[0].bonds, vec![id(1), id(3)]); // re-sorted numerically
        assert_eq!(records[1].surname, "Jones");
        assert!(records[1].bonds.is_empty());

        assert_eq!(registry.find(id(3)), Some("Smith"));
        assert_eq!(registry.find(id(2)), None);
    }

    #[test]
    fn test_load_bare_surname_line() {
        // No " - Bonds:" separator at all
        let outcome = load_str("Surname: Jones\n");

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.registry.surname_count(), 1);
        assert!(outcome.registry.records()[0].bonds.is_empty());
        assert_eq!(outcome.registry.available_count(), POOL_SIZE as usize);
    }

    #[test]
    fn test_load_trims_surname_whitespace() {
        let outcome = load_str("Surname:    Smith   - Bonds: MKF2\n");

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.registry.records()[0].surname, "Smith");
    }

    #[test]
    fn test_load_skips_malformed_line_and_continues() {
        let outcome = load_str("not a record\nSurname: Smith - Bonds: MKF2\n");

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0],
            ParseWarning {
                line: 1,
                kind: WarningKind::MissingPrefix,
            }
        );
        assert_eq!(outcome.registry.find(id(2)), Some("Smith"));
    }

    #[test]
    fn test_load_skips_invalid_identifier_token() {
        let outcome = load_str("Surname: Smith - Bonds: MKF2, MKF901, banana\n");

        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(
            outcome.warnings[0].kind,
            WarningKind::InvalidIdentifier("MKF901".to_string())
        );
        assert_eq!(
            outcome.warnings[1].kind,
            WarningKind::InvalidIdentifier("banana".to_string())
        );
        assert_eq!(outcome.registry.records()[0].bonds, vec![id(2)]);
    }

    #[test]
    fn test_load_rejects_duplicate_identifier_across_surnames() {
        let outcome =
            load_str("Surname: Smith - Bonds: MKF2\nSurname: Jones - Bonds: MKF2, MKF3\n");

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0],
            ParseWarning {
                line: 2,
                kind: WarningKind::DuplicateIdentifier(id(2)),
            }
        );

        // First claimant keeps the identifier; the partition stays intact
        assert_eq!(outcome.registry.find(id(2)), Some("Smith"));
        assert_eq!(outcome.registry.records()[1].bonds, vec![id(3)]);
        assert!(outcome.registry.verify_partition().is_ok());
    }

    #[test]
    fn test_load_rejects_duplicate_surname_line() {
        let outcome =
            load_str("Surname: Smith - Bonds: MKF2\nSurname: Smith - Bonds: MKF3\n");

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0],
            ParseWarning {
                line: 2,
                kind: WarningKind::DuplicateSurname("Smith".to_string()),
            }
        );
        assert_eq!(outcome.registry.records()[0].bonds, vec![id(2)]);
        assert!(outcome.registry.is_available(id(3)));
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let outcome = load_str("\n\nSurname: Smith - Bonds: MKF2\n\n");

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.registry.surname_count(), 1);
    }

    #[test]
    fn test_load_tolerates_crlf() {
        let outcome = load_str("Surname: Smith - Bonds: MKF2\r\nSurname: Jones - Bonds: \r\n");

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.registry.surname_count(), 2);
        assert_eq!(outcome.registry.find(id(2)), Some("Smith"));
    }

    #[test]
    fn test_write_format() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(3)).unwrap();
        registry.bind("Smith", id(1)).unwrap();
        registry.add_surname("Jones");

        let mut buffer = Vec::new();
        write_registry(&mut buffer, &registry).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "Surname: Smith - Bonds: MKF1, MKF3\nSurname: Jones - Bonds: \n"
        );
    }

    #[test]
    fn test_round_trip() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(3)).unwrap();
        registry.bind("Smith", id(1)).unwrap();
        registry.bind("Garcia", id(900)).unwrap();
        registry.add_surname("Jones");

        let mut buffer = Vec::new();
        write_registry(&mut buffer, &registry).unwrap();
        let outcome = read_registry(&buffer[..]).unwrap();

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.registry, registry);
    }

    #[test]
    fn test_load_file_missing_path() {
        let err = load_file("definitely/not/here/MKFBonds.txt").unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MKFBonds.txt");

        let mut registry = BondRegistry::new();
        registry.bind("Kowalski", id(42)).unwrap();

        save_file(&path, &registry).unwrap();
        let outcome = load_file(&path).unwrap();

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.registry, registry);
    }

    #[test]
    fn test_export_json_shape() {
        let mut registry = BondRegistry::new();
        registry.bind("Smith", id(1)).unwrap();

        let mut buffer = Vec::new();
        export_json(&mut buffer, &registry).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["surnames"][0]["surname"], "Smith");
        assert_eq!(value["surnames"][0]["bonds"][0], "MKF1");
        assert_eq!(value["bound_count"], 1);
        assert_eq!(value["available_count"], POOL_SIZE as u64 - 1);
    }
}
