//! Error types for decoding, scanning and cross-referencing.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::resolve::CrossReference;

/// A class file could not be decoded. Decoding of that one file is aborted;
/// the index is never touched.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid class file magic: 0x{0:08x}")]
    BadMagic(u32),
    #[error("truncated class file: needed {needed} byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag {tag} at index {index}")]
    InvalidConstantPoolTag { tag: u8, index: u16 },
    #[error("constant pool entry {index} is {found}, expected {expected}")]
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid modified UTF-8 in constant pool entry {0}")]
    InvalidModifiedUtf8(u16),
    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),
    #[error("failed to read class file: {0}")]
    Io(#[from] std::io::Error),
}

/// Interfaces referenced through `implements` that were never scanned,
/// keyed by implementing class.
pub type Unresolved = BTreeMap<String, BTreeSet<String>>;

/// Raised once at the end of a cross-reference pass. Every resolvable pair
/// has already been applied to the index when this is returned, and
/// `outcome` counts that work.
#[derive(Debug, Error)]
#[error("{} class(es) implement interfaces that were never scanned", .unresolved.len())]
pub struct CrossReferenceError {
    pub unresolved: Unresolved,
    pub outcome: CrossReference,
}

impl CrossReferenceError {
    pub fn unresolved(&self) -> &Unresolved {
        &self.unresolved
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved.values().map(BTreeSet::len).sum()
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read archive {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open zip archive {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to walk directory {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },
    #[error("failed to decode {entry}: {source}")]
    Decode {
        entry: String,
        #[source]
        source: DecodeError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_reference_error_counts_every_pair() {
        let mut unresolved = Unresolved::new();
        unresolved
            .entry("a.A".to_string())
            .or_default()
            .extend(["x.I".to_string(), "x.J".to_string()]);
        unresolved
            .entry("a.B".to_string())
            .or_default()
            .insert("x.I".to_string());

        let err = CrossReferenceError {
            unresolved,
            outcome: CrossReference::default(),
        };
        assert_eq!(err.unresolved_count(), 3);
        assert_eq!(
            err.to_string(),
            "2 class(es) implement interfaces that were never scanned"
        );
    }

    #[test]
    fn decode_error_messages_are_readable() {
        assert_eq!(
            DecodeError::BadMagic(0xdeadbeef).to_string(),
            "invalid class file magic: 0xdeadbeef"
        );
        assert_eq!(
            DecodeError::Truncated {
                offset: 8,
                needed: 2
            }
            .to_string(),
            "truncated class file: needed 2 byte(s) at offset 8"
        );
    }
}
