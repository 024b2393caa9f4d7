//! Class-file sources: directory trees and zip/jar archives.
//!
//! An archive yields a lazy, finite, non-restartable sequence of entries
//! whose names pass a filter. Each entry's bytes are read only when the
//! iterator reaches it.

use anyhow::Result;
use ignore::{Walk, WalkBuilder};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use zip::ZipArchive;

use crate::error::ScanError;

pub type EntryFilter = fn(&str) -> bool;

pub fn is_class_entry(name: &str) -> bool {
    name.ends_with(".class")
}

#[derive(Debug, Clone)]
pub struct ClassEntry {
    /// Path inside the archive, `/`-separated.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ClassEntry {
    pub fn reader(&self) -> impl Read + '_ {
        self.bytes.as_slice()
    }
}

pub struct ArchiveEntries {
    path: PathBuf,
    filter: EntryFilter,
    source: Source,
}

enum Source {
    Directory(Walk),
    Zip {
        archive: ZipArchive<Cursor<Mmap>>,
        next: usize,
    },
}

impl ArchiveEntries {
    /// Directories are walked; anything else is opened as a zip archive.
    pub fn open(path: &Path, filter: EntryFilter) -> Result<Self, ScanError> {
        let source = if path.is_dir() {
            Source::Directory(
                WalkBuilder::new(path)
                    .hidden(false)
                    .ignore(false)
                    .parents(false)
                    .git_ignore(false)
                    .git_global(false)
                    .git_exclude(false)
                    .sort_by_file_name(|a, b| a.cmp(b))
                    .build(),
            )
        } else {
            let file = File::open(path).map_err(|source| ScanError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            // SAFETY: The file is opened read-only and the map lives inside the
            // archive reader that owns it.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|source| ScanError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let archive = ZipArchive::new(Cursor::new(mmap)).map_err(|source| ScanError::Zip {
                path: path.to_path_buf(),
                source,
            })?;
            Source::Zip { archive, next: 0 }
        };

        Ok(Self {
            path: path.to_path_buf(),
            filter,
            source,
        })
    }

    fn next_from_directory(&mut self) -> Option<Result<ClassEntry, ScanError>> {
        let Source::Directory(walk) = &mut self.source else {
            return None;
        };
        for item in walk.by_ref() {
            let entry = match item {
                Ok(entry) => entry,
                Err(source) => {
                    return Some(Err(ScanError::Walk {
                        path: self.path.clone(),
                        source,
                    }));
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.path) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !(self.filter)(&name) {
                continue;
            }
            return Some(match std::fs::read(entry.path()) {
                Ok(bytes) => Ok(ClassEntry { name, bytes }),
                Err(source) => Err(ScanError::Io {
                    path: entry.path().to_path_buf(),
                    source,
                }),
            });
        }
        None
    }

    fn next_from_zip(&mut self) -> Option<Result<ClassEntry, ScanError>> {
        let Source::Zip { archive, next } = &mut self.source else {
            return None;
        };
        while *next < archive.len() {
            let index = *next;
            *next += 1;

            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(source) => {
                    return Some(Err(ScanError::Zip {
                        path: self.path.clone(),
                        source,
                    }));
                }
            };
            if entry.is_dir() || !(self.filter)(entry.name()) {
                continue;
            }

            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(capacity_hint(entry.size()));
            return Some(match entry.read_to_end(&mut bytes) {
                Ok(_) => Ok(ClassEntry { name, bytes }),
                Err(source) => Err(ScanError::Io {
                    path: self.path.join(&name),
                    source,
                }),
            });
        }
        None
    }
}

/// Preallocation for an entry of the declared uncompressed `size`. The header
/// value is untrusted, so larger entries grow while reading instead.
fn capacity_hint(size: u64) -> usize {
    const MAX_HINT: u64 = 1 << 20;
    size.min(MAX_HINT) as usize
}

impl Iterator for ArchiveEntries {
    type Item = Result<ClassEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.source {
            Source::Directory(_) => self.next_from_directory(),
            Source::Zip { .. } => self.next_from_zip(),
        }
    }
}

/// Lists every `.jar` below `base_path`, sorted.
pub fn discover_archives(base_path: &Path) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "jar") {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut jars: Vec<PathBuf> = rx.iter().collect();
    jars.sort();
    Ok(jars)
}
