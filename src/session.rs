//! A scanning session: decode every class an archive yields and fold it
//! into one index.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveEntries, ClassEntry, is_class_entry};
use crate::decoder::{self, ClassDescriptor, ScanOptions};
use crate::error::{CrossReferenceError, DecodeError, ScanError};
use crate::index::AnnotationIndex;
use crate::resolve::CrossReference;

/// What to do when a single entry cannot be read or decoded. Classes already
/// ingested stay in the index either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub options: ScanOptions,
    pub on_entry_error: FailurePolicy,
    /// Decode the entries of each archive on the rayon pool. Ingestion stays
    /// sequential and in entry order.
    pub parallel: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedEntry {
    pub archive: String,
    pub entry: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub archives: usize,
    pub entries: usize,
    pub indexed: usize,
    pub failed: Vec<FailedEntry>,
}

impl ScanSummary {
    fn merge(&mut self, other: ScanSummary) {
        self.archives += other.archives;
        self.entries += other.entries;
        self.indexed += other.indexed;
        self.failed.extend(other.failed);
    }
}

#[derive(Debug, Default)]
pub struct ScanSession {
    config: SessionConfig,
    index: AnnotationIndex,
}

impl ScanSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            index: AnnotationIndex::new(),
        }
    }

    /// Continues scanning into an existing index, e.g. one loaded from a
    /// store.
    pub fn with_index(config: SessionConfig, index: AnnotationIndex) -> Self {
        Self { config, index }
    }

    pub fn set_options(&mut self, options: ScanOptions) {
        self.config.options = options;
    }

    pub fn index(&self) -> &AnnotationIndex {
        &self.index
    }

    pub fn into_index(self) -> AnnotationIndex {
        self.index
    }

    /// Decodes one class file stream and ingests it. The stream is consumed.
    /// On error the index is left untouched.
    pub fn scan_class<R: Read>(&mut self, input: R) -> Result<String, DecodeError> {
        let descriptor = decoder::decode_from(input, &self.config.options)?;
        self.ingest(&descriptor);
        Ok(descriptor.name)
    }

    fn ingest(&mut self, descriptor: &ClassDescriptor) {
        debug!(
            class = %descriptor.name,
            version = descriptor.major_version,
            annotations = descriptor.annotations.len(),
            interfaces = descriptor.interfaces.len(),
            "indexing class"
        );
        self.index.ingest(descriptor);
    }

    pub fn scan_archive(&mut self, path: &Path) -> Result<ScanSummary, ScanError> {
        let entries = ArchiveEntries::open(path, is_class_entry)?;
        self.scan_entries(&path.display().to_string(), entries)
    }

    pub fn scan_archives(&mut self, paths: &[PathBuf]) -> Result<ScanSummary, ScanError> {
        let mut summary = ScanSummary::default();
        for path in paths {
            summary.merge(self.scan_archive(path)?);
        }
        Ok(summary)
    }

    /// Decodes and ingests every entry of one source, labelled `archive` in
    /// the summary.
    pub fn scan_entries<I>(&mut self, archive: &str, entries: I) -> Result<ScanSummary, ScanError>
    where
        I: IntoIterator<Item = Result<ClassEntry, ScanError>>,
    {
        let mut summary = ScanSummary {
            archives: 1,
            ..ScanSummary::default()
        };
        let options = self.config.options;

        if self.config.parallel {
            let entries: Vec<_> = entries.into_iter().collect();
            let decoded: Vec<_> = entries
                .into_par_iter()
                .map(|item| decode_entry(item, &options))
                .collect();
            for (name, result) in decoded {
                self.absorb(archive, name, result, &mut summary)?;
            }
        } else {
            for item in entries {
                let (name, result) = decode_entry(item, &options);
                self.absorb(archive, name, result, &mut summary)?;
            }
        }

        info!(
            archive,
            entries = summary.entries,
            indexed = summary.indexed,
            failed = summary.failed.len(),
            "scanned archive"
        );
        Ok(summary)
    }

    fn absorb(
        &mut self,
        archive: &str,
        name: Option<String>,
        result: Result<ClassDescriptor, ScanError>,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        summary.entries += 1;
        match result {
            Ok(descriptor) => {
                self.ingest(&descriptor);
                summary.indexed += 1;
                Ok(())
            }
            Err(err) => match self.config.on_entry_error {
                FailurePolicy::Abort => Err(err),
                FailurePolicy::Continue => {
                    warn!(archive, error = %err, "skipping entry");
                    summary.failed.push(FailedEntry {
                        archive: archive.to_string(),
                        entry: name,
                        error: err.to_string(),
                    });
                    Ok(())
                }
            },
        }
    }

    pub fn cross_reference<S: AsRef<str>>(
        &mut self,
        ignored_packages: &[S],
    ) -> Result<CrossReference, CrossReferenceError> {
        self.index.cross_reference(ignored_packages)
    }

    pub fn cross_reference_depth<S: AsRef<str>>(
        &mut self,
        ignored_packages: &[S],
        depth: usize,
    ) -> Result<CrossReference, CrossReferenceError> {
        self.index.cross_reference_depth(ignored_packages, depth)
    }
}

fn decode_entry(
    item: Result<ClassEntry, ScanError>,
    options: &ScanOptions,
) -> (Option<String>, Result<ClassDescriptor, ScanError>) {
    match item {
        Ok(entry) => {
            let result = decoder::decode_from(entry.reader(), options).map_err(|source| {
                ScanError::Decode {
                    entry: entry.name.clone(),
                    source,
                }
            });
            (Some(entry.name), result)
        }
        Err(err) => (None, Err(err)),
    }
}
