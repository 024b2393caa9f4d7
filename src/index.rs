//! The annotation index: annotation -> classes, class -> annotations and
//! class -> declared interfaces.
//!
//! The first two maps are kept as exact inverses of each other. Only
//! [`AnnotationIndex::ingest`] and the cross-reference pass mutate them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use crate::decoder::ClassDescriptor;

pub type IndexMap = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationIndex {
    pub(crate) annotations: IndexMap,
    pub(crate) classes: IndexMap,
    pub(crate) implements: IndexMap,
}

impl AnnotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one decoded class into the index.
    ///
    /// Every decoded class gets a `classes` entry, possibly empty, so a
    /// scanned class without annotations stays distinguishable from a class
    /// that was never scanned. Ingesting a class name a second time replaces
    /// its previous contribution, including memberships in `annotations`
    /// that the new scan no longer reports.
    pub fn ingest(&mut self, descriptor: &ClassDescriptor) {
        let class = descriptor.name.as_str();
        let found = descriptor.annotation_types();

        if let Some(previous) = self.classes.get(class) {
            let stale: Vec<String> = previous.difference(&found).cloned().collect();
            for annotation in stale {
                self.remove_membership(&annotation, class);
            }
        }

        for annotation in &found {
            self.annotations
                .entry(annotation.clone())
                .or_default()
                .insert(class.to_string());
        }
        self.classes.insert(class.to_string(), found);

        if descriptor.interfaces.is_empty() {
            self.implements.remove(class);
        } else {
            self.implements.insert(
                class.to_string(),
                descriptor.interfaces.iter().cloned().collect(),
            );
        }
    }

    fn remove_membership(&mut self, annotation: &str, class: &str) {
        if let Some(members) = self.annotations.get_mut(annotation) {
            members.remove(class);
            if members.is_empty() {
                self.annotations.remove(annotation);
            }
        }
    }

    /// Adds `annotations` to `class` in both directions. The class entry is
    /// created if absent. Returns how many memberships were new.
    pub(crate) fn attach(&mut self, class: &str, annotations: &BTreeSet<String>) -> usize {
        let entry = self.classes.entry(class.to_string()).or_default();
        let mut added = 0;
        for annotation in annotations {
            if entry.insert(annotation.clone()) {
                added += 1;
            }
            self.annotations
                .entry(annotation.clone())
                .or_default()
                .insert(class.to_string());
        }
        added
    }

    /// annotation type name -> classes using it anywhere.
    pub fn annotation_index(&self) -> &IndexMap {
        &self.annotations
    }

    /// class name -> annotation type names it uses. Contains every scanned
    /// class.
    pub fn class_index(&self) -> &IndexMap {
        &self.classes
    }

    /// class name -> interfaces as declared in the class file.
    pub fn implements_index(&self) -> &IndexMap {
        &self.implements
    }

    pub fn classes_annotated_with(&self, annotation: &str) -> Option<&BTreeSet<String>> {
        self.annotations.get(annotation)
    }

    /// `None` means the class was never scanned; an empty set means it was
    /// scanned and carries no annotations.
    pub fn annotations_of(&self, class: &str) -> Option<&BTreeSet<String>> {
        self.classes.get(class)
    }

    pub fn interfaces_of(&self, class: &str) -> Option<&BTreeSet<String>> {
        self.implements.get(class)
    }

    pub fn contains_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Whether `annotations` and `classes` are exact inverse relations.
    pub fn is_consistent(&self) -> bool {
        let forward = self.annotations.iter().all(|(annotation, classes)| {
            classes.iter().all(|class| {
                self.classes
                    .get(class)
                    .is_some_and(|anns| anns.contains(annotation))
            })
        });
        let backward = self.classes.iter().all(|(class, annotations)| {
            annotations.iter().all(|annotation| {
                self.annotations
                    .get(annotation)
                    .is_some_and(|classes| classes.contains(class))
            })
        });
        forward && backward
    }

    /// One line per annotation: `<annotation>: <class1>, <class2>, ...`.
    pub fn write_report<W: Write>(&self, mut out: W) -> io::Result<()> {
        for (annotation, classes) in &self.annotations {
            let joined = classes.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
            writeln!(out, "{annotation}: {joined}")?;
        }
        Ok(())
    }

    pub fn report(&self) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_report(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{AnnotationOccurrence, AnnotationSite};

    fn descriptor(name: &str, interfaces: &[&str], anns: &[(AnnotationSite, &str)]) -> ClassDescriptor {
        ClassDescriptor {
            name: name.to_string(),
            major_version: 52,
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            annotations: anns
                .iter()
                .map(|(site, t)| AnnotationOccurrence {
                    site: *site,
                    type_name: t.to_string(),
                })
                .collect(),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ingest_records_class_even_without_annotations() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor("a.Plain", &[], &[]));

        assert!(index.contains_class("a.Plain"));
        assert_eq!(index.annotations_of("a.Plain"), Some(&BTreeSet::new()));
        assert_eq!(index.annotations_of("a.Missing"), None);
        assert!(index.annotation_index().is_empty());
        assert!(index.implements_index().is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn ingest_dedupes_across_sites() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor(
            "com.example.Foo",
            &[],
            &[
                (AnnotationSite::Class, "Entity"),
                (AnnotationSite::Field, "Entity"),
            ],
        ));

        assert_eq!(index.annotations_of("com.example.Foo"), Some(&set(&["Entity"])));
        assert_eq!(index.annotation_count(), 1);
        assert_eq!(
            index.classes_annotated_with("Entity"),
            Some(&set(&["com.example.Foo"]))
        );
        assert!(index.is_consistent());
    }

    #[test]
    fn ingest_tracks_declared_interfaces() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor("a.Impl", &["a.Api", "a.Other"], &[]));
        assert_eq!(index.interfaces_of("a.Impl"), Some(&set(&["a.Api", "a.Other"])));

        index.ingest(&descriptor("a.Impl", &["a.Api"], &[]));
        assert_eq!(index.interfaces_of("a.Impl"), Some(&set(&["a.Api"])));

        index.ingest(&descriptor("a.Impl", &[], &[]));
        assert_eq!(index.interfaces_of("a.Impl"), None);
    }

    #[test]
    fn rescan_replaces_previous_contribution() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor(
            "a.A",
            &[],
            &[(AnnotationSite::Class, "X"), (AnnotationSite::Method, "Y")],
        ));
        index.ingest(&descriptor("a.B", &[], &[(AnnotationSite::Class, "Y")]));

        index.ingest(&descriptor("a.A", &[], &[(AnnotationSite::Class, "Z")]));

        assert_eq!(index.annotations_of("a.A"), Some(&set(&["Z"])));
        assert_eq!(index.classes_annotated_with("X"), None);
        assert_eq!(index.classes_annotated_with("Y"), Some(&set(&["a.B"])));
        assert_eq!(index.classes_annotated_with("Z"), Some(&set(&["a.A"])));
        assert!(index.is_consistent());
    }

    #[test]
    fn attach_creates_entries_and_counts_new_memberships() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor("a.A", &[], &[(AnnotationSite::Class, "X")]));

        assert_eq!(index.attach("a.A", &set(&["X", "Y"])), 1);
        assert_eq!(index.attach("a.A", &set(&["X", "Y"])), 0);
        assert_eq!(index.annotations_of("a.A"), Some(&set(&["X", "Y"])));
        assert!(index.is_consistent());
    }

    #[test]
    fn consistency_check_detects_one_sided_edits() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor("a.A", &[], &[(AnnotationSite::Class, "X")]));
        index
            .classes
            .get_mut("a.A")
            .unwrap()
            .insert("Y".to_string());
        assert!(!index.is_consistent());
    }

    #[test]
    fn report_lists_one_line_per_annotation() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor("a.B", &[], &[(AnnotationSite::Class, "X")]));
        index.ingest(&descriptor(
            "a.A",
            &[],
            &[(AnnotationSite::Field, "X"), (AnnotationSite::Method, "Y")],
        ));
        assert_eq!(index.report(), "X: a.A, a.B\nY: a.A\n");
    }

    #[test]
    fn serde_roundtrip_preserves_empty_entries() {
        let mut index = AnnotationIndex::new();
        index.ingest(&descriptor("a.Plain", &["a.Api"], &[]));
        let json = serde_json::to_string(&index).unwrap();
        let back: AnnotationIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
        assert!(back.contains_class("a.Plain"));
    }
}
