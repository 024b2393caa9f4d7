//! Cross-referencing of implemented interfaces.
//!
//! Annotations placed on an interface are copied onto every scanned class
//! that declares it. One pass resolves exactly one level: all additions are
//! computed from the index as it stood when the pass started, so an
//! interface that itself inherits annotations in this pass hands them on
//! only in the next one.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::error::{CrossReferenceError, Unresolved};
use crate::index::AnnotationIndex;

/// Packages whose interfaces are never expected to be scanned.
pub const PLATFORM_PACKAGES: &[&str] = &["java", "javax"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrossReference {
    /// (class, interface) pairs whose interface was found in the index.
    pub resolved: usize,
    /// Pairs skipped because the interface lives in an ignored package.
    pub ignored: usize,
    /// New class/annotation memberships added by this pass.
    pub propagated: usize,
}

/// `true` if `interface` lies in a platform package or below one of the
/// caller's `ignored` packages. `com.acme` ignores `com.acme.Api` and
/// `com.acme.sub.Api` but not `com.acmeco.Api`.
pub fn is_excluded<S: AsRef<str>>(interface: &str, ignored: &[S]) -> bool {
    let under = |package: &str| {
        let package = package.trim_end_matches('.');
        !package.is_empty()
            && interface
                .strip_prefix(package)
                .is_some_and(|rest| rest.starts_with('.'))
    };
    PLATFORM_PACKAGES.iter().any(|p| under(*p)) || ignored.iter().any(|p| under(p.as_ref()))
}

impl AnnotationIndex {
    /// Propagates each interface's indexed annotations onto the classes
    /// implementing it.
    ///
    /// Fails at the end, never early: every resolvable pair is applied
    /// first, then any interface without a scanned class file is reported
    /// through [`CrossReferenceError`]. The index keeps those updates either
    /// way.
    pub fn cross_reference<S: AsRef<str>>(
        &mut self,
        ignored_packages: &[S],
    ) -> Result<CrossReference, CrossReferenceError> {
        let mut outcome = CrossReference::default();
        let mut unresolved = Unresolved::new();
        let mut pending: Vec<(String, BTreeSet<String>)> = Vec::new();

        for (class, interfaces) in &self.implements {
            for interface in interfaces {
                if is_excluded(interface, ignored_packages) {
                    outcome.ignored += 1;
                    continue;
                }
                match self.classes.get(interface) {
                    Some(annotations) => {
                        outcome.resolved += 1;
                        if !annotations.is_empty() {
                            pending.push((class.clone(), annotations.clone()));
                        }
                    }
                    None => {
                        debug!(class = %class, interface = %interface, "interface not scanned");
                        unresolved
                            .entry(class.clone())
                            .or_default()
                            .insert(interface.clone());
                    }
                }
            }
        }

        for (class, annotations) in &pending {
            outcome.propagated += self.attach(class, annotations);
        }
        debug_assert!(self.is_consistent());

        if unresolved.is_empty() {
            info!(
                resolved = outcome.resolved,
                propagated = outcome.propagated,
                "cross-referenced implemented interfaces"
            );
            return Ok(outcome);
        }

        let err = CrossReferenceError { unresolved, outcome };
        warn!(
            classes = err.unresolved.len(),
            interfaces = err.unresolved_count(),
            resolved = outcome.resolved,
            propagated = outcome.propagated,
            "cross-reference left interfaces unresolved"
        );
        Err(err)
    }

    /// Runs up to `depth` passes, stopping early once a pass adds nothing.
    /// `propagated` is summed over all passes; `resolved`, `ignored` and the
    /// unresolved interfaces come from the last pass run.
    pub fn cross_reference_depth<S: AsRef<str>>(
        &mut self,
        ignored_packages: &[S],
        depth: usize,
    ) -> Result<CrossReference, CrossReferenceError> {
        let mut total = CrossReference::default();
        let mut last = Ok(());
        for _ in 0..depth.max(1) {
            let (pass, result) = match self.cross_reference(ignored_packages) {
                Ok(pass) => (pass, Ok(())),
                Err(err) => (err.outcome, Err(err.unresolved)),
            };
            total.propagated += pass.propagated;
            total.resolved = pass.resolved;
            total.ignored = pass.ignored;
            last = result;
            if pass.propagated == 0 {
                break;
            }
        }

        match last {
            Ok(()) => Ok(total),
            Err(unresolved) => Err(CrossReferenceError {
                unresolved,
                outcome: total,
            }),
        }
    }
}
