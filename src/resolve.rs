//! Foreign-key resolution.
//!
//! [`resolve`] replaces the human-readable reference names on a
//! [`CandidateRecord`] with record ids from the [`LookupMaps`]. A name that
//! does not resolve is dropped from the output and recorded as an
//! [`UnresolvedReference`]; resolution itself never fails. Callers must
//! check [`check_unresolved_fks`] before persisting.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::lookup::LookupMaps;
use crate::models::{CandidateRecord, LookupCategory};

/// A reference name that had no match in its lookup map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnresolvedReference {
    /// Field name (`vendor`, `target`, ..., or `tags`).
    pub field: String,
    pub name: String,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not resolve {}: \"{}\"", self.field, self.name)
    }
}

/// A candidate whose references and tags now hold ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRecord {
    pub record: CandidateRecord,
    pub unresolved: BTreeSet<UnresolvedReference>,
}

impl ResolvedRecord {
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Distinct names of fields with at least one unresolved reference.
    pub fn unresolved_fields(&self) -> BTreeSet<&str> {
        self.unresolved.iter().map(|u| u.field.as_str()).collect()
    }
}

/// Resolve every FK name and tag name on `candidate`.
pub fn resolve(candidate: &CandidateRecord, maps: &LookupMaps) -> ResolvedRecord {
    let mut record = candidate.clone();
    let mut unresolved = BTreeSet::new();

    record.references.clear();
    for (field, name) in &candidate.references {
        if name.trim().is_empty() {
            continue;
        }
        match maps.resolve(field.category(), name) {
            Some(id) => {
                record.references.insert(*field, id.to_string());
            }
            None => {
                unresolved.insert(UnresolvedReference {
                    field: field.as_str().to_string(),
                    name: name.clone(),
                });
            }
        }
    }

    record.tags.clear();
    for name in &candidate.tags {
        match maps.resolve(LookupCategory::Tags, name) {
            Some(id) => {
                record.tags.insert(id.to_string());
            }
            None => {
                unresolved.insert(UnresolvedReference {
                    field: "tags".to_string(),
                    name: name.clone(),
                });
            }
        }
    }

    ResolvedRecord { record, unresolved }
}

/// Human-readable warnings for every unresolved reference.
pub fn check_unresolved_fks(resolved: &ResolvedRecord) -> Vec<String> {
    resolved.unresolved.iter().map(ToString::to_string).collect()
}
