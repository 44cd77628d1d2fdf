//! Field-level diff between a stored content record and a patch.
//!
//! A [`ContentPatch`] carries every updatable field as an `Option`:
//!
//! - `None`: no change requested. Never reported as a difference.
//! - `Some` with an empty value (`""` or an empty set): clear the field.
//! - `Some` with any other value: set the field.
//!
//! A stored field that is absent (null, missing, `""`, `[]`) compares
//! equal to an explicit empty value, so clearing an already-empty field is
//! not a change. Text is compared verbatim; sets by membership.
//!
//! [`diff`] returns a [`DiffResult`] whose [`into_patch`](DiffResult::into_patch)
//! is the minimal write. An empty result means the write can be skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::models::{AutomationLevel, ContentType, FkField, Record, Status, StoredContent};
use crate::resolve::ResolvedRecord;

/// A comparable field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Set(BTreeSet<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Set(s) => s.is_empty(),
            FieldValue::Integer(_) | FieldValue::Bool(_) => false,
        }
    }

    /// Store representation. Cleared text becomes `null` so relation
    /// columns never hold an empty id.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) if s.is_empty() => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Set(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Set(items) => {
                let items: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

fn text(value: &Option<String>) -> Option<FieldValue> {
    value.as_ref().map(|s| FieldValue::Text(s.clone()))
}

/// Old and new value of one changed field. `old` is `None` when the stored
/// field was absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub old: Option<FieldValue>,
    pub new: FieldValue,
}

/// Changed fields, keyed by store field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DiffResult {
    pub changes: BTreeMap<String, FieldChange>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    /// The store payload holding only the changed fields.
    pub fn into_patch(self) -> Record {
        self.changes
            .into_iter()
            .map(|(field, change)| (field, change.new.to_json()))
            .collect()
    }
}

/// Requested changes to a content record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub content_type: Option<ContentType>,
    pub status: Option<Status>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub github: Option<String>,
    pub documentation_url: Option<String>,
    pub reference_url: Option<String>,
    pub readme_url: Option<String>,
    pub readme_markdown: Option<String>,
    pub control_count: Option<i64>,
    pub stig_id: Option<String>,
    pub benchmark_version: Option<String>,
    pub license: Option<String>,
    pub automation_level: Option<AutomationLevel>,
    pub is_featured: Option<bool>,
    pub featured_order: Option<i64>,
    pub vendor: Option<String>,
    pub standard: Option<String>,
    pub technology: Option<String>,
    pub target: Option<String>,
    pub maintainer: Option<String>,
    pub tags: Option<BTreeSet<String>>,
}

impl ContentPatch {
    /// Every field a resolved candidate carries. Unset candidate fields
    /// stay `None`; an empty tag set is not a request to clear tags.
    pub fn from_resolved(resolved: &ResolvedRecord) -> Self {
        let c = &resolved.record;
        let reference = |field: FkField| c.references.get(&field).cloned();
        Self {
            name: Some(c.name.clone()),
            slug: Some(c.slug.clone()),
            content_type: Some(c.content_type),
            status: Some(c.status),
            version: c.version.clone(),
            description: c.description.clone(),
            long_description: c.long_description.clone(),
            github: c.github.clone(),
            documentation_url: c.documentation_url.clone(),
            reference_url: c.reference_url.clone(),
            readme_url: c.readme_url.clone(),
            readme_markdown: c.readme_markdown.clone(),
            control_count: c.control_count,
            stig_id: c.stig_id.clone(),
            benchmark_version: c.benchmark_version.clone(),
            license: c.license.clone(),
            automation_level: c.automation_level,
            is_featured: None,
            featured_order: None,
            vendor: reference(FkField::Vendor),
            standard: reference(FkField::Standard),
            technology: reference(FkField::Technology),
            target: reference(FkField::Target),
            maintainer: reference(FkField::Maintainer),
            tags: if c.tags.is_empty() {
                None
            } else {
                Some(c.tags.clone())
            },
        }
    }

    /// Requested values in store field order, skipping `None`.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let candidates: [(&'static str, Option<FieldValue>); 25] = [
            ("name", text(&self.name)),
            ("slug", text(&self.slug)),
            (
                "content_type",
                self.content_type.map(|v| FieldValue::Text(v.as_str().to_string())),
            ),
            ("status", self.status.map(|v| FieldValue::Text(v.as_str().to_string()))),
            ("version", text(&self.version)),
            ("description", text(&self.description)),
            ("long_description", text(&self.long_description)),
            ("github", text(&self.github)),
            ("documentation_url", text(&self.documentation_url)),
            ("reference_url", text(&self.reference_url)),
            ("readme_url", text(&self.readme_url)),
            ("readme_markdown", text(&self.readme_markdown)),
            ("control_count", self.control_count.map(FieldValue::Integer)),
            ("stig_id", text(&self.stig_id)),
            ("benchmark_version", text(&self.benchmark_version)),
            ("license", text(&self.license)),
            (
                "automation_level",
                self.automation_level.map(|v| FieldValue::Text(v.as_str().to_string())),
            ),
            ("is_featured", self.is_featured.map(FieldValue::Bool)),
            ("featured_order", self.featured_order.map(FieldValue::Integer)),
            ("vendor", text(&self.vendor)),
            ("standard", text(&self.standard)),
            ("technology", text(&self.technology)),
            ("target", text(&self.target)),
            ("maintainer", text(&self.maintainer)),
            ("tags", self.tags.clone().map(FieldValue::Set)),
        ];
        candidates
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// The full store payload for creating a record.
    pub fn to_record(&self) -> Record {
        self.fields()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}

/// The stored value of a field, or `None` when absent or empty.
fn stored_value(existing: &StoredContent, field: &str) -> Option<FieldValue> {
    let value = match field {
        "name" => Some(FieldValue::Text(existing.name.clone())),
        "slug" => Some(FieldValue::Text(existing.slug.clone())),
        "content_type" => Some(FieldValue::Text(existing.content_type.clone())),
        "status" => Some(FieldValue::Text(existing.status.clone())),
        "version" => text(&existing.version),
        "description" => text(&existing.description),
        "long_description" => text(&existing.long_description),
        "github" => text(&existing.github),
        "documentation_url" => text(&existing.documentation_url),
        "reference_url" => text(&existing.reference_url),
        "readme_url" => text(&existing.readme_url),
        "readme_markdown" => text(&existing.readme_markdown),
        "control_count" => existing.control_count.map(FieldValue::Integer),
        "stig_id" => text(&existing.stig_id),
        "benchmark_version" => text(&existing.benchmark_version),
        "license" => text(&existing.license),
        "automation_level" => text(&existing.automation_level),
        "is_featured" => existing.is_featured.map(FieldValue::Bool),
        "featured_order" => existing.featured_order.map(FieldValue::Integer),
        "vendor" => text(&existing.vendor),
        "standard" => text(&existing.standard),
        "technology" => text(&existing.technology),
        "target" => text(&existing.target),
        "maintainer" => text(&existing.maintainer),
        "tags" => Some(FieldValue::Set(existing.tags.iter().cloned().collect())),
        _ => None,
    };
    value.filter(|v| !v.is_empty())
}

/// Compare `patch` against `existing`, returning only the fields that
/// would change.
pub fn diff(existing: &StoredContent, patch: &ContentPatch) -> DiffResult {
    let mut result = DiffResult::default();
    for (field, new) in patch.fields() {
        let old = stored_value(existing, field);
        let unchanged = match &old {
            Some(old) => *old == new,
            None => new.is_empty(),
        };
        if !unchanged {
            result
                .changes
                .insert(field.to_string(), FieldChange { old, new });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;
    use serde_json::json;

    fn stored() -> StoredContent {
        StoredContent {
            id: "c1".into(),
            name: "RHEL 9 STIG".into(),
            slug: "rhel-9-stig".into(),
            content_type: "validation".into(),
            status: "active".into(),
            version: Some("1.2.0".into()),
            description: Some("Validates RHEL 9".into()),
            control_count: Some(450),
            vendor: Some("org_1".into()),
            tags: vec!["t1".into(), "t2".into()],
            ..StoredContent::default()
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_is_empty() {
        let patch = ContentPatch {
            name: Some("RHEL 9 STIG".into()),
            slug: Some("rhel-9-stig".into()),
            content_type: Some(ContentType::Validation),
            status: Some(Status::Active),
            version: Some("1.2.0".into()),
            description: Some("Validates RHEL 9".into()),
            control_count: Some(450),
            vendor: Some("org_1".into()),
            tags: Some(set(&["t1", "t2"])),
            ..ContentPatch::default()
        };
        assert!(diff(&stored(), &patch).is_empty());
    }

    #[test]
    fn test_reordered_tags_are_unchanged() {
        let mut existing = stored();
        existing.tags = vec!["t2".into(), "t1".into()];
        let patch = ContentPatch {
            tags: Some(set(&["t1", "t2"])),
            ..ContentPatch::default()
        };
        assert!(diff(&existing, &patch).get("tags").is_none());
    }

    #[test]
    fn test_tag_membership_change() {
        let patch = ContentPatch {
            tags: Some(set(&["t1", "t3"])),
            ..ContentPatch::default()
        };
        let result = diff(&stored(), &patch);
        assert_eq!(result.get("tags").unwrap().new, FieldValue::Set(set(&["t1", "t3"])));
    }

    #[test]
    fn test_none_is_never_a_change() {
        assert!(diff(&stored(), &ContentPatch::default()).is_empty());
    }

    #[test]
    fn test_text_comparison_is_case_sensitive() {
        let patch = ContentPatch {
            name: Some("rhel 9 stig".into()),
            version: Some("1.3.0".into()),
            ..ContentPatch::default()
        };
        let result = diff(&stored(), &patch);
        assert_eq!(result.len(), 2);
        let change = result.get("version").unwrap();
        assert_eq!(change.old, Some(FieldValue::Text("1.2.0".into())));
        assert_eq!(change.new, FieldValue::Text("1.3.0".into()));
    }

    #[test]
    fn test_explicit_empty_clears() {
        let patch = ContentPatch {
            description: Some(String::new()),
            vendor: Some(String::new()),
            tags: Some(BTreeSet::new()),
            ..ContentPatch::default()
        };
        let payload = diff(&stored(), &patch).into_patch();
        assert_eq!(payload["description"], Value::Null);
        assert_eq!(payload["vendor"], Value::Null);
        assert_eq!(payload["tags"], json!([]));
    }

    #[test]
    fn test_clearing_absent_field_is_unchanged() {
        let patch = ContentPatch {
            license: Some(String::new()),
            standard: Some(String::new()),
            ..ContentPatch::default()
        };
        assert!(diff(&stored(), &patch).is_empty());
    }

    #[test]
    fn test_stig_fields_are_compared() {
        let mut existing = stored();
        existing.benchmark_version = Some("V1R2".into());
        let patch = ContentPatch {
            stig_id: Some("RHEL-09-010001".into()),
            benchmark_version: Some("V1R3".into()),
            ..ContentPatch::default()
        };
        let result = diff(&existing, &patch);
        assert_eq!(result.get("stig_id").unwrap().old, None);
        assert_eq!(
            result.get("benchmark_version").unwrap().old,
            Some(FieldValue::Text("V1R2".into()))
        );
        let payload = result.into_patch();
        assert_eq!(payload["stig_id"], "RHEL-09-010001");
        assert_eq!(payload["benchmark_version"], "V1R3");
    }

    #[test]
    fn test_into_patch_holds_only_changes() {
        let patch = ContentPatch {
            name: Some("RHEL 9 STIG".into()),
            control_count: Some(460),
            ..ContentPatch::default()
        };
        let payload = diff(&stored(), &patch).into_patch();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["control_count"], 460);
    }

    #[test]
    fn test_from_resolved_and_to_record() {
        let mut candidate = CandidateRecord::new("Tool", "tool-stig", ContentType::Hardening);
        candidate.references.insert(FkField::Target, "tgt_1".into());
        candidate.version = Some("2.0.0".into());
        let resolved = ResolvedRecord {
            record: candidate,
            unresolved: BTreeSet::new(),
        };
        let patch = ContentPatch::from_resolved(&resolved);
        assert_eq!(patch.target.as_deref(), Some("tgt_1"));
        assert!(patch.tags.is_none());
        assert!(patch.description.is_none());

        let record = patch.to_record();
        assert_eq!(record["content_type"], "hardening");
        assert_eq!(record["status"], "active");
        assert_eq!(record["target"], "tgt_1");
        assert!(!record.contains_key("description"));
    }
}
