//! `saf db` commands: backend status, lookup listings, integrity
//! validation, and the slug convention audit.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::lookup::{load_lookup_maps, ReferenceIndex};
use crate::models::{FkField, LookupCategory, Record};
use crate::output::{cell, CommandFailure, OutputFormat};
use crate::store::RecordStore;
use crate::validation::{audit_slug, suggest_slug, validate_slug, validate_version_prefix, SlugAudit};

/// Collections reported by `db status`.
const STATUS_COLLECTIONS: [&str; 8] = [
    "content",
    "organizations",
    "standards",
    "technologies",
    "targets",
    "teams",
    "tags",
    "tools",
];

#[derive(Debug, Clone, Serialize)]
pub struct CollectionCount {
    pub collection: String,
    /// `None` when the count query failed.
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbStatus {
    pub backend: String,
    pub healthy: bool,
    pub collections: Vec<CollectionCount>,
}

/// Check the backend and count records per collection. A failed count is
/// reported, not fatal.
pub async fn db_status(store: &dyn RecordStore) -> DbStatus {
    let healthy = match store.health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, backend = store.backend(), "health check failed");
            false
        }
    };

    let mut collections = Vec::with_capacity(STATUS_COLLECTIONS.len());
    if healthy {
        for collection in STATUS_COLLECTIONS {
            let count = store.count(collection).await.ok();
            collections.push(CollectionCount {
                collection: collection.to_string(),
                count,
            });
        }
    }

    DbStatus {
        backend: store.backend().to_string(),
        healthy,
        collections,
    }
}

pub async fn run_db_status(store: &dyn RecordStore, format: OutputFormat) -> Result<()> {
    let status = db_status(store).await;

    match format {
        OutputFormat::Json => format.print_json(&status)?,
        OutputFormat::Quiet => {}
        OutputFormat::Text => {
            if status.healthy {
                println!("Backend: {} (reachable)", status.backend);
                println!();
                println!("Collection Statistics:");
                println!("{}", "─".repeat(40));
                for c in &status.collections {
                    match c.count {
                        Some(n) => println!("{:<20} {} records", c.collection, n),
                        None => println!("{:<20} error", c.collection),
                    }
                }
            }
        }
    }

    if !status.healthy {
        anyhow::bail!("{} backend is not reachable", status.backend);
    }
    Ok(())
}

pub async fn run_db_lookups(
    store: &dyn RecordStore,
    category: Option<LookupCategory>,
    format: OutputFormat,
) -> Result<()> {
    let maps = load_lookup_maps(store).await?;
    let categories: Vec<LookupCategory> = match category {
        Some(c) => vec![c],
        None => LookupCategory::ALL.to_vec(),
    };

    match format {
        OutputFormat::Json => {
            let mut out = serde_json::Map::new();
            for c in &categories {
                let map = maps.get(*c).cloned().unwrap_or_default();
                out.insert(c.collection().to_string(), serde_json::to_value(map)?);
            }
            format.print_json(&out)?;
        }
        OutputFormat::Quiet => {
            for c in &categories {
                for id in maps.get(*c).into_iter().flat_map(|m| m.values()) {
                    println!("{}", id);
                }
            }
        }
        OutputFormat::Text => {
            for c in &categories {
                println!();
                println!("{}:", c);
                println!("{}", "─".repeat(40));
                for (name, id) in maps.get(*c).into_iter().flatten() {
                    println!("  {:<35} {}", name, id);
                }
            }
        }
    }
    Ok(())
}

/// Result of `db validate`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub content_checked: usize,
    pub tools_checked: usize,
    pub issues: Vec<String>,
}

fn text_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Check required fields, version format, and that every stored FK id
/// points at an existing record.
pub async fn validate_integrity(store: &dyn RecordStore) -> Result<IntegrityReport> {
    let (content, tools, index) = tokio::try_join!(
        store.get_full_list("content"),
        store.get_full_list("tools"),
        ReferenceIndex::load(store),
    )?;

    let mut issues = Vec::new();
    for record in &content {
        let id = cell(record.get("id"));
        for field in ["name", "slug", "content_type"] {
            if text_field(record, field).is_none() {
                issues.push(format!("Content {}: missing {}", id, field));
            }
        }
        if let Some(version) = text_field(record, "version") {
            if let Err(message) = validate_version_prefix(version) {
                issues.push(format!("Content {}: {}", id, message));
            }
        }
        for field in FkField::CONTENT {
            if let Some(fk) = text_field(record, field.as_str()) {
                if !index.contains(field.category(), fk) {
                    issues.push(format!(
                        "Content {}: invalid {} reference \"{}\"",
                        id, field, fk
                    ));
                }
            }
        }
    }

    for record in &tools {
        let id = cell(record.get("id"));
        if text_field(record, "name").is_none() {
            issues.push(format!("Tool {}: missing name", id));
        }
        if let Some(fk) = text_field(record, "organization") {
            if !index.contains(LookupCategory::Organizations, fk) {
                issues.push(format!("Tool {}: invalid organization reference \"{}\"", id, fk));
            }
        }
    }

    Ok(IntegrityReport {
        content_checked: content.len(),
        tools_checked: tools.len(),
        issues,
    })
}

pub async fn run_db_validate(store: &dyn RecordStore, format: OutputFormat) -> Result<()> {
    let report = validate_integrity(store).await?;

    if report.issues.is_empty() {
        match format {
            OutputFormat::Json => format.print_json(&serde_json::json!({
                "success": true,
                "content_checked": report.content_checked,
                "tools_checked": report.tools_checked,
                "issues": report.issues,
            }))?,
            OutputFormat::Quiet => {}
            OutputFormat::Text => println!(
                "Validated {} content records and {} tools. All validations passed",
                report.content_checked, report.tools_checked
            ),
        }
        return Ok(());
    }

    format.info(&format!(
        "Validated {} content records and {} tools. Found {} issues:",
        report.content_checked,
        report.tools_checked,
        report.issues.len()
    ));
    Err(CommandFailure::new(report.issues, vec![]).into())
}

/// Audit outcome for one record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    #[serde(flatten)]
    pub audit: SlugAudit,
    /// The slug is malformed, not just unconventional.
    pub invalid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditSummary {
    pub compliant: usize,
    pub warnings: usize,
    pub errors: usize,
    pub entries: Vec<AuditEntry>,
}

/// Audit every content slug. Suggestions are included when `fix` is set.
pub async fn audit_content_slugs(store: &dyn RecordStore, fix: bool) -> Result<AuditSummary> {
    let content = store.get_full_list("content").await?;
    let mut summary = AuditSummary::default();

    for record in &content {
        let slug = text_field(record, "slug").unwrap_or_default();
        let name = text_field(record, "name").unwrap_or_default();
        let audit = audit_slug(slug, name);
        if audit.is_compliant() {
            summary.compliant += 1;
            continue;
        }

        let invalid = validate_slug(slug).is_err();
        if invalid {
            summary.errors += 1;
        } else {
            summary.warnings += 1;
        }
        let suggested = Some(suggest_slug(slug))
            .filter(|s| fix && s != slug);
        summary.entries.push(AuditEntry {
            audit,
            invalid,
            suggested,
        });
    }
    Ok(summary)
}

pub async fn run_db_audit(store: &dyn RecordStore, fix: bool, format: OutputFormat) -> Result<()> {
    let summary = audit_content_slugs(store, fix).await?;

    match format {
        OutputFormat::Json => format.print_json(&summary)?,
        OutputFormat::Quiet => {
            for entry in &summary.entries {
                println!("{}", entry.audit.slug);
            }
        }
        OutputFormat::Text => {
            for entry in &summary.entries {
                let mark = if entry.invalid { "✗" } else { "⚠" };
                println!("{} {}", mark, entry.audit.slug);
                println!("  Name: {}", entry.audit.name);
                for issue in &entry.audit.issues {
                    println!("  → {}", issue);
                }
                if let Some(ref suggested) = entry.suggested {
                    println!("  Suggested: {}", suggested);
                }
                println!();
            }
            println!("Summary:");
            println!("{}", "─".repeat(40));
            println!("Compliant: {}", summary.compliant);
            println!("Warnings:  {}", summary.warnings);
            println!("Errors:    {}", summary.errors);
        }
    }

    if summary.errors > 0 {
        anyhow::bail!("Audit found {} invalid slugs", summary.errors);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    fn store() -> InMemoryStore {
        InMemoryStore::new()
            .with_records("organizations", vec![json!({ "id": "org_1", "name": "MITRE" })])
            .with_records("targets", vec![json!({ "id": "tgt_1", "name": "RHEL 9" })])
            .with_records(
                "content",
                vec![
                    json!({ "id": "c1", "name": "RHEL 9 STIG", "slug": "rhel-9-stig", "content_type": "validation", "target": "tgt_1", "vendor": "org_1" }),
                    json!({ "id": "c2", "name": "", "slug": "red-hat-8-stig", "content_type": "validation", "target": "tgt_gone", "version": "v1.0.0" }),
                    json!({ "id": "c3", "name": "Windows", "slug": "Bad Slug", "content_type": "hardening" }),
                ],
            )
            .with_records(
                "tools",
                vec![
                    json!({ "id": "t1", "name": "Heimdall", "organization": "org_1" }),
                    json!({ "id": "t2", "name": "Vulcan", "organization": "org_9" }),
                ],
            )
    }

    #[tokio::test]
    async fn test_status_counts() {
        let status = db_status(&store()).await;
        assert!(status.healthy);
        assert_eq!(status.backend, "memory");
        let content = status.collections.iter().find(|c| c.collection == "content").unwrap();
        assert_eq!(content.count, Some(3));
        let teams = status.collections.iter().find(|c| c.collection == "teams").unwrap();
        assert_eq!(teams.count, Some(0));
    }

    #[tokio::test]
    async fn test_status_reports_failed_count() {
        let status = db_status(&store().failing_on("tags")).await;
        let tags = status.collections.iter().find(|c| c.collection == "tags").unwrap();
        assert_eq!(tags.count, None);
    }

    #[tokio::test]
    async fn test_validate_integrity() {
        let report = validate_integrity(&store()).await.unwrap();
        assert_eq!(report.content_checked, 3);
        assert_eq!(report.tools_checked, 2);
        assert_eq!(
            report.issues,
            vec![
                "Content c2: missing name".to_string(),
                "Content c2: Version must start with a digit (got \"v1.0.0\"); drop any \"v\" prefix".to_string(),
                "Content c2: invalid target reference \"tgt_gone\"".to_string(),
                "Tool t2: invalid organization reference \"org_9\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_validate_command_fails_with_issues() {
        let err = run_db_validate(&store(), OutputFormat::Quiet).await.unwrap_err();
        let failure = err.downcast_ref::<CommandFailure>().unwrap();
        assert_eq!(failure.errors.len(), 4);
    }

    #[tokio::test]
    async fn test_audit_summary() {
        let summary = audit_content_slugs(&store(), true).await.unwrap();
        assert_eq!(summary.compliant, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.errors, 1);

        let red_hat = summary.entries.iter().find(|e| e.audit.slug == "red-hat-8-stig").unwrap();
        assert!(!red_hat.invalid);
        assert_eq!(red_hat.suggested.as_deref(), Some("rhel-8-stig"));

        let bad = summary.entries.iter().find(|e| e.audit.slug == "Bad Slug").unwrap();
        assert!(bad.invalid);
    }

    #[tokio::test]
    async fn test_audit_without_fix_has_no_suggestions() {
        let summary = audit_content_slugs(&store(), false).await.unwrap();
        assert!(summary.entries.iter().all(|e| e.suggested.is_none()));
    }
}
