//! Content records: preparing adds and updates, and the `saf content`
//! commands.
//!
//! [`prepare_content_add`] and [`prepare_content_update`] do no storage
//! I/O. They take the lookup maps and a [`RepoSource`] as parameters and
//! return every warning and error, so the `run_*` command functions only
//! decide whether to write.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapter::{build_candidate, extract_control_count, raw_file_url, RepoData};
use crate::diff::{diff, ContentPatch, DiffResult};
use crate::github::{parse_github_url, RepoInfo, RepoSource};
use crate::lookup::{load_lookup_maps, LookupMaps, ReferenceIndex};
use crate::models::{
    AutomationLevel, CandidateRecord, ContentExpansion, ContentType, FkField, Status,
    StoredContent,
};
use crate::output::{cell, truncate, CommandFailure, OutputFormat};
use crate::resolve::{check_unresolved_fks, resolve, ResolvedRecord};
use crate::store::{ListQuery, RecordStore, SortOrder};
use crate::validation::{validate_candidate, validate_patch};

pub const COLLECTION: &str = "content";

/// User-supplied values that replace what the repository provides.
#[derive(Debug, Clone, Default)]
pub struct ContentOverrides {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub status: Option<Status>,
    pub control_count: Option<i64>,
    pub automation_level: Option<AutomationLevel>,
    pub stig_id: Option<String>,
    pub benchmark_version: Option<String>,
}

impl ContentOverrides {
    fn apply(&self, c: &mut CandidateRecord) {
        if let Some(ref name) = self.name {
            c.name = name.clone();
        }
        if let Some(ref slug) = self.slug {
            c.slug = slug.clone();
        }
        if let Some(ref description) = self.description {
            c.description = Some(description.clone());
        }
        if let Some(ref version) = self.version {
            c.version = Some(version.clone());
        }
        if let Some(status) = self.status {
            c.status = status;
        }
        if let Some(count) = self.control_count {
            c.control_count = Some(count);
        }
        if let Some(level) = self.automation_level {
            c.automation_level = Some(level);
        }
        if let Some(ref stig_id) = self.stig_id {
            c.stig_id = Some(stig_id.clone());
        }
        if let Some(ref benchmark_version) = self.benchmark_version {
            c.benchmark_version = Some(benchmark_version.clone());
        }
    }

    /// The patch for a record that already exists under the candidate's
    /// slug. Repository-derived fields come from the candidate. Fields
    /// that are curated on the record (name, status, type, featuring)
    /// are sent only when given explicitly.
    fn existing_record_patch(&self, resolved: &ResolvedRecord) -> ContentPatch {
        ContentPatch {
            name: self.name.clone(),
            slug: None,
            content_type: None,
            status: self.status,
            ..ContentPatch::from_resolved(resolved)
        }
    }
}

/// Input to [`prepare_content_add`].
#[derive(Debug, Clone)]
pub struct ContentAddInput {
    pub github_url: String,
    pub content_type: ContentType,
    /// FK names to resolve (`vendor`, `standard`, ...).
    pub references: BTreeMap<FkField, String>,
    /// Tag names to resolve.
    pub tags: BTreeSet<String>,
    pub overrides: ContentOverrides,
}

impl ContentAddInput {
    pub fn new(github_url: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            github_url: github_url.into(),
            content_type,
            references: BTreeMap::new(),
            tags: BTreeSet::new(),
            overrides: ContentOverrides::default(),
        }
    }
}

/// Outcome of [`prepare_content_add`]. `content` is present only when
/// there are no errors.
#[derive(Debug, Clone, Serialize)]
pub struct PrepareAddResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<CandidateRecord>,
    #[serde(skip)]
    pub repo_info: Option<RepoInfo>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl PrepareAddResult {
    fn failed(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            content: None,
            repo_info: None,
            warnings,
            errors,
        }
    }
}

/// Fetch repository data, build the candidate, apply overrides, resolve
/// references, and validate.
///
/// A repository that cannot be fetched is an error; a missing or
/// unreadable `inspec.yml` or README is only a warning. Unresolved
/// references are errors so that nothing half-linked is written.
pub async fn prepare_content_add(
    input: &ContentAddInput,
    maps: &LookupMaps,
    source: &dyn RepoSource,
) -> PrepareAddResult {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let Some((owner, repo)) = parse_github_url(&input.github_url) else {
        return PrepareAddResult::failed(vec!["Invalid GitHub URL".to_string()], warnings);
    };

    let repo_info = match source.fetch_repo_info(&owner, &repo).await {
        Ok(info) => info,
        Err(e) => {
            return PrepareAddResult::failed(
                vec![format!("Failed to fetch repository: {}", e)],
                warnings,
            )
        }
    };
    let branch = repo_info.default_branch.clone();

    let inspec_profile = match source.fetch_inspec_profile(&owner, &repo, &branch).await {
        Ok(Some(profile)) => Some(profile),
        Ok(None) => {
            warnings.push("No inspec.yml found - using defaults".to_string());
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "inspec.yml fetch failed");
            warnings.push("Failed to fetch inspec.yml - using defaults".to_string());
            None
        }
    };

    let readme = match source.fetch_readme(&owner, &repo, &branch).await {
        Ok(Some(readme)) => Some(readme),
        Ok(None) => {
            warnings.push("No README found".to_string());
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "README fetch failed");
            warnings.push("Failed to fetch README".to_string());
            None
        }
    };

    let data = RepoData {
        repo_info: repo_info.clone(),
        inspec_profile,
        readme,
        content_type: input.content_type,
        automation_level: input.overrides.automation_level,
    };

    let mut candidate = build_candidate(&data);
    input.overrides.apply(&mut candidate);
    candidate.references = input.references.clone();
    candidate.tags = input.tags.clone();

    let resolved = resolve(&candidate, maps);
    errors.extend(check_unresolved_fks(&resolved));

    let validation = validate_candidate(&resolved.record);
    warnings.extend(validation.warnings);
    errors.extend(validation.issues.iter().map(ToString::to_string));

    let success = errors.is_empty();
    PrepareAddResult {
        success,
        content: if success { Some(resolved.record) } else { None },
        repo_info: Some(repo_info),
        warnings,
        errors,
    }
}

/// Outcome of [`prepare_content_update`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrepareUpdateResult {
    pub success: bool,
    pub changes: DiffResult,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl PrepareUpdateResult {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Validate a patch and diff it against the stored record. On success,
/// `changes` holds only the fields that differ.
pub fn prepare_content_update(existing: &StoredContent, patch: &ContentPatch) -> PrepareUpdateResult {
    let validation = validate_patch(patch);
    let errors: Vec<String> = validation.issues.iter().map(ToString::to_string).collect();
    if !errors.is_empty() {
        return PrepareUpdateResult {
            success: false,
            changes: DiffResult::default(),
            warnings: validation.warnings,
            errors,
        };
    }

    PrepareUpdateResult {
        success: true,
        changes: diff(existing, patch),
        warnings: validation.warnings,
        errors: Vec::new(),
    }
}

/// Fill `content.expand` with the entities its FK ids point at.
pub fn expand_content(content: &mut StoredContent, index: &ReferenceIndex) {
    let mut expansion = ContentExpansion::default();
    for field in FkField::CONTENT {
        if let Some(entity) = content
            .reference(field)
            .and_then(|id| index.get(field.category(), id))
        {
            expansion.set(field, entity.clone());
        }
    }
    content.expand = Some(expansion);
}

fn decode(record: crate::models::Record) -> Result<StoredContent> {
    StoredContent::from_record(record).context("Malformed content record")
}

/// List content records, newest first, optionally expanded.
pub async fn list_content(
    store: &dyn RecordStore,
    content_type: Option<ContentType>,
    limit: usize,
    expand: bool,
) -> Result<Vec<StoredContent>> {
    let mut query = ListQuery::default()
        .sort_by("created", SortOrder::Desc)
        .limit(limit);
    if let Some(t) = content_type {
        query = query.filter("content_type", t.as_str());
    }

    let records = store.get_list(COLLECTION, &query).await?;
    let mut items = records.into_iter().map(decode).collect::<Result<Vec<_>>>()?;

    if expand {
        let index = ReferenceIndex::load(store).await?;
        for item in &mut items {
            expand_content(item, &index);
        }
    }
    Ok(items)
}

/// Fetch one content record, optionally expanded.
pub async fn get_content(store: &dyn RecordStore, id: &str, expand: bool) -> Result<StoredContent> {
    let mut content = decode(store.get_one(COLLECTION, id).await?)?;
    if expand {
        let index = ReferenceIndex::load(store).await?;
        expand_content(&mut content, &index);
    }
    Ok(content)
}

async fn find_by_slug(store: &dyn RecordStore, slug: &str) -> Result<Option<StoredContent>> {
    let query = ListQuery::default().filter("slug", slug).limit(1);
    let mut records = store.get_list(COLLECTION, &query).await?;
    match records.pop() {
        Some(record) => Ok(Some(decode(record)?)),
        None => Ok(None),
    }
}

fn expanded_name(content: &StoredContent, field: FkField) -> String {
    content
        .expand
        .as_ref()
        .and_then(|e| e.get(field))
        .map(|e| e.name.clone())
        .unwrap_or_else(|| "-".to_string())
}

fn expanded_short_name(content: &StoredContent, field: FkField) -> String {
    content
        .expand
        .as_ref()
        .and_then(|e| e.get(field))
        .and_then(|e| e.short_name.clone().or_else(|| Some(e.name.clone())))
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_content_list(items: &[StoredContent], total: u64, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(items)?),
        OutputFormat::Quiet => Ok(items.iter().map(|c| c.id.clone()).collect::<Vec<_>>().join("\n")),
        OutputFormat::Text => {
            let mut lines = vec![format!(
                "{:<16} {:<38} {:<11} {:<23} {:<10} {}",
                "ID", "NAME", "TYPE", "TARGET", "STANDARD", "VERSION"
            )];
            for c in items {
                lines.push(format!(
                    "{:<16} {:<38} {:<11} {:<23} {:<10} {}",
                    truncate(&c.id, 16),
                    truncate(&c.name, 38),
                    c.content_type,
                    truncate(&expanded_name(c, FkField::Target), 23),
                    truncate(&expanded_short_name(c, FkField::Standard), 10),
                    c.version.as_deref().unwrap_or("-"),
                ));
            }
            lines.push(String::new());
            lines.push(format!("Showing {} of {} records", items.len(), total));
            Ok(lines.join("\n"))
        }
    }
}

pub fn format_content_detail(c: &StoredContent, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(c)?),
        OutputFormat::Quiet => Ok(c.id.clone()),
        OutputFormat::Text => {
            let opt = |v: &Option<String>| v.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| "-".to_string());
            let details = [
                ("ID", c.id.clone()),
                ("Slug", c.slug.clone()),
                ("Type", c.content_type.clone()),
                ("Status", c.status.clone()),
                ("Version", opt(&c.version)),
                ("Target", expanded_name(c, FkField::Target)),
                ("Standard", expanded_name(c, FkField::Standard)),
                ("Technology", expanded_name(c, FkField::Technology)),
                ("Vendor", expanded_name(c, FkField::Vendor)),
                ("Maintainer", expanded_name(c, FkField::Maintainer)),
                (
                    "Controls",
                    c.control_count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                ),
                ("STIG ID", opt(&c.stig_id)),
                ("Benchmark", opt(&c.benchmark_version)),
                ("GitHub", opt(&c.github)),
                ("License", opt(&c.license)),
            ];
            let mut lines = vec![c.name.clone(), "─".repeat(60)];
            for (label, value) in details {
                lines.push(format!("{:<12} {}", label, value));
            }
            if let Some(ref description) = c.description {
                if !description.is_empty() {
                    lines.push(String::new());
                    lines.push(description.clone());
                }
            }
            Ok(lines.join("\n"))
        }
    }
}

fn format_changes(changes: &DiffResult) -> Vec<String> {
    changes
        .changes
        .iter()
        .map(|(field, change)| {
            let old = change
                .old
                .as_ref()
                .map(|v| truncate(&v.to_string(), 60))
                .unwrap_or_else(|| "-".to_string());
            let new = if change.new.is_empty() {
                "(cleared)".to_string()
            } else {
                truncate(&change.new.to_string(), 60)
            };
            format!("  {}: {} → {}", field, old, new)
        })
        .collect()
}

pub async fn run_content_list(
    store: &dyn RecordStore,
    content_type: Option<ContentType>,
    limit: usize,
    expand: bool,
    format: OutputFormat,
) -> Result<()> {
    let items = list_content(store, content_type, limit, expand || format.is_text()).await?;
    let total = if format.is_text() {
        store.count(COLLECTION).await?
    } else {
        items.len() as u64
    };
    let text = format_content_list(&items, total, format)?;
    if !text.is_empty() {
        println!("{}", text);
    }
    Ok(())
}

pub async fn run_content_show(
    store: &dyn RecordStore,
    id: &str,
    expand: bool,
    format: OutputFormat,
) -> Result<()> {
    let content = get_content(store, id, expand || format.is_text()).await?;
    println!("{}", format_content_detail(&content, format)?);
    Ok(())
}

/// What `content add` did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum AddOutcome {
    Created { id: String },
    Updated { id: String, changes: DiffResult },
    Unchanged { id: String },
    DryRun,
}

/// Prepare, then create the record; or, when the slug already exists,
/// write only the fields that changed.
pub async fn add_content(
    store: &dyn RecordStore,
    source: &dyn RepoSource,
    input: &ContentAddInput,
    dry_run: bool,
) -> Result<(PrepareAddResult, AddOutcome)> {
    let maps = load_lookup_maps(store)
        .await
        .context("Failed to load lookup collections")?;

    let prepared = prepare_content_add(input, &maps, source).await;
    let Some(content) = prepared.content.clone() else {
        return Err(CommandFailure::new(prepared.errors.clone(), prepared.warnings.clone()).into());
    };

    if dry_run {
        return Ok((prepared, AddOutcome::DryRun));
    }

    let slug = content.slug.clone();
    let resolved = ResolvedRecord {
        record: content,
        unresolved: BTreeSet::new(),
    };
    let outcome = match find_by_slug(store, &slug).await? {
        Some(existing) => {
            let patch = input.overrides.existing_record_patch(&resolved);
            let changes = diff(&existing, &patch);
            if changes.is_empty() {
                AddOutcome::Unchanged { id: existing.id }
            } else {
                store
                    .update(COLLECTION, &existing.id, &changes.clone().into_patch())
                    .await?;
                tracing::info!(id = %existing.id, fields = changes.len(), "content updated");
                AddOutcome::Updated {
                    id: existing.id,
                    changes,
                }
            }
        }
        None => {
            let patch = ContentPatch::from_resolved(&resolved);
            let record = store.create(COLLECTION, &patch.to_record()).await?;
            let id = cell(record.get("id"));
            tracing::info!(id = %id, slug = %slug, "content created");
            AddOutcome::Created { id }
        }
    };
    Ok((prepared, outcome))
}

pub async fn run_content_add(
    store: &dyn RecordStore,
    source: &dyn RepoSource,
    input: &ContentAddInput,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let (prepared, outcome) = add_content(store, source, input, dry_run).await?;
    let Some(ref content) = prepared.content else {
        return Ok(());
    };

    match format {
        OutputFormat::Json => {
            format.print_json(&serde_json::json!({
                "success": true,
                "content": content,
                "result": outcome,
                "warnings": prepared.warnings,
                "errors": prepared.errors,
            }))?;
        }
        OutputFormat::Quiet => match outcome {
            AddOutcome::Created { ref id }
            | AddOutcome::Updated { ref id, .. }
            | AddOutcome::Unchanged { ref id } => println!("{}", id),
            AddOutcome::DryRun => println!("{}", content.slug),
        },
        OutputFormat::Text => {
            format.warnings(&prepared.warnings);
            println!("Name:     {}", content.name);
            println!("Slug:     {}", content.slug);
            println!("Type:     {}", content.content_type);
            println!("Status:   {}", content.status);
            if let Some(ref version) = content.version {
                println!("Version:  {}", version);
            }
            if let Some(count) = content.control_count {
                println!("Controls: {}", count);
            }
            println!();
            match outcome {
                AddOutcome::Created { id } => println!("Created: {}", id),
                AddOutcome::Updated { id, changes } => {
                    println!("Updated existing record {}:", id);
                    for line in format_changes(&changes) {
                        println!("{}", line);
                    }
                }
                AddOutcome::Unchanged { id } => {
                    println!("No changes detected for existing record {}", id)
                }
                AddOutcome::DryRun => println!("Dry run: nothing written"),
            }
        }
    }
    Ok(())
}

/// Arguments of `content update`. FK fields hold names; an empty name
/// clears the reference.
#[derive(Debug, Clone, Default)]
pub struct ContentUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub status: Option<Status>,
    pub control_count: Option<i64>,
    pub automation_level: Option<AutomationLevel>,
    pub stig_id: Option<String>,
    pub benchmark_version: Option<String>,
    pub references: BTreeMap<FkField, String>,
    pub tags: Option<BTreeSet<String>>,
    pub sync_readme: bool,
}

impl ContentUpdateInput {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.version.is_none()
            && self.status.is_none()
            && self.control_count.is_none()
            && self.automation_level.is_none()
            && self.stig_id.is_none()
            && self.benchmark_version.is_none()
            && self.references.is_empty()
            && self.tags.is_none()
            && !self.sync_readme
    }
}

/// Turn update arguments into a patch, resolving any reference names.
/// Unresolved names are returned as errors.
pub fn build_update_patch(input: &ContentUpdateInput, maps: &LookupMaps) -> (ContentPatch, Vec<String>) {
    let mut patch = ContentPatch {
        name: input.name.clone(),
        description: input.description.clone(),
        version: input.version.clone(),
        status: input.status,
        control_count: input.control_count,
        automation_level: input.automation_level,
        stig_id: input.stig_id.clone(),
        benchmark_version: input.benchmark_version.clone(),
        ..ContentPatch::default()
    };

    let mut candidate = CandidateRecord::new("", "", ContentType::Validation);
    candidate.references = input
        .references
        .iter()
        .filter(|(_, name)| !name.trim().is_empty())
        .map(|(f, n)| (*f, n.clone()))
        .collect();
    candidate.tags = input.tags.clone().unwrap_or_default();
    let resolved = resolve(&candidate, maps);

    for (field, name) in &input.references {
        let value = if name.trim().is_empty() {
            Some(String::new())
        } else {
            resolved.record.references.get(field).cloned()
        };
        match field {
            FkField::Vendor => patch.vendor = value,
            FkField::Standard => patch.standard = value,
            FkField::Technology => patch.technology = value,
            FkField::Target => patch.target = value,
            FkField::Maintainer => patch.maintainer = value,
            FkField::Organization => {}
        }
    }
    if input.tags.is_some() {
        patch.tags = Some(resolved.record.tags.clone());
    }

    (patch, check_unresolved_fks(&resolved))
}

async fn sync_readme(
    source: &dyn RepoSource,
    existing: &StoredContent,
    patch: &mut ContentPatch,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let Some((owner, repo)) = existing.github.as_deref().and_then(parse_github_url) else {
        warnings.push("Record has no GitHub URL; README not synced".to_string());
        return Ok(());
    };
    let info = source.fetch_repo_info(&owner, &repo).await?;
    match source.fetch_readme(&owner, &repo, &info.default_branch).await? {
        Some(readme) => {
            if patch.control_count.is_none() {
                patch.control_count = extract_control_count(&readme.content).filter(|n| *n > 0);
            }
            patch.readme_url = Some(raw_file_url(&info, &readme.path));
            patch.readme_markdown = Some(readme.content);
        }
        None => warnings.push("No README found".to_string()),
    }
    Ok(())
}

/// Apply an update: resolve names, optionally sync the README, validate,
/// diff, and write only the changed fields.
pub async fn update_content(
    store: &dyn RecordStore,
    source: &dyn RepoSource,
    id: &str,
    input: &ContentUpdateInput,
) -> Result<PrepareUpdateResult> {
    if input.is_empty() {
        return Err(CommandFailure::new(vec!["No updates specified".to_string()], vec![]).into());
    }

    let existing = decode(store.get_one(COLLECTION, id).await?)?;

    let maps = if input.references.is_empty() && input.tags.is_none() {
        LookupMaps::new()
    } else {
        load_lookup_maps(store)
            .await
            .context("Failed to load lookup collections")?
    };
    let (mut patch, unresolved) = build_update_patch(input, &maps);
    if !unresolved.is_empty() {
        return Err(CommandFailure::new(unresolved, vec![]).into());
    }

    let mut warnings = Vec::new();
    if input.sync_readme {
        sync_readme(source, &existing, &mut patch, &mut warnings).await?;
    }

    let mut result = prepare_content_update(&existing, &patch);
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    if !result.success {
        return Err(CommandFailure::new(result.errors, result.warnings).into());
    }

    if result.has_changes() {
        store
            .update(COLLECTION, id, &result.changes.clone().into_patch())
            .await?;
        tracing::info!(id, fields = result.changes.len(), "content updated");
    }
    Ok(result)
}

pub async fn run_content_update(
    store: &dyn RecordStore,
    source: &dyn RepoSource,
    id: &str,
    input: &ContentUpdateInput,
    format: OutputFormat,
) -> Result<()> {
    let result = update_content(store, source, id, input).await?;

    match format {
        OutputFormat::Json => {
            format.print_json(&serde_json::json!({
                "success": true,
                "id": id,
                "hasChanges": result.has_changes(),
                "changes": result.changes,
                "warnings": result.warnings,
                "errors": result.errors,
            }))?;
        }
        OutputFormat::Quiet => {
            if result.has_changes() {
                println!("{}", id);
            }
        }
        OutputFormat::Text => {
            format.warnings(&result.warnings);
            if result.has_changes() {
                println!("Updated {}:", id);
                for line in format_changes(&result.changes) {
                    println!("{}", line);
                }
            } else {
                println!("No changes detected");
            }
        }
    }
    Ok(())
}
