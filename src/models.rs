//! Core data models used throughout the content CLI.
//!
//! These types describe the content records that flow from a GitHub
//! repository through foreign-key resolution and diffing into the record
//! store, plus the closed vocabularies (content type, status, automation
//! level, reference categories) the store enforces.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A generic row from any collection or table.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Type of security content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// InSpec profiles for testing.
    Validation,
    /// Ansible/Chef content for remediation.
    Hardening,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Validation => "validation",
            ContentType::Hardening => "hardening",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(ContentType::Validation),
            "hardening" => Ok(ContentType::Hardening),
            _ => Err("Content type must be \"validation\" or \"hardening\"".to_string()),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Beta,
    Deprecated,
    Draft,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Beta => "beta",
            Status::Deprecated => "deprecated",
            Status::Draft => "draft",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "beta" => Ok(Status::Beta),
            "deprecated" => Ok(Status::Deprecated),
            "draft" => Ok(Status::Draft),
            _ => Err("Status must be one of: active, beta, deprecated, draft".to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Degree of automation of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationLevel {
    Full,
    Partial,
    Manual,
}

impl AutomationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationLevel::Full => "full",
            AutomationLevel::Partial => "partial",
            AutomationLevel::Manual => "manual",
        }
    }
}

impl FromStr for AutomationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(AutomationLevel::Full),
            "partial" => Ok(AutomationLevel::Partial),
            "manual" => Ok(AutomationLevel::Manual),
            _ => Err("Automation level must be one of: full, partial, manual".to_string()),
        }
    }
}

impl fmt::Display for AutomationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reference collections that human-entered names resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupCategory {
    Organizations,
    Teams,
    Standards,
    Technologies,
    Targets,
    Categories,
    Capabilities,
    Tags,
}

impl LookupCategory {
    pub const ALL: [LookupCategory; 8] = [
        LookupCategory::Organizations,
        LookupCategory::Teams,
        LookupCategory::Standards,
        LookupCategory::Technologies,
        LookupCategory::Targets,
        LookupCategory::Categories,
        LookupCategory::Capabilities,
        LookupCategory::Tags,
    ];

    /// Collection (or table) name in the record store.
    pub fn collection(&self) -> &'static str {
        match self {
            LookupCategory::Organizations => "organizations",
            LookupCategory::Teams => "teams",
            LookupCategory::Standards => "standards",
            LookupCategory::Technologies => "technologies",
            LookupCategory::Targets => "targets",
            LookupCategory::Categories => "categories",
            LookupCategory::Capabilities => "capabilities",
            LookupCategory::Tags => "tags",
        }
    }
}

impl FromStr for LookupCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LookupCategory::ALL
            .into_iter()
            .find(|c| c.collection() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = LookupCategory::ALL.iter().map(|c| c.collection()).collect();
                format!("Unknown collection: \"{}\". Valid collections: {}", s, names.join(", "))
            })
    }
}

impl fmt::Display for LookupCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// A foreign-key field that holds a reference name before resolution and
/// a record id afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FkField {
    Vendor,
    Organization,
    Standard,
    Technology,
    Target,
    Maintainer,
}

impl FkField {
    /// FK fields carried by content records. `organization` belongs to tools.
    pub const CONTENT: [FkField; 5] = [
        FkField::Vendor,
        FkField::Standard,
        FkField::Technology,
        FkField::Target,
        FkField::Maintainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FkField::Vendor => "vendor",
            FkField::Organization => "organization",
            FkField::Standard => "standard",
            FkField::Technology => "technology",
            FkField::Target => "target",
            FkField::Maintainer => "maintainer",
        }
    }

    /// The lookup collection this field resolves against.
    pub fn category(&self) -> LookupCategory {
        match self {
            FkField::Vendor | FkField::Organization => LookupCategory::Organizations,
            FkField::Standard => LookupCategory::Standards,
            FkField::Technology => LookupCategory::Technologies,
            FkField::Target => LookupCategory::Targets,
            FkField::Maintainer => LookupCategory::Teams,
        }
    }
}

impl fmt::Display for FkField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content record ready for FK resolution and storage.
///
/// Built by [`crate::adapter::build_candidate`] from repository data.
/// Before resolution `references` and `tags` hold human-readable names;
/// after [`crate::resolve::resolve`] they hold record ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRecord {
    pub name: String,
    pub slug: String,
    pub content_type: ContentType,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_count: Option<i64>,
    /// DISA identifier, e.g. `RHEL-09-010001`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stig_id: Option<String>,
    /// Version of the benchmark the content implements, e.g. `V1R3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_level: Option<AutomationLevel>,
    #[serde(flatten)]
    pub references: BTreeMap<FkField, String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl CandidateRecord {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            content_type,
            status: Status::Active,
            version: None,
            description: None,
            long_description: None,
            github: None,
            documentation_url: None,
            reference_url: None,
            readme_url: None,
            readme_markdown: None,
            control_count: None,
            stig_id: None,
            benchmark_version: None,
            license: None,
            automation_level: None,
            references: BTreeMap::new(),
            tags: BTreeSet::new(),
        }
    }
}

/// A related reference entity, as returned in a content expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
}

/// Related entities of a content record, filled only when the caller asks
/// for expansion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentExpansion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<ReferenceEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<ReferenceEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<ReferenceEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ReferenceEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<ReferenceEntity>,
}

impl ContentExpansion {
    pub fn get(&self, field: FkField) -> Option<&ReferenceEntity> {
        match field {
            FkField::Vendor => self.vendor.as_ref(),
            FkField::Standard => self.standard.as_ref(),
            FkField::Technology => self.technology.as_ref(),
            FkField::Target => self.target.as_ref(),
            FkField::Maintainer => self.maintainer.as_ref(),
            FkField::Organization => None,
        }
    }

    pub fn set(&mut self, field: FkField, entity: ReferenceEntity) {
        match field {
            FkField::Vendor => self.vendor = Some(entity),
            FkField::Standard => self.standard = Some(entity),
            FkField::Technology => self.technology = Some(entity),
            FkField::Target => self.target = Some(entity),
            FkField::Maintainer => self.maintainer = Some(entity),
            FkField::Organization => {}
        }
    }
}

/// A content record as persisted in the record store.
///
/// Enumerated values are kept as plain strings so rows that predate
/// validation still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredContent {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub content_type: String,
    pub status: String,
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
    pub automation_level: Option<String>,
    #[serde(deserialize_with = "bool_or_int")]
    pub is_featured: Option<bool>,
    pub featured_order: Option<i64>,
    pub vendor: Option<String>,
    pub standard: Option<String>,
    pub technology: Option<String>,
    pub target: Option<String>,
    pub maintainer: Option<String>,
    #[serde(deserialize_with = "list_or_json_text")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<ContentExpansion>,
}

impl StoredContent {
    /// Decode a store row.
    pub fn from_record(record: Record) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::Value::Object(record))
    }

    /// The stored id for an FK field, treating empty relations as unset.
    pub fn reference(&self, field: FkField) -> Option<&str> {
        let value = match field {
            FkField::Vendor => self.vendor.as_deref(),
            FkField::Standard => self.standard.as_deref(),
            FkField::Technology => self.technology.as_deref(),
            FkField::Target => self.target.as_deref(),
            FkField::Maintainer => self.maintainer.as_deref(),
            FkField::Organization => None,
        };
        value.filter(|v| !v.is_empty())
    }
}

/// SQLite stores booleans as integers; Pocketbase returns real booleans.
fn bool_or_int<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::Number(n)) => n.as_i64().map(|i| i != 0),
        _ => None,
    })
}

/// Tag relations arrive as a JSON array (Pocketbase) or as JSON text in a
/// TEXT column (SQLite).
fn list_or_json_text<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        Some(serde_json::Value::Array(items)) => Ok(items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(serde_json::Value::String(text)) if !text.is_empty() => serde_json::from_str(&text)
            .map_err(|e| D::Error::custom(format!("malformed tag list {:?}: {}", text, e))),
        _ => Ok(Vec::new()),
    }
}
