//! Field validation and slug naming conventions.
//!
//! Errors block a write; warnings are reported and the write proceeds.
//! Every check here runs before any network call.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::diff::ContentPatch;
use crate::models::CandidateRecord;

static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\d+\.\d+\.\d+(-[0-9A-Z-]+(\.[0-9A-Z-]+)*)?(\+[0-9A-Z-]+(\.[0-9A-Z-]+)*)?$")
        .expect("semver pattern compiles")
});

/// Standard identifiers a slug is expected to end with.
pub const STANDARD_IDENTIFIERS: [&str; 7] =
    ["stig", "cis", "pci-dss", "nist-800-53", "hipaa", "fedramp", "soc2"];

pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 100;
pub const NAME_MAX_LEN: usize = 200;
/// Limit on `stig_id` and `benchmark_version`.
pub const IDENTIFIER_MAX_LEN: usize = 50;

/// A blocking problem with one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating a record or patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Validation {
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(message) = result {
            self.issues.push(ValidationIssue::new(field, message));
        }
    }
}

fn is_slug_shape(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

/// Slug format: lowercase alphanumerics in single-hyphen-separated runs,
/// 3 to 100 characters.
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.len() < SLUG_MIN_LEN {
        return Err(format!("Slug must be at least {} characters", SLUG_MIN_LEN));
    }
    if slug.len() > SLUG_MAX_LEN {
        return Err(format!("Slug must be at most {} characters", SLUG_MAX_LEN));
    }
    if slug.contains("--") {
        return Err("Slug cannot contain consecutive hyphens".to_string());
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err("Slug cannot start or end with hyphen".to_string());
    }
    if !is_slug_shape(slug) {
        return Err("Slug must be lowercase alphanumeric with hyphens".to_string());
    }
    Ok(())
}

/// Naming-convention warnings for a well-formed slug.
pub fn slug_convention_warnings(slug: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let parts: Vec<&str> = slug.split('-').collect();

    // Standards may span up to three parts (nist-800-53).
    let has_standard = (1..=parts.len().min(3)).any(|n| {
        let tail = parts[parts.len() - n..].join("-");
        STANDARD_IDENTIFIERS.contains(&tail.as_str())
    });
    if !has_standard {
        warnings.push(format!(
            "Slug should end with a known standard identifier: {}",
            STANDARD_IDENTIFIERS.join(", ")
        ));
    }

    if slug.contains("red-hat") {
        warnings.push("Use \"rhel\" instead of \"red-hat\" for Red Hat Enterprise Linux".to_string());
    }
    if slug.contains("windows") && !slug.contains("win-") {
        warnings.push("Consider using \"win\" instead of \"windows\" for Windows Server".to_string());
    }
    if slug.contains("enterprise-linux") {
        warnings.push("Use \"rhel\" abbreviation instead of full \"enterprise-linux\"".to_string());
    }
    warnings
}

/// Versions begin with a digit; `v1.2.0` is rejected.
pub fn validate_version_prefix(version: &str) -> Result<(), String> {
    match version.chars().next() {
        Some(c) if c.is_ascii_digit() => Ok(()),
        _ => Err(format!(
            "Version must start with a digit (got \"{}\"); drop any \"v\" prefix",
            version
        )),
    }
}

/// Full semver check, after the prefix rule.
pub fn validate_version(version: &str) -> Result<(), String> {
    validate_version_prefix(version)?;
    if !SEMVER.is_match(version) {
        return Err("Version must be semver format (x.y.z[-prerelease][+build])".to_string());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(format!("Name must be at most {} characters", NAME_MAX_LEN));
    }
    Ok(())
}

/// Empty means unset and passes.
pub fn validate_url(url: &str) -> Result<(), String> {
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("Invalid URL: {}", url))
    }
}

/// Short identifiers such as `RHEL-09-010001` or `V1R3`.
pub fn validate_identifier(value: &str) -> Result<(), String> {
    if value.chars().count() > IDENTIFIER_MAX_LEN {
        return Err(format!("Must be at most {} characters", IDENTIFIER_MAX_LEN));
    }
    Ok(())
}

pub fn validate_control_count(count: i64) -> Result<(), String> {
    if count > 0 {
        Ok(())
    } else {
        Err("Control count must be a positive integer".to_string())
    }
}

fn check_slug(v: &mut Validation, slug: &str) {
    match validate_slug(slug) {
        Ok(()) => v.warnings.extend(slug_convention_warnings(slug)),
        Err(message) => v.issues.push(ValidationIssue::new("slug", message)),
    }
}

/// Validate a candidate before it is created.
pub fn validate_candidate(candidate: &CandidateRecord) -> Validation {
    let mut v = Validation::default();
    v.check("name", validate_name(&candidate.name));
    check_slug(&mut v, &candidate.slug);
    if let Some(ref version) = candidate.version {
        v.check("version", validate_version(version));
    }
    for (field, url) in [
        ("github", &candidate.github),
        ("documentation_url", &candidate.documentation_url),
        ("reference_url", &candidate.reference_url),
        ("readme_url", &candidate.readme_url),
    ] {
        if let Some(url) = url {
            v.check(field, validate_url(url));
        }
    }
    if let Some(count) = candidate.control_count {
        v.check("control_count", validate_control_count(count));
    }
    for (field, value) in [
        ("stig_id", &candidate.stig_id),
        ("benchmark_version", &candidate.benchmark_version),
    ] {
        if let Some(value) = value {
            v.check(field, validate_identifier(value));
        }
    }
    v
}

/// Validate the fields a patch sets. Clearing `name` or `slug` is an error;
/// clearing `version` is allowed.
pub fn validate_patch(patch: &ContentPatch) -> Validation {
    let mut v = Validation::default();
    if let Some(ref name) = patch.name {
        v.check("name", validate_name(name));
    }
    if let Some(ref slug) = patch.slug {
        check_slug(&mut v, slug);
    }
    if let Some(version) = patch.version.as_deref().filter(|s| !s.is_empty()) {
        v.check("version", validate_version(version));
    }
    for (field, url) in [
        ("github", &patch.github),
        ("documentation_url", &patch.documentation_url),
        ("reference_url", &patch.reference_url),
        ("readme_url", &patch.readme_url),
    ] {
        if let Some(url) = url {
            v.check(field, validate_url(url));
        }
    }
    if let Some(count) = patch.control_count {
        v.check("control_count", validate_control_count(count));
    }
    for (field, value) in [
        ("stig_id", &patch.stig_id),
        ("benchmark_version", &patch.benchmark_version),
    ] {
        if let Some(value) = value {
            v.check(field, validate_identifier(value));
        }
    }
    v
}

/// Convention audit of a stored slug against its record name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlugAudit {
    pub slug: String,
    pub name: String,
    pub issues: Vec<String>,
}

impl SlugAudit {
    pub fn is_compliant(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn audit_slug(slug: &str, name: &str) -> SlugAudit {
    let mut issues = Vec::new();
    match validate_slug(slug) {
        Ok(()) => issues.extend(slug_convention_warnings(slug)),
        Err(message) => issues.push(message),
    }

    let name_lower = name.to_lowercase();
    if name_lower.contains("red hat") && !slug.starts_with("rhel") {
        issues.push("Expected slug to start with \"rhel\" for Red Hat content".to_string());
    }
    if name_lower.contains("windows") && !slug.contains("win") {
        issues.push("Expected slug to include \"win\" for Windows content".to_string());
    }

    SlugAudit {
        slug: slug.to_string(),
        name: name.to_string(),
        issues,
    }
}

/// A slug that follows the conventions, derived from an existing one.
pub fn suggest_slug(slug: &str) -> String {
    let mut slug = crate::adapter::slugify(slug);
    for (long, short) in [
        ("red-hat-enterprise-linux", "rhel"),
        ("redhat-enterprise-linux", "rhel"),
        ("red-hat", "rhel"),
        ("windows-server", "win"),
        ("windows", "win"),
    ] {
        slug = slug.replace(long, short);
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;

    #[test]
    fn test_version_prefix() {
        assert!(validate_version("v1.2.0").is_err());
        assert!(validate_version_prefix("v1.2.0").is_err());
        assert!(validate_version("1.2.0").is_ok());
        assert!(validate_version_prefix("").is_err());
    }

    #[test]
    fn test_semver() {
        assert!(validate_version("1.2.0-rc.1+build.5").is_ok());
        assert!(validate_version("1.2").is_err());
        assert!(validate_version("1.2.0.4").is_err());
    }

    #[test]
    fn test_slug_format() {
        assert!(validate_slug("rhel-9-stig").is_ok());
        assert!(validate_slug("ab").is_err());
        assert!(validate_slug("rhel--9").is_err());
        assert!(validate_slug("-rhel-9").is_err());
        assert!(validate_slug("RHEL-9").is_err());
        assert!(validate_slug("rhel_9").is_err());
        assert!(validate_slug(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_slug_conventions() {
        assert!(slug_convention_warnings("rhel-9-stig").is_empty());
        assert!(slug_convention_warnings("aws-nist-800-53").is_empty());
        assert!(slug_convention_warnings("ubuntu-2204-pci-dss").is_empty());
        let warnings = slug_convention_warnings("red-hat-9-tool");
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Slug should end with a known standard identifier"));
        assert_eq!(slug_convention_warnings("windows-2019-stig").len(), 1);
    }

    #[test]
    fn test_validate_candidate() {
        let mut c = CandidateRecord::new("RHEL 9", "rhel-9-stig", ContentType::Validation);
        c.version = Some("v1.2.0".into());
        c.github = Some("github.com/x".into());
        c.control_count = Some(0);
        c.stig_id = Some("X".repeat(51));
        let v = validate_candidate(&c);
        let fields: Vec<&str> = v.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["version", "github", "control_count", "stig_id"]);

        c.version = Some("1.2.0".into());
        c.github = Some("https://github.com/x".into());
        c.control_count = Some(10);
        c.stig_id = Some("RHEL-09-010001".into());
        c.benchmark_version = Some("V1R3".into());
        assert!(validate_candidate(&c).is_valid());
    }

    #[test]
    fn test_validate_patch_allows_clearing_version() {
        let patch = ContentPatch {
            version: Some(String::new()),
            ..ContentPatch::default()
        };
        assert!(validate_patch(&patch).is_valid());

        let patch = ContentPatch {
            name: Some(String::new()),
            slug: Some("Bad Slug".into()),
            ..ContentPatch::default()
        };
        assert_eq!(validate_patch(&patch).issues.len(), 2);
    }

    #[test]
    fn test_audit_slug() {
        assert!(audit_slug("rhel-9-stig", "Red Hat Enterprise Linux 9 STIG").is_compliant());
        let audit = audit_slug("redhat-9-stig", "Red Hat 9 STIG");
        assert_eq!(audit.issues, vec!["Expected slug to start with \"rhel\" for Red Hat content".to_string()]);
        assert!(audit_slug("win-2019-stig", "Windows Server 2019").is_compliant());
    }

    #[test]
    fn test_suggest_slug() {
        assert_eq!(suggest_slug("red-hat-enterprise-linux-9-stig"), "rhel-9-stig");
        assert_eq!(suggest_slug("Windows-Server-2019--STIG"), "win-2019-stig");
        assert_eq!(suggest_slug("rhel-9-stig"), "rhel-9-stig");
    }
}
