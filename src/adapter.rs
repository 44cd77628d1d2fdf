//! Build candidate content records from pre-fetched repository data.
//!
//! Nothing here performs I/O; [`crate::github`] fetches the inputs.

use std::sync::LazyLock;

use regex::Regex;

use crate::github::{InspecProfile, Readme, RepoInfo};
use crate::models::{AutomationLevel, CandidateRecord, ContentType};

/// Everything known about a repository before it becomes content.
#[derive(Debug, Clone)]
pub struct RepoData {
    pub repo_info: RepoInfo,
    pub inspec_profile: Option<InspecProfile>,
    pub readme: Option<Readme>,
    pub content_type: ContentType,
    pub automation_level: Option<AutomationLevel>,
}

/// Collapse every run of non-alphanumerics to one hyphen, lower-cased,
/// with no leading or trailing hyphen. `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Slug for a repository name. Naming conventions put a `-baseline`
/// suffix on validation repos and `-hardening` on hardening repos; neither
/// belongs in the slug.
pub fn generate_slug(repo_name: &str) -> String {
    let lower = repo_name.to_lowercase();
    let trimmed = lower
        .strip_suffix("-baseline")
        .or_else(|| lower.strip_suffix("-hardening"))
        .unwrap_or(&lower);
    slugify(trimmed)
}

/// README phrasings of a control count, tried in order.
static CONTROL_COUNT_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?i)(\d+)\s+controls",
        r"(?i)controls:\s*(\d+)",
        r"(?i)(\d+)\s+checks",
    ]
    .map(|pattern| Regex::new(pattern).expect("control count pattern compiles"))
});

/// Control count stated in a README (`452 controls`, `Controls: 452`,
/// `452 checks`).
pub fn extract_control_count(readme: &str) -> Option<i64> {
    CONTROL_COUNT_PATTERNS.iter().find_map(|re| {
        re.captures(readme)
            .and_then(|caps| caps[1].parse::<i64>().ok())
    })
}

/// Raw URL of a file on the repository's default branch.
pub fn raw_file_url(info: &RepoInfo, path: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/{}/{}/{}/{}",
        info.owner, info.repo, info.default_branch, path
    )
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Build a candidate from repository data.
///
/// - name: inspec title, else repo description, else repo name
/// - description: inspec summary, else repo description
/// - license: inspec license, else the repo's SPDX license
pub fn build_candidate(data: &RepoData) -> CandidateRecord {
    let info = &data.repo_info;
    let profile = data.inspec_profile.as_ref();

    let name = non_empty(profile.and_then(|p| p.title.as_ref()))
        .or_else(|| non_empty(info.description.as_ref()))
        .unwrap_or_else(|| info.repo.clone());

    let mut candidate = CandidateRecord::new(name, generate_slug(&info.repo), data.content_type);
    candidate.github = Some(info.html_url.clone());
    candidate.version = non_empty(profile.and_then(|p| p.version.as_ref()));
    candidate.description = non_empty(profile.and_then(|p| p.summary.as_ref()))
        .or_else(|| non_empty(info.description.as_ref()));
    candidate.license = non_empty(profile.and_then(|p| p.license.as_ref()))
        .or_else(|| non_empty(info.license.as_ref()));
    candidate.automation_level = data.automation_level;

    if let Some(ref readme) = data.readme {
        candidate.control_count = extract_control_count(&readme.content).filter(|n| *n > 0);
        candidate.readme_url = Some(raw_file_url(info, &readme.path));
        candidate.readme_markdown = Some(readme.content.clone());
    }

    candidate
}
