//! GitHub repository source.
//!
//! [`GitHubClient`] reads repository metadata, `inspec.yml`, and the README
//! through the GitHub REST API. Command logic depends on the [`RepoSource`]
//! trait instead of the client so it can run against a fake.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::GitHubConfig;

const USER_AGENT: &str = "saf-site-cli";
const README_NAMES: [&str; 3] = ["README.md", "readme.md", "Readme.md"];

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoInfo {
    pub owner: String,
    pub repo: String,
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
    /// SPDX identifier.
    pub license: Option<String>,
    pub topics: Vec<String>,
    pub html_url: String,
}

#[derive(Deserialize)]
struct ApiRepo {
    full_name: String,
    description: Option<String>,
    default_branch: String,
    license: Option<ApiLicense>,
    #[serde(default)]
    topics: Vec<String>,
    html_url: String,
}

#[derive(Deserialize)]
struct ApiLicense {
    spdx_id: Option<String>,
}

/// The subset of an InSpec profile's `inspec.yml` used to build content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspecProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// YAML lets authors write `version: 1.2`; it is kept as text.
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub version: Option<String>,
}

impl InspecProfile {
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A README and the path it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct Readme {
    pub path: String,
    pub content: String,
}

/// A full GitHub URL, then the `owner/repo` shorthand.
static REPO_URL_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        r"github\.com/([^/]+)/([^/]+?)(?:\.git)?(?:/.*)?$",
        r"^([^/\s:]+)/([^/\s]+)$",
    ]
    .map(|pattern| Regex::new(pattern).expect("repository URL pattern compiles"))
});

/// Extract `(owner, repo)` from a GitHub URL or `owner/repo` shorthand.
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let url = url.trim();
    for re in REPO_URL_PATTERNS.iter() {
        if let Some(caps) = re.captures(url) {
            let owner = caps[1].to_string();
            let repo = caps[2].trim_end_matches(".git").to_string();
            if owner.is_empty() || repo.is_empty() {
                return None;
            }
            return Some((owner, repo));
        }
    }
    None
}

/// Where repository data comes from.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn fetch_repo_info(&self, owner: &str, repo: &str) -> Result<RepoInfo>;

    /// `Ok(None)` when the repository has no `inspec.yml`.
    async fn fetch_inspec_profile(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<InspecProfile>>;

    /// `Ok(None)` when no README variant exists.
    async fn fetch_readme(&self, owner: &str, repo: &str, branch: &str) -> Result<Option<Readme>>;
}

/// GitHub REST API client.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header("Accept", accept);
        match self.token {
            Some(ref token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Fetch a file's raw content from `branch`, falling back to `master`.
    pub async fn fetch_raw_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Option<String> {
        let mut branches = vec![branch];
        if branch != "master" {
            branches.push("master");
        }

        for b in branches {
            let url = format!("{}/repos/{}/{}/contents/{}", self.api_url, owner, repo, path);
            let resp = self
                .get(&url, "application/vnd.github.v3.raw")
                .query(&[("ref", b)])
                .send()
                .await;
            match resp {
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(text) => return Some(text),
                    Err(e) => tracing::debug!(path, branch = b, error = %e, "failed to read body"),
                },
                Ok(resp) => {
                    tracing::debug!(path, branch = b, status = resp.status().as_u16(), "file not found")
                }
                Err(e) => tracing::debug!(path, branch = b, error = %e, "request failed"),
            }
        }
        None
    }
}

#[async_trait]
impl RepoSource for GitHubClient {
    async fn fetch_repo_info(&self, owner: &str, repo: &str) -> Result<RepoInfo> {
        let url = format!("{}/repos/{}/{}", self.api_url, owner, repo);
        let resp = self.get(&url, "application/vnd.github.v3+json").send().await?;

        let status = resp.status();
        if !status.is_success() {
            bail!(
                "GitHub API error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            );
        }

        let data: ApiRepo = resp.json().await?;
        Ok(RepoInfo {
            owner: owner.to_string(),
            repo: repo.to_string(),
            full_name: data.full_name,
            description: data.description.filter(|d| !d.is_empty()),
            default_branch: data.default_branch,
            license: data
                .license
                .and_then(|l| l.spdx_id)
                .filter(|id| !id.is_empty() && id != "NOASSERTION"),
            topics: data.topics,
            html_url: data.html_url,
        })
    }

    async fn fetch_inspec_profile(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<InspecProfile>> {
        match self.fetch_raw_file(owner, repo, "inspec.yml", branch).await {
            Some(content) => Ok(Some(InspecProfile::parse(&content)?)),
            None => Ok(None),
        }
    }

    async fn fetch_readme(&self, owner: &str, repo: &str, branch: &str) -> Result<Option<Readme>> {
        for name in README_NAMES {
            if let Some(content) = self.fetch_raw_file(owner, repo, name, branch).await {
                if !content.is_empty() {
                    return Ok(Some(Readme {
                        path: name.to_string(),
                        content,
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, token: Option<&str>) -> GitHubClient {
        GitHubClient::new(&GitHubConfig {
            api_url: server.uri(),
            timeout_secs: 5,
            token: token.map(str::to_string),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_github_url() {
        let expected = Some(("mitre".to_string(), "redhat-enterprise-linux-9-stig-baseline".to_string()));
        assert_eq!(
            parse_github_url("https://github.com/mitre/redhat-enterprise-linux-9-stig-baseline"),
            expected
        );
        assert_eq!(
            parse_github_url("https://github.com/mitre/redhat-enterprise-linux-9-stig-baseline.git"),
            expected
        );
        assert_eq!(
            parse_github_url("https://github.com/mitre/redhat-enterprise-linux-9-stig-baseline/tree/main"),
            expected
        );
        assert_eq!(
            parse_github_url("mitre/redhat-enterprise-linux-9-stig-baseline"),
            expected
        );
        assert_eq!(parse_github_url("not a url"), None);
        assert_eq!(parse_github_url("https://gitlab.com/a"), None);
    }

    #[test]
    fn test_inspec_numeric_version() {
        let profile = InspecProfile::parse(
            "name: rhel9\ntitle: RHEL 9 STIG\nversion: 1.2\nsupports:\n  - platform-name: redhat\n",
        )
        .unwrap();
        assert_eq!(profile.title.as_deref(), Some("RHEL 9 STIG"));
        assert_eq!(profile.version.as_deref(), Some("1.2"));
    }

    #[tokio::test]
    async fn test_fetch_repo_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mitre/rhel9-stig-baseline"))
            .and(header("Authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "mitre/rhel9-stig-baseline",
                "description": "RHEL 9 STIG profile",
                "default_branch": "main",
                "license": { "spdx_id": "Apache-2.0" },
                "topics": ["inspec"],
                "html_url": "https://github.com/mitre/rhel9-stig-baseline"
            })))
            .mount(&server)
            .await;

        let info = client(&server, Some("ghp_test"))
            .fetch_repo_info("mitre", "rhel9-stig-baseline")
            .await
            .unwrap();
        assert_eq!(info.default_branch, "main");
        assert_eq!(info.license.as_deref(), Some("Apache-2.0"));
        assert_eq!(info.topics, vec!["inspec".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_repo_info_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mitre/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .fetch_repo_info("mitre", "missing")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("GitHub API error: 404"));
    }

    #[tokio::test]
    async fn test_raw_file_falls_back_to_master() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mitre/p/contents/inspec.yml"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/mitre/p/contents/inspec.yml"))
            .and(query_param("ref", "master"))
            .and(header("Accept", "application/vnd.github.v3.raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string("name: p\nversion: 2.1.0\n"))
            .mount(&server)
            .await;

        let profile = client(&server, None)
            .fetch_inspec_profile("mitre", "p", "main")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.version.as_deref(), Some("2.1.0"));
    }

    #[tokio::test]
    async fn test_readme_variants() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/mitre/p/contents/readme.md"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# P\n\n452 controls"))
            .mount(&server)
            .await;

        let gh = client(&server, None);
        let readme = gh.fetch_readme("mitre", "p", "main").await.unwrap().unwrap();
        assert_eq!(readme.path, "readme.md");
        assert!(readme.content.contains("452 controls"));

        assert!(gh.fetch_readme("mitre", "other", "main").await.unwrap().is_none());
    }
}
