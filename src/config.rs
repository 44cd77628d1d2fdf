use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub pocketbase: PocketBaseConfig,
    #[serde(default)]
    pub github: GitHubConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `sqlite` (local database) or `pocketbase` (remote collection store).
    #[serde(default = "default_backend")]
    pub backend: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/saf.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct PocketBaseConfig {
    #[serde(default = "default_pb_url")]
    pub url: String,
    #[serde(default = "default_pb_email")]
    pub email: String,
    #[serde(default = "default_pb_password")]
    pub password: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PocketBaseConfig {
    fn default() -> Self {
        Self {
            url: default_pb_url(),
            email: default_pb_email(),
            password: default_pb_password(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Local development credentials.
fn default_pb_url() -> String {
    "http://localhost:8090".to_string()
}
fn default_pb_email() -> String {
    "admin@localhost.com".to_string()
}
fn default_pb_password() -> String {
    "testpassword123".to_string()
}
fn default_page_size() -> usize {
    500
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Usually supplied through `GITHUB_TOKEN` rather than the file.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            timeout_secs: default_timeout_secs(),
            token: None,
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

impl Config {
    /// Defaults for every section, used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig::default(),
            db: DbConfig::default(),
            pocketbase: PocketBaseConfig::default(),
            github: GitHubConfig::default(),
        }
    }

    /// Apply `PB_URL`, `PB_EMAIL`, `PB_PASSWORD`, and `GITHUB_TOKEN`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PB_URL") {
            self.pocketbase.url = url;
        }
        if let Some(email) = lookup("PB_EMAIL") {
            self.pocketbase.email = email;
        }
        if let Some(password) = lookup("PB_PASSWORD") {
            self.pocketbase.password = password;
        }
        if let Some(token) = lookup("GITHUB_TOKEN").filter(|t| !t.is_empty()) {
            self.github.token = Some(token);
        }
    }

    fn validate(&self) -> Result<()> {
        match self.store.backend.as_str() {
            "sqlite" | "pocketbase" => {}
            other => anyhow::bail!(
                "Unknown store backend: '{}'. Must be sqlite or pocketbase.",
                other
            ),
        }

        if self.pocketbase.page_size == 0 {
            anyhow::bail!("pocketbase.page_size must be > 0");
        }

        if !self.pocketbase.url.starts_with("http://") && !self.pocketbase.url.starts_with("https://")
        {
            anyhow::bail!("pocketbase.url must be an http(s) URL");
        }

        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load the config file, or fall back to defaults plus environment
/// overrides when the file does not exist.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    tracing::debug!(path = %path.display(), "config file not found, using defaults");
    let mut config = Config::minimal();
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, "sqlite");
        assert_eq!(config.pocketbase.page_size, 500);
        assert_eq!(config.github.api_url, "https://api.github.com");
    }

    #[test]
    fn test_sections_parse() {
        let config: Config = toml::from_str(
            r#"
[store]
backend = "pocketbase"

[db]
path = "/tmp/x.sqlite"

[pocketbase]
url = "http://pb:8090"
page_size = 50
"#,
        )
        .unwrap();
        assert_eq!(config.store.backend, "pocketbase");
        assert_eq!(config.db.path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.pocketbase.url, "http://pb:8090");
        assert_eq!(config.pocketbase.page_size, 50);
        assert_eq!(config.pocketbase.email, "admin@localhost.com");
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PB_URL", "https://pb.example.org"),
            ("PB_PASSWORD", "s3cret"),
            ("GITHUB_TOKEN", "ghp_abc"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::minimal();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.pocketbase.url, "https://pb.example.org");
        assert_eq!(config.pocketbase.password, "s3cret");
        assert_eq!(config.pocketbase.email, "admin@localhost.com");
        assert_eq!(config.github.token.as_deref(), Some("ghp_abc"));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let config: Config = toml::from_str("[store]\nbackend = \"mongo\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown store backend"));
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let config: Config = toml::from_str("[pocketbase]\npage_size = 0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
