use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPO_URL: &str = "https://github.com/mitre/rhel-9-stig-baseline";

fn saf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("saf");
    path
}

fn setup_test_env(github_api: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
backend = "sqlite"

[db]
path = "{}/data/saf.sqlite"

[github]
api_url = "{}"
timeout_secs = 5
"#,
        root.display(),
        github_api
    );

    let config_path = config_dir.join("saf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_saf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = saf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run saf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run_saf_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_saf(&config_path, &args)
    })
    .await
    .unwrap()
}

fn parse_json(stdout: &str) -> Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

/// Create a record and return its id.
fn add_record(config_path: &Path, table: &str, data: &str) -> String {
    let (stdout, stderr, success) = run_saf(config_path, &["--quiet", "table", "add", table, "--data", data]);
    assert!(success, "table add failed: stdout={}, stderr={}", stdout, stderr);
    stdout.trim().to_string()
}

async fn mock_github() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/mitre/rhel-9-stig-baseline"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "full_name": "mitre/rhel-9-stig-baseline",
            "description": "InSpec profile for RHEL 9",
            "default_branch": "main",
            "license": { "spdx_id": "Apache-2.0" },
            "topics": ["inspec"],
            "html_url": REPO_URL
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/mitre/rhel-9-stig-baseline/contents/inspec.yml"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "name: rhel-9-stig-baseline\ntitle: Red Hat Enterprise Linux 9 STIG\nversion: 1.2.0\nsummary: Validates RHEL 9 against the DISA STIG\n",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/mitre/rhel-9-stig-baseline/contents/README.md"))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# RHEL 9\n\nThis profile has 452 controls."))
        .mount(&server)
        .await;
    server
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, stderr, success) = run_saf(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/saf.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (_, _, success1) = run_saf(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_saf(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_database_asks_for_init() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (_, stderr, success) = run_saf(&config_path, &["content", "list"]);
    assert!(!success);
    assert!(stderr.contains("Run `saf init` first"), "stderr={}", stderr);
}

#[test]
fn test_table_crud() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_saf(&config_path, &["init"]);

    let id = add_record(&config_path, "organizations", r#"{"name":"MITRE","short_name":"MITRE"}"#);
    assert_eq!(id.len(), 15);

    let (stdout, _, success) = run_saf(&config_path, &["--json", "table", "show", "organizations", &id]);
    assert!(success);
    assert_eq!(parse_json(&stdout)["name"], "MITRE");

    let (_, stderr, success) = run_saf(
        &config_path,
        &["table", "update", "organizations", &id, "--data", r#"{"description":"Nonprofit"}"#],
    );
    assert!(success, "update failed: {}", stderr);

    let (stdout, _, success) = run_saf(
        &config_path,
        &["--json", "table", "list", "organizations", "--filter", "name=MITRE"],
    );
    assert!(success);
    let rows = parse_json(&stdout);
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["description"], "Nonprofit");

    let (stdout, _, success) = run_saf(&config_path, &["table", "list", "organizations"]);
    assert!(success);
    assert!(stdout.starts_with("organizations (1 records)"));

    let (stdout, _, success) = run_saf(&config_path, &["--json", "table", "delete", "organizations", &id, "--yes"]);
    assert!(success);
    assert_eq!(parse_json(&stdout), serde_json::json!({ "success": true, "deleted": id }));
}

#[test]
fn test_table_delete_requires_yes() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_saf(&config_path, &["init"]);
    let id = add_record(&config_path, "tags", r#"{"name":"linux"}"#);

    let (_, stderr, success) = run_saf(&config_path, &["--quiet", "table", "delete", "tags", &id]);
    assert!(!success);
    assert!(stderr.contains("Use --yes to confirm deletion"));
}

#[test]
fn test_table_rejects_v_prefixed_version() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_saf(&config_path, &["init"]);

    let (_, stderr, success) = run_saf(
        &config_path,
        &["table", "add", "tools", "--data", r#"{"name":"Heimdall","version":"v2.0.0"}"#],
    );
    assert!(!success);
    assert!(stderr.contains("must start with a digit"), "stderr={}", stderr);

    add_record(&config_path, "tools", r#"{"name":"Heimdall","version":"2.0.0"}"#);
}

#[test]
fn test_json_error_shape() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_saf(&config_path, &["init"]);

    let (stdout, _, success) = run_saf(&config_path, &["--json", "table", "show", "organizations", "missing"]);
    assert!(!success);
    let body = parse_json(&stdout);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0], "Record not found: organizations/missing");

    let (stdout, _, success) = run_saf(&config_path, &["--json", "table", "list", "users"]);
    assert!(!success);
    assert!(parse_json(&stdout)["errors"][0]
        .as_str()
        .unwrap()
        .starts_with("Unknown table: \"users\""));
}

#[test]
fn test_db_commands_on_clean_database() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_saf(&config_path, &["init"]);
    add_record(&config_path, "organizations", r#"{"name":"MITRE"}"#);

    let (stdout, _, success) = run_saf(&config_path, &["--json", "db", "status"]);
    assert!(success);
    let status = parse_json(&stdout);
    assert_eq!(status["backend"], "sqlite");
    assert_eq!(status["healthy"], true);

    let (stdout, _, success) = run_saf(&config_path, &["--json", "db", "lookups", "organizations"]);
    assert!(success);
    assert!(parse_json(&stdout)["organizations"]["mitre"].is_string());

    let (_, _, success) = run_saf(&config_path, &["db", "validate"]);
    assert!(success);

    let (stdout, _, success) = run_saf(&config_path, &["db", "audit"]);
    assert!(success);
    assert!(stdout.contains("Compliant: 0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_content_add_resolves_references_and_diffs() {
    let github = mock_github().await;
    let (_tmp, config_path) = setup_test_env(&github.uri());
    run_saf_async(&config_path, &["init"]).await;

    let org = add_record(&config_path, "organizations", r#"{"name":"MITRE"}"#);
    let target = add_record(&config_path, "targets", r#"{"name":"Red Hat Enterprise Linux 9"}"#);

    let args = [
        "--json",
        "content",
        "add",
        REPO_URL,
        "--type",
        "validation",
        "--vendor",
        "mitre",
        "--target",
        "red hat enterprise linux 9",
    ];
    let (stdout, stderr, success) = run_saf_async(&config_path, &args).await;
    assert!(success, "add failed: stdout={}, stderr={}", stdout, stderr);
    let body = parse_json(&stdout);
    assert_eq!(body["result"]["action"], "created");
    assert_eq!(body["content"]["slug"], "rhel-9-stig");
    assert_eq!(body["content"]["vendor"], org.as_str());
    assert_eq!(body["content"]["target"], target.as_str());
    assert_eq!(body["content"]["control_count"], 452);
    let id = body["result"]["id"].as_str().unwrap().to_string();

    // Same input again writes nothing.
    let (stdout, _, success) = run_saf_async(&config_path, &args).await;
    assert!(success);
    assert_eq!(parse_json(&stdout)["result"]["action"], "unchanged");

    let (stdout, _, success) = run_saf_async(&config_path, &["content", "show", &id]).await;
    assert!(success);
    assert!(stdout.contains("Red Hat Enterprise Linux 9"));
    assert!(stdout.contains("MITRE"));

    let (stdout, _, success) = run_saf_async(
        &config_path,
        &["--json", "content", "update", &id, "--status", "beta", "--version", "1.2.0"],
    )
    .await;
    assert!(success);
    let body = parse_json(&stdout);
    assert_eq!(body["hasChanges"], true);
    assert!(body["changes"]["status"].is_object());
    assert!(body["changes"].get("version").is_none());

    // Re-adding keeps the status set by hand.
    let (stdout, _, success) = run_saf_async(&config_path, &args).await;
    assert!(success);
    assert_eq!(parse_json(&stdout)["result"]["action"], "unchanged");

    let (stdout, _, success) = run_saf_async(
        &config_path,
        &[
            "--json",
            "content",
            "update",
            &id,
            "--stig-id",
            "RHEL-09-010001",
            "--benchmark-version",
            "V1R3",
        ],
    )
    .await;
    assert!(success);
    let body = parse_json(&stdout);
    assert_eq!(body["changes"]["stig_id"]["new"], "RHEL-09-010001");
    assert_eq!(body["changes"]["benchmark_version"]["new"], "V1R3");

    let (stdout, _, success) =
        run_saf_async(&config_path, &["--json", "content", "show", &id]).await;
    assert!(success);
    let body = parse_json(&stdout);
    assert_eq!(body["status"], "beta");
    assert_eq!(body["stig_id"], "RHEL-09-010001");

    let (_, stderr, success) =
        run_saf_async(&config_path, &["content", "update", &id, "--version", "v1.3.0"]).await;
    assert!(!success);
    assert!(stderr.contains("must start with a digit"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_content_add_unresolved_reference_fails() {
    let github = mock_github().await;
    let (_tmp, config_path) = setup_test_env(&github.uri());
    run_saf_async(&config_path, &["init"]).await;

    let (stdout, _, success) = run_saf_async(
        &config_path,
        &["--json", "content", "add", REPO_URL, "--type", "validation", "--vendor", "Unknown Inc"],
    )
    .await;
    assert!(!success);
    let body = parse_json(&stdout);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0], "Could not resolve vendor: \"Unknown Inc\"");

    let (stdout, _, _) = run_saf_async(&config_path, &["--quiet", "content", "list"]).await;
    assert!(stdout.trim().is_empty());
}

#[test]
fn test_content_add_invalid_url() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_saf(&config_path, &["init"]);

    let (stdout, _, success) = run_saf(
        &config_path,
        &["--json", "content", "add", "not-a-url", "--type", "validation"],
    );
    assert!(!success);
    assert_eq!(parse_json(&stdout)["errors"][0], "Invalid GitHub URL");
}
