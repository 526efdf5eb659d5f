use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn inboxdb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("inboxdb");
    path
}

fn write_envelope(root: &Path, rel: &str, json: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, json).unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let mail = root.join("mail");
    write_envelope(
        &mail,
        "work/invoice.json",
        r#"{
  "id": "invoice-1",
  "account": "work",
  "date": "Mon, 15 Jan 2024 10:00:00 +0000",
  "subject": "Invoice for January",
  "from": "Alice Smith <alice@example.com>",
  "to": ["bob@example.com"],
  "body": "Please find the invoice attached. Payment is due in thirty days.",
  "attachments": ["invoice-jan.pdf"],
  "labels": ["finance"]
}"#,
    );
    write_envelope(
        &mail,
        "work/standup.json",
        r#"{
  "id": "standup-1",
  "account": "work",
  "date": "2024-02-01T09:30:00Z",
  "subject": "Standup notes",
  "from": "carol@example.com",
  "to": "bob@example.com, dave@example.com",
  "body": "Deployment moved to Thursday. Kubernetes upgrade is blocked.",
  "labels": ["team"]
}"#,
    );
    write_envelope(
        &mail,
        "home/offer.json",
        r#"{
  "account": "home",
  "subject": "Limited offer",
  "from": "promo@shop.example",
  "to": "bob@home.example",
  "body": "Cheap watches, today only.",
  "labels": ["spam"]
}"#,
    );

    let config_content = format!(
        r#"[db]
path = "{}/data/inbox.sqlite"

[source]
root = "{}/mail"
include_globs = ["**/*.json"]

[index]
commit_interval = 2

[search]
default_limit = 20
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("inboxdb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_inboxdb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = inboxdb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "inboxdb=warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run inboxdb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn indexed_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    run_inboxdb(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_inboxdb(&config_path, &["ingest", "--index", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_inboxdb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("inbox.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_inboxdb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_inboxdb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_counts_and_unchanged_rerun() {
    let (tmp, config_path) = setup_test_env();
    run_inboxdb(&config_path, &["init"]);

    let (stdout, stderr, success) = run_inboxdb(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("scanned: 3 files"), "got: {}", stdout);
    assert!(stdout.contains("new: 3"), "got: {}", stdout);

    let (stdout, _, _) = run_inboxdb(&config_path, &["ingest"]);
    assert!(stdout.contains("new: 0"), "got: {}", stdout);
    assert!(stdout.contains("unchanged: 3"), "got: {}", stdout);

    write_envelope(
        &tmp.path().join("mail"),
        "work/standup.json",
        r#"{"id": "standup-1", "account": "work", "subject": "Standup notes v2"}"#,
    );
    let (stdout, _, _) = run_inboxdb(&config_path, &["ingest"]);
    assert!(stdout.contains("changed: 1"), "got: {}", stdout);
}

#[test]
fn test_invalid_envelope_is_skipped() {
    let (tmp, config_path) = setup_test_env();
    write_envelope(&tmp.path().join("mail"), "work/broken.json", "{ not json");
    run_inboxdb(&config_path, &["init"]);

    let (stdout, _, success) = run_inboxdb(&config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("new: 3"), "got: {}", stdout);
    assert!(stdout.contains("invalid: 1"), "got: {}", stdout);
}

#[test]
fn test_ingest_without_index_is_not_searchable() {
    let (_tmp, config_path) = setup_test_env();
    run_inboxdb(&config_path, &["init"]);
    run_inboxdb(&config_path, &["ingest"]);

    let (stdout, _, success) = run_inboxdb(&config_path, &["search", "invoice"]);
    assert!(success);
    assert!(stdout.contains("No results"), "got: {}", stdout);

    let (stdout, _, success) = run_inboxdb(&config_path, &["reindex", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("reindex: completed"), "got: {}", stdout);
    assert!(stdout.contains("indexed: 3"), "got: {}", stdout);

    let (stdout, _, _) = run_inboxdb(&config_path, &["search", "invoice"]);
    assert!(stdout.contains("Invoice for January"), "got: {}", stdout);
}

#[test]
fn test_search_keyword_and_filters() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_inboxdb(&config_path, &["search", "kubernetes"]);
    assert!(success, "search failed");
    assert!(stdout.contains("Standup notes"), "got: {}", stdout);
    assert!(stdout.contains("id: standup-1"), "got: {}", stdout);

    let (stdout, _, _) = run_inboxdb(&config_path, &["search", "from:alice@example.com"]);
    assert!(stdout.contains("Invoice for January"), "got: {}", stdout);
    assert!(!stdout.contains("Standup notes"), "got: {}", stdout);

    let (stdout, _, _) = run_inboxdb(&config_path, &["search", "has:attachment"]);
    assert!(stdout.contains("invoice-1"), "got: {}", stdout);
    assert!(!stdout.contains("standup-1"), "got: {}", stdout);

    let (stdout, stderr, success) = run_inboxdb(&config_path, &["search", "-label:spam"]);
    assert!(success, "leading exclusion failed: {}", stderr);
    assert!(!stdout.contains("Limited offer"), "got: {}", stdout);
    assert!(stdout.contains("Standup notes"), "got: {}", stdout);
}

#[test]
fn test_search_query_starting_with_exclusion() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, stderr, success) =
        run_inboxdb(&config_path, &["search", "-kubernetes bob", "--json"]);
    assert!(success, "leading exclusion failed: {}", stderr);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<&str> = page["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"invoice-1"), "got: {:?}", ids);
    assert!(!ids.contains(&"standup-1"), "got: {:?}", ids);
}

#[test]
fn test_search_grouped_query() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, stderr, success) =
        run_inboxdb(&config_path, &["search", "invoice (payment OR receipt)"]);
    assert!(success, "grouped query failed: {}", stderr);
    assert!(stdout.contains("Invoice for January"), "got: {}", stdout);

    let (_, stderr, success) = run_inboxdb(&config_path, &["search", "invoice -(draft memo)"]);
    assert!(!success);
    assert!(stderr.contains("Cannot exclude a group"), "got: {}", stderr);
}

#[test]
fn test_search_account_scope() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, _) = run_inboxdb(&config_path, &["search", "bob", "--account", "home"]);
    assert!(stdout.contains("Limited offer"), "got: {}", stdout);
    assert!(!stdout.contains("Invoice"), "got: {}", stdout);
}

#[test]
fn test_search_json() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) =
        run_inboxdb(&config_path, &["search", "label:team", "--json", "--sort", "relevance"]);
    assert!(success);
    let page: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(page["hits"][0]["id"], "standup-1");
    assert_eq!(page["has_more"], false);
    assert_eq!(page["effective_sort"], "date_desc");
}

#[test]
fn test_search_syntax_error() {
    let (_tmp, config_path) = indexed_env();

    let (_, stderr, success) = run_inboxdb(&config_path, &["search", "invoice OR OR memo"]);
    assert!(!success, "Malformed query should fail");
    assert!(
        stderr.contains("consecutive OR"),
        "Should explain the problem, got: {}",
        stderr
    );

    let (_, stderr, success) = run_inboxdb(&config_path, &["search", "before:2024-13-01"]);
    assert!(!success);
    assert!(stderr.contains("2024-13-01"), "got: {}", stderr);
}

#[test]
fn test_search_metacharacters_do_not_fail() {
    let (_tmp, config_path) = indexed_env();

    for query in ["C++", "e-mail", "don't", "NEAR", "a*b", "50%"] {
        let (_, stderr, success) = run_inboxdb(&config_path, &["search", query]);
        assert!(success, "query {:?} failed: {}", query, stderr);
    }
}

#[test]
fn test_search_empty_query_lists_by_date() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_inboxdb(&config_path, &["search", ""]);
    assert!(success, "Empty query should not fail");
    let standup = stdout.find("Standup notes").unwrap();
    let invoice = stdout.find("Invoice for January").unwrap();
    assert!(standup < invoice, "expected newest first, got: {}", stdout);
}

#[test]
fn test_reindex_up_to_date() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_inboxdb(&config_path, &["reindex", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("up to date"), "got: {}", stdout);
}

#[test]
fn test_reindex_force_single_id() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_inboxdb(
        &config_path,
        &["reindex", "--id", "invoice-1", "--force", "--progress", "off"],
    );
    assert!(success);
    assert!(stdout.contains("indexed: 1"), "got: {}", stdout);
    assert!(stdout.contains("pruned entries: 1"), "got: {}", stdout);

    let (stdout, _, _) = run_inboxdb(&config_path, &["db-check"]);
    assert!(stdout.contains("OK"), "got: {}", stdout);
}

#[test]
fn test_reindex_unknown_id() {
    let (_tmp, config_path) = indexed_env();

    let (_, stderr, success) = run_inboxdb(&config_path, &["reindex", "--id", "nope"]);
    assert!(!success);
    assert!(stderr.contains("nope"), "got: {}", stderr);
}

#[test]
fn test_reindex_rejects_zero_interval() {
    let (_tmp, config_path) = indexed_env();

    let (_, stderr, success) =
        run_inboxdb(&config_path, &["reindex", "--commit-interval", "0"]);
    assert!(!success);
    assert!(stderr.contains("commit-interval"), "got: {}", stderr);
}

#[test]
fn test_db_check_healthy_and_missing() {
    let (_tmp, config_path) = setup_test_env();
    run_inboxdb(&config_path, &["init"]);
    run_inboxdb(&config_path, &["ingest"]);

    let (stdout, _, success) = run_inboxdb(&config_path, &["db-check", "--verbose"]);
    assert!(!success, "missing documents should fail the check");
    assert!(stdout.contains("missing from index: 3"), "got: {}", stdout);
    assert!(stdout.contains("inboxdb reindex"), "got: {}", stdout);

    run_inboxdb(&config_path, &["reindex", "--progress", "off"]);
    let (stdout, _, success) = run_inboxdb(&config_path, &["db-check", "--json"]);
    assert!(success);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["documents"], 3);
    assert_eq!(report["index_entries"], 3);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = indexed_env();

    let (stdout, _, success) = run_inboxdb(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"), "got: {}", stdout);
    assert!(stdout.contains("work"), "got: {}", stdout);
    assert!(stdout.contains("home"), "got: {}", stdout);
}

#[test]
fn test_missing_source_section() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("inboxdb.toml");
    fs::write(
        &config_path,
        format!("[db]\npath = \"{}/inbox.sqlite\"\n", tmp.path().display()),
    )
    .unwrap();

    run_inboxdb(&config_path, &["init"]);
    let (_, stderr, success) = run_inboxdb(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("[source]"), "got: {}", stderr);
}
