use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonschema::JSONSchema;
use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_cb<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_cb"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute cb binary: {err}"))
}

fn run_text<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_cb(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "cb command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let stdout = run_text(args);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn fixture(name: &str) -> PathBuf {
    repo_root().join("contracts/v1/fixtures").join(name)
}

fn read_json_file(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read JSON file {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse JSON file {}: {err}", path.display()))
}

fn validate_schema(schema_file: &str, instance: &Value) {
    let schema_path = repo_root().join("contracts/v1/schemas").join(schema_file);
    let schema_json = read_json_file(&schema_path);
    let compiled = JSONSchema::compile(&schema_json)
        .unwrap_or_else(|err| panic!("failed to compile schema {}: {err}", schema_path.display()));

    let errors = compiled
        .validate(instance)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>());
    if let Some(errors) = errors {
        panic!("schema validation failed for {}:\n{}", schema_file, errors.join("\n"));
    }
}

fn row_summary(board: &Value) -> Vec<(String, String)> {
    board
        .get("rows")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("board should carry rows: {board}"))
        .iter()
        .map(|row| (as_str(row, "case_name").to_string(), as_str(row, "status").to_string()))
        .collect()
}

#[test]
fn board_build_orders_rows_and_matches_contract() {
    let dir = unique_temp_dir("cb-build");
    let db = dir.join("caseboard.sqlite3");
    let snapshot = fixture("snapshot.json");

    let board = run_json(["--db", path_str(&db), "board", "build", "--snapshot", path_str(&snapshot)]);
    validate_schema("board-build.response.schema.json", &board);

    assert_eq!(
        row_summary(&board),
        vec![
            ("Alpha".to_string(), "inprogress".to_string()),
            ("Echo".to_string(), "QUICK".to_string()),
            ("Charlie".to_string(), "CUrequest".to_string()),
            ("Charlie".to_string(), "clerk".to_string()),
            ("Bravo".to_string(), "close".to_string()),
        ]
    );
    assert_eq!(as_i64(&board, "cases_seen"), 4);

    let rows = &board["rows"];
    assert_eq!(as_str(&rows[0], "filing_time"), "2024-03-03 10:15");
    assert_eq!(as_str(&rows[0], "last_editor"), "Reporter");
    assert_eq!(as_str(&rows[0], "last_attendant"), "ClerkA");
    assert_eq!(as_str(&rows[0], "last_attendant_time"), "2024-03-04 09:30");
    assert_eq!(as_str(&rows[2], "filing_time"), "Unknown");
    assert_eq!(as_str(&rows[2], "last_attendant"), "");
    assert_eq!(as_str(&rows[4], "filing_time"), "2024-03-01 08:00");
    assert_eq!(as_str(&rows[4], "last_attendant"), "CheckerA");

    let skipped = board["skipped"]
        .as_array()
        .unwrap_or_else(|| panic!("board should carry skipped entries: {board}"));
    assert_eq!(skipped.len(), 1);
    assert_eq!(as_str(&skipped[0], "title"), "Wikipedia:Sockpuppet investigations/Delta");
}

#[test]
fn board_render_prints_wikitext() {
    let dir = unique_temp_dir("cb-render");
    let db = dir.join("caseboard.sqlite3");
    let snapshot = fixture("snapshot.json");

    let rendered =
        run_text(["--db", path_str(&db), "board", "render", "--snapshot", path_str(&snapshot)]);
    let lines = rendered.lines().collect::<Vec<_>>();
    assert_eq!(lines.first().copied(), Some("{{SPIstatusheader}}"));
    assert_eq!(lines.last().copied(), Some("|}"));
    assert_eq!(lines.len(), 7);
    assert_eq!(
        lines[1],
        "{{SPIstatusentry|Alpha|inprogress|2024-03-03 10:15|Reporter|2024-03-05 12:00|ClerkA|2024-03-04 09:30}}"
    );
}

#[test]
fn config_overrides_location_and_names() {
    let dir = unique_temp_dir("cb-config");
    let db = dir.join("caseboard.sqlite3");
    let snapshot = fixture("snapshot.json");
    let config = fixture("config.yaml");

    let rendered = run_text([
        "--db",
        path_str(&db),
        "--config",
        path_str(&config),
        "board",
        "render",
        "--snapshot",
        path_str(&snapshot),
    ]);
    assert!(rendered.contains("|Clerk A|2024-03-04 09:30}}"));

    let published = run_json([
        "--db",
        path_str(&db),
        "--config",
        path_str(&config),
        "board",
        "publish",
        "--snapshot",
        path_str(&snapshot),
    ]);
    assert_eq!(as_str(&published, "table_location"), "User:Example/SPI case list");
}

#[test]
fn publish_history_and_show_round_trip() {
    let dir = unique_temp_dir("cb-publish");
    let db = dir.join("caseboard.sqlite3");
    let snapshot = fixture("snapshot.json");

    let first =
        run_json(["--db", path_str(&db), "board", "publish", "--snapshot", path_str(&snapshot)]);
    validate_schema("board-publish.response.schema.json", &first);
    assert_eq!(as_str(&first, "status"), "saved");
    assert_eq!(as_str(&first, "summary"), "Updating SPI case list (5 active reports)");
    assert_eq!(as_i64(&first, "row_count"), 5);
    assert_eq!(as_i64(&first, "skipped_count"), 1);

    let second =
        run_json(["--db", path_str(&db), "board", "publish", "--snapshot", path_str(&snapshot)]);
    validate_schema("board-publish.response.schema.json", &second);
    assert_eq!(as_str(&second, "status"), "unchanged");
    assert_eq!(as_str(&second, "revision_id"), as_str(&first, "revision_id"));

    let history = run_json(["--db", path_str(&db), "board", "history"]);
    validate_schema("board-history.response.schema.json", &history);
    let revisions = history["revisions"]
        .as_array()
        .unwrap_or_else(|| panic!("history should list revisions: {history}"));
    assert_eq!(revisions.len(), 1);

    let filtered =
        run_json(["--db", path_str(&db), "board", "history", "--location", "User:Nobody/list"]);
    assert_eq!(filtered["revisions"].as_array().map(Vec::len), Some(0));

    let shown = run_json([
        "--db",
        path_str(&db),
        "board",
        "show",
        "--revision-id",
        as_str(&first, "revision_id"),
    ]);
    assert_eq!(as_str(&shown, "content_sha256"), as_str(&first, "content_sha256"));
    assert!(as_str(&shown, "content").starts_with("{{SPIstatusheader}}\n"));
    assert_eq!(shown["board"]["rows"].as_array().map(Vec::len), Some(5));
}

#[test]
fn show_unknown_revision_fails() {
    let dir = unique_temp_dir("cb-show-missing");
    let db = dir.join("caseboard.sqlite3");

    let output = run_cb([
        "--db",
        path_str(&db),
        "board",
        "show",
        "--revision-id",
        "01ARZ3NDEKTSV4RRFFQ69G5FAV",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("board revision not found"), "unexpected stderr: {stderr}");
}

#[test]
fn missing_snapshot_file_fails_with_context() {
    let dir = unique_temp_dir("cb-missing-snapshot");
    let db = dir.join("caseboard.sqlite3");
    let missing = dir.join("nope.json");

    let output =
        run_cb(["--db", path_str(&db), "board", "build", "--snapshot", path_str(&missing)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read snapshot file"), "unexpected stderr: {stderr}");
}

#[test]
fn roster_parse_lists_active_clerks() {
    let roster = fixture("roster.wiki");
    let parsed = run_json(["roster", "parse", "--file", path_str(&roster)]);
    validate_schema("roster-parse.response.schema.json", &parsed);
    assert_eq!(as_i64(&parsed, "count"), 2);
    assert_eq!(parsed["clerks"], serde_json::json!(["ClerkA", "ClerkB"]));
}

#[test]
fn db_commands_match_contracts() {
    let dir = unique_temp_dir("cb-db");
    let db = dir.join("caseboard.sqlite3");

    let schema_version = run_json(["--db", path_str(&db), "db", "schema-version"]);
    validate_schema("db-schema-version.response.schema.json", &schema_version);
    assert_eq!(as_i64(&schema_version, "current_version"), 0);
    assert_eq!(schema_version["up_to_date"], Value::Bool(false));

    let dry_run = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    validate_schema("db-migrate.response.schema.json", &dry_run);
    assert_eq!(dry_run["would_apply_versions"], serde_json::json!([1]));
    assert_eq!(dry_run["after_version"], Value::Null);

    let migrate = run_json(["--db", path_str(&db), "db", "migrate"]);
    validate_schema("db-migrate.response.schema.json", &migrate);
    assert_eq!(as_i64(&migrate, "after_version"), 1);
    assert_eq!(migrate["up_to_date"], Value::Bool(true));

    let integrity = run_json(["--db", path_str(&db), "db", "integrity-check"]);
    validate_schema("db-integrity-check.response.schema.json", &integrity);
    assert_eq!(integrity["quick_check_ok"], Value::Bool(true));
    assert_eq!(as_i64(&integrity, "revision_count"), 0);
}

#[test]
fn verbose_logging_goes_to_stderr_only() {
    let dir = unique_temp_dir("cb-verbose");
    let db = dir.join("caseboard.sqlite3");
    let snapshot = fixture("snapshot.json");

    let output = run_cb([
        "-vv",
        "--db",
        path_str(&db),
        "board",
        "build",
        "--snapshot",
        path_str(&snapshot),
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|err| panic!("stdout should stay pure JSON: {err}\nstdout:\n{stdout}"));
    assert_eq!(as_str(&parsed, "contract_version"), "cli.v1");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("built case board"), "unexpected stderr: {stderr}");
}
