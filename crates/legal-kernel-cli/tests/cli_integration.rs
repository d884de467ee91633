use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonschema::JSONSchema;
use serde_json::Value;

const THEFT_FACTS: [&str; 8] = [
    "--fact",
    "appropriates_property",
    "--fact",
    "property_belongs_to_another",
    "--fact",
    "acts_dishonestly",
    "--fact",
    "intent_to_permanently_deprive",
];

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

fn run_lk<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_lk"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute lk binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_lk(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "lk command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_str<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string at `{pointer}` in payload: {value}"))
}

fn as_u64(value: &Value, pointer: &str) -> u64 {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .unwrap_or_else(|| panic!("missing integer at `{pointer}` in payload: {value}"))
}

fn as_array<'a>(value: &'a Value, pointer: &str) -> &'a Vec<Value> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing array at `{pointer}` in payload: {value}"))
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

// Test IDs: TCLI-001
#[test]
fn config_validate_reports_builtin_knowledge() {
    let validated = run_json(["config", "validate"]);
    assert_eq!(as_str(&validated, "/contract_version"), "cli.v1");
    assert_eq!(as_u64(&validated, "/knowledge/rules"), 52);
    assert_eq!(as_u64(&validated, "/knowledge/defenses"), 19);
    assert_eq!(as_str(&validated, "/knowledge/sources/corpus"), "builtin:corpus.json");

    let shown = run_json(["config", "show"]);
    assert_eq!(as_u64(&shown, "/config/inference/max_iterations"), 100);
    assert_eq!(as_u64(&shown, "/config/search/top_k_sections"), 10);
}

// Test IDs: TCLI-002
#[test]
fn rules_list_filters_by_area() {
    let listed = run_json(["rules", "list", "--area", "regulatory"]);
    let rules = as_array(&listed, "/rules");
    assert_eq!(as_u64(&listed, "/rule_count"), 5);
    assert!(rules.iter().any(|rule| as_str(rule, "/id") == "REG_001"));
    assert!(rules.iter().all(|rule| as_str(rule, "/area") == "regulatory"));

    let output = run_lk(["rules", "list", "--area", "maritime"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown legal area"));
}

// Test IDs: TCLI-003
#[test]
fn infer_fires_theft_and_rejects_blank_facts() {
    let inferred = run_json(std::iter::once("infer").chain(THEFT_FACTS));
    assert_eq!(as_str(&inferred, "/result/fired_rules/0"), "THEFT_001");
    assert_eq!(as_array(&inferred, "/result/fired_rules").len(), 1);
    assert_eq!(as_str(&inferred, "/offences/0/citation"), "Cap. 210, s. 2");

    let output = run_lk(["infer", "--fact", "acts_dishonestly", "--fact", " "]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("validation error"));
}

// Test IDs: TCLI-004
#[test]
fn search_sections_ranks_theft_definition_first() {
    let searched = run_json([
        "search",
        "sections",
        "--query-text",
        "wallet taken from a bag",
        "--dense",
        "1,0,0,0,0,0,0,0",
        "--sparse",
        "0:1.0,1:0.8",
    ]);
    assert_eq!(as_str(&searched, "/scope"), "sections");
    assert_eq!(as_str(&searched, "/results/hits/0/unit_id"), "cap210/s2");
    assert_eq!(as_u64(&searched, "/results/hits/0/rank"), 1);
    let hits = as_array(&searched, "/results/hits");
    assert!(hits.iter().all(|hit| as_str(hit, "/unit_id") != "cap132/s54"));

    let output = run_lk(["search", "cases", "--dense", "1,0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("query error"));
}

#[test]
fn search_all_ranks_sections_and_cases_together() {
    let searched = run_json([
        "search",
        "all",
        "--query-text",
        "wallet taken from a bag",
        "--dense",
        "1,0,0,0,0,0,0,0",
        "--sparse",
        "0:1.0,1:0.8",
        "--top-k",
        "20",
    ]);
    assert_eq!(as_str(&searched, "/scope"), "all");
    let hits = as_array(&searched, "/results/hits");
    assert!(hits.iter().any(|hit| as_str(hit, "/kind") == "section"));
    assert!(hits.iter().any(|hit| as_str(hit, "/kind") == "case"));
    assert_eq!(as_u64(&searched, "/results/considered"), 22);
    validate_schema("search.response.schema.json", &searched);
}

#[test]
fn cases_find_and_stats_report_precedents() {
    let by_section = run_json(["cases", "find", "--ordinance", "200", "--section", "10"]);
    assert_eq!(as_u64(&by_section, "/case_count"), 1);
    assert_eq!(as_str(&by_section, "/cases/0/case_id"), "robbery_001");
    assert_eq!(as_u64(&by_section, "/cases/0/custodial_months"), 60);
    validate_schema("cases-find.response.schema.json", &by_section);

    let by_outcome = run_json(["cases", "find", "--outcome", "GUILTY"]);
    assert_eq!(as_u64(&by_outcome, "/case_count"), 3);
    assert_eq!(as_str(&by_outcome, "/filter/by"), "outcome");

    let output = run_lk(["cases", "find", "--section", "10"]);
    assert!(!output.status.success());
    let output = run_lk(["cases", "find", "--keyword", " "]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("validation error"));

    let stats = run_json(["cases", "stats"]);
    assert_eq!(as_u64(&stats, "/statistics/total_cases"), 9);
    assert!(stats.pointer("/statistics/appeal_success_rate").is_some_and(Value::is_null));
    validate_schema("cases-stats.response.schema.json", &stats);
}

#[test]
fn assess_robbery_uses_precedent_range() {
    let assessed = run_json(["assess", "--offence-class", "robbery"]);
    assert_eq!(as_str(&assessed, "/sentence/basis/kind"), "precedent");
    assert_eq!(as_u64(&assessed, "/sentence/basis/based_on_cases"), 1);
    assert_eq!(as_u64(&assessed, "/sentence/typical_months"), 60);
    assert_eq!(as_u64(&assessed, "/sentence/confidence"), 20);
}

// Test IDs: TCLI-005
#[test]
fn assess_smoking_is_fine_only() {
    let assessed = run_json(["assess", "--offence-class", "smoking"]);
    assert_eq!(as_str(&assessed, "/offence_class"), "smoking");
    assert_eq!(
        assessed.pointer("/sentence/fine_only").and_then(Value::as_bool),
        Some(true)
    );
    assert_eq!(
        assessed.pointer("/outcomes/custodial_likelihood").and_then(Value::as_f64),
        Some(0.0)
    );

    let output = run_lk(["assess", "--offence-class", "jaywalking"]);
    assert!(!output.status.success());
}

// Test IDs: TCLI-006
#[test]
fn analyze_is_reproducible_for_a_fixed_as_of() {
    let args = |amount: &'static str| {
        let mut args = vec!["analyze"];
        args.extend(THEFT_FACTS);
        args.extend([
            "--amount",
            amount,
            "--dense",
            "1,0,0,0,0,0,0,0",
            "--sparse",
            "0:1.0,1:0.8",
            "--as-of",
            "2026-01-15T09:30:00Z",
        ]);
        args
    };

    let first = run_json(args("50"));
    let second = run_json(args("50"));
    assert_eq!(first, second);
    assert_eq!(as_str(&first, "/report/outcome"), "offence_established");
    assert_eq!(as_str(&first, "/report/classification/class"), "petty_theft");
    assert_eq!(as_str(&first, "/report/sections/hits/0/unit_id"), "cap210/s2");
    assert_eq!(as_str(&first, "/generated_at"), "2026-01-15T09:30:00Z");

    let serious = run_json(args("8000"));
    assert_eq!(as_str(&serious, "/report/classification/class"), "serious_theft");
    assert_ne!(as_str(&serious, "/package_id"), as_str(&first, "/package_id"));

    let output = run_lk(["analyze", "--as-of", "2026-01-15T17:30:00+08:00"]);
    assert!(!output.status.success());
}

#[test]
fn analyze_reads_request_files() {
    let sandbox = unique_temp_dir("legal-kernel-cli-request");
    let request_path = sandbox.join("request.json");
    fs::write(
        &request_path,
        r#"{
  "facts": ["smoking_activity"],
  "text": "lit a cigarette on the MTR platform",
  "location_type": "public",
  "as_of": "2026-03-01T00:00:00Z"
}"#,
    )
    .unwrap_or_else(|err| panic!("failed to write request {}: {err}", request_path.display()));

    let analyzed = run_json(["analyze", "--request", path_str(&request_path)]);
    assert_eq!(as_str(&analyzed, "/report/inference/fired_rules/0"), "REG_001");
    assert_eq!(as_str(&analyzed, "/report/risk/offence_class"), "smoking");
    assert!(analyzed.pointer("/report/sections").is_some_and(Value::is_null));

    let _ = fs::remove_dir_all(&sandbox);
}

#[test]
fn config_overrides_are_applied_and_validated() {
    let sandbox = unique_temp_dir("legal-kernel-cli-config");
    let config_path = sandbox.join("kernel.yaml");
    fs::write(&config_path, "search:\n  relevance_threshold: 0.9\n  top_k_sections: 2\n")
        .unwrap_or_else(|err| panic!("failed to write config {}: {err}", config_path.display()));

    let searched = run_json([
        "--config",
        path_str(&config_path),
        "search",
        "sections",
        "--dense",
        "1,0,0,0,0,0,0,0",
        "--sparse",
        "0:1.0,1:0.8",
    ]);
    let hits = as_array(&searched, "/results/hits");
    assert_eq!(hits.len(), 1);
    assert_eq!(as_str(&searched, "/results/hits/0/unit_id"), "cap210/s2");

    let bad_path = sandbox.join("bad.yaml");
    fs::write(&bad_path, "search:\n  relevance_threshold: 2.0\n")
        .unwrap_or_else(|err| panic!("failed to write config {}: {err}", bad_path.display()));
    let output = run_lk(["--config", path_str(&bad_path), "config", "validate"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("relevance_threshold"));

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCON-001
#[test]
fn cli_outputs_validate_against_versioned_schemas() {
    let validated = run_json(["config", "validate"]);
    validate_schema("config-validate.response.schema.json", &validated);

    let inferred = run_json(std::iter::once("infer").chain(THEFT_FACTS));
    validate_schema("infer.response.schema.json", &inferred);

    let searched = run_json([
        "search",
        "cases",
        "--query-text",
        "stolen phone",
        "--dense",
        "1,0,0,0,0,0,0,0",
        "--sparse",
        "0:1.0,1:0.8",
    ]);
    validate_schema("search.response.schema.json", &searched);

    let assessed = run_json([
        "assess",
        "--offence-class",
        "robbery",
        "--aggravator",
        "weapon",
        "--mitigator",
        "guilty-plea",
        "--prior-conviction",
        "--evidence",
        "strong",
    ]);
    validate_schema("risk-profile.response.schema.json", &assessed);

    let mut analyze_args = vec!["analyze", "--text", "stole a handbag", "--amount", "300"];
    analyze_args.extend(THEFT_FACTS);
    let analyzed = run_json(analyze_args);
    validate_schema("analysis-package.response.schema.json", &analyzed);
}
