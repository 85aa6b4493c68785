#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const SPEC: &str = "010-checkout";

fn sl(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sl").unwrap();
    cmd.current_dir(dir.path())
        .env("SPECLEDGER_ROOT", dir.path())
        .env("HOME", dir.path())
        .env("SPECLEDGER_CACHE_DIR", dir.path().join("cache"))
        .env_remove("SPECLEDGER_AGENT")
        .env_remove("SPECLEDGER_PROJECT_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn json_out(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

fn create(dir: &TempDir, title: &str, extra: &[&str]) -> String {
    let v = json_out(
        sl(dir)
            .args(["--json", "issue", "create", "--spec", SPEC, "--title", title])
            .args(extra),
    );
    v["id"].as_str().unwrap().to_string()
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = std::process::Command::new("git")
        .args(["-c", "user.email=t@example.com", "-c", "user.name=t", "-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(out.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

// ---------------------------------------------------------------------------
// sl issue create / list / show
// ---------------------------------------------------------------------------

#[test]
fn issue_create_list_show() {
    let dir = TempDir::new().unwrap();
    let id = create(&dir, "Add payment form", &["--type", "feature", "--labels", "ui,payments"]);
    assert!(id.starts_with("SL-"));
    assert!(dir.path().join("specledger").join(SPEC).join("issues.jsonl").exists());

    sl(&dir)
        .args(["issue", "list", "--spec", SPEC])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id))
        .stdout(predicate::str::contains("Add payment form"));

    let shown = json_out(sl(&dir).args(["--json", "issue", "show", &id]));
    assert_eq!(shown["issue_type"], "feature");
    assert_eq!(shown["labels"], serde_json::json!(["ui", "payments"]));
    assert_eq!(shown["spec_context"], SPEC);

    let filtered = json_out(sl(&dir).args(["--json", "issue", "list", "--spec", SPEC, "--type", "bug"]));
    assert_eq!(filtered.as_array().unwrap().len(), 0);
}

#[test]
fn duplicate_title_needs_force() {
    let dir = TempDir::new().unwrap();
    create(&dir, "Fix login redirect", &[]);
    sl(&dir)
        .args(["issue", "create", "--spec", SPEC, "--title", "Fix login redirect"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Use --force to create anyway."));
    create(&dir, "Fix login redirect", &["--force"]);
}

#[test]
fn list_all_spans_specs() {
    let dir = TempDir::new().unwrap();
    create(&dir, "First", &[]);
    sl(&dir)
        .args(["issue", "create", "--spec", "011-search", "--title", "Second"])
        .assert()
        .success();
    let all = json_out(sl(&dir).args(["--json", "issue", "list", "--all"]));
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[test]
fn bad_inputs_are_user_errors() {
    let dir = TempDir::new().unwrap();
    sl(&dir)
        .args(["issue", "show", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("issue ID must match format SL-xxxxxx"));
    sl(&dir)
        .args(["issue", "list", "--spec", "checkout"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("spec context must match pattern ###-name"));
    sl(&dir)
        .args(["issue", "create", "--spec", SPEC, "--title", "x", "--priority", "9"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("priority must be 0..5"));
}

// ---------------------------------------------------------------------------
// sl issue update / close
// ---------------------------------------------------------------------------

#[test]
fn close_requires_complete_definition_of_done() {
    let dir = TempDir::new().unwrap();
    let id = create(&dir, "Ship checkout", &["--dod", "tests pass", "--dod", "docs updated"]);

    sl(&dir)
        .args(["issue", "close", &id])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[ ] tests pass"))
        .stderr(predicate::str::contains("definition of done incomplete"));

    sl(&dir)
        .args(["issue", "update", &id, "--check", "tests pass", "--check", "docs updated"])
        .assert()
        .success();

    let closed = json_out(sl(&dir).args(["--json", "issue", "close", &id, "--reason", "merged"]));
    assert_eq!(closed["status"], "closed");
    assert!(closed["closed_at"].is_string());
    assert_eq!(closed["notes"], "Closed: merged");
    assert!(closed["definition_of_done"]["items"][0]["verified_at"].is_string());
}

#[test]
fn update_labels_and_parent() {
    let dir = TempDir::new().unwrap();
    let epic = create(&dir, "Checkout epic", &["--type", "epic"]);
    let task = create(&dir, "Card validation", &["--labels", "ui"]);

    let v = json_out(sl(&dir).args([
        "--json", "issue", "update", &task, "--parent", &epic, "--add-label", "backend",
        "--remove-label", "ui", "--status", "in_progress",
    ]));
    assert_eq!(v["parent_id"], epic.as_str());
    assert_eq!(v["labels"], serde_json::json!(["backend"]));
    assert_eq!(v["status"], "in_progress");

    sl(&dir)
        .args(["issue", "update", &epic, "--parent", &task])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("circular"));

    let v = json_out(sl(&dir).args(["--json", "issue", "update", &task, "--parent", ""]));
    assert!(v.get("parent_id").is_none());
}

// ---------------------------------------------------------------------------
// sl issue link / ready / cycles / delete
// ---------------------------------------------------------------------------

#[test]
fn links_gate_readiness_and_refuse_cycles() {
    let dir = TempDir::new().unwrap();
    let a = create(&dir, "Schema", &[]);
    let b = create(&dir, "Endpoint", &[]);

    sl(&dir)
        .args(["issue", "link", &a, "blocks", &b])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{a} blocks {b}")));
    sl(&dir)
        .args(["issue", "link", &b, "blocks", &a])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("circular dependency"));
    sl(&dir)
        .args(["issue", "link", &a, "blocks", &a])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dependency on self"));
    sl(&dir)
        .args(["issue", "link", &a, "depends", &b])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("must be 'blocks' or 'related'"));

    let ready = json_out(sl(&dir).args(["--json", "issue", "ready", "--spec", SPEC]));
    let ids: Vec<&str> = ready.as_array().unwrap().iter().map(|i| i["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![a.as_str()]);

    sl(&dir)
        .args(["issue", "list", "--spec", SPEC, "--tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{SPEC} (2 issues)")))
        .stdout(predicate::str::contains("└── "));

    let tree = json_out(sl(&dir).args(["--json", "issue", "show", &b, "--tree"]));
    assert_eq!(tree["tree"]["blocked_by"][0]["issue"]["id"], a.as_str());

    sl(&dir).args(["issue", "unlink", &a, "blocks", &b]).assert().success();
    let ready = json_out(sl(&dir).args(["--json", "issue", "ready", "--spec", SPEC]));
    assert_eq!(ready.as_array().unwrap().len(), 2);
}

#[test]
fn related_links_are_labelled_in_cycle_report() {
    let dir = TempDir::new().unwrap();
    let a = create(&dir, "Cart totals", &[]);
    let b = create(&dir, "Tax rules", &[]);
    sl(&dir).args(["issue", "link", &a, "related", &b]).assert().success();

    let cycles = json_out(sl(&dir).args(["--json", "issue", "cycles", "--spec", SPEC]));
    let cycles = cycles.as_array().unwrap();
    assert!(!cycles.is_empty());
    assert!(cycles.iter().all(|c| c["related"] == true));

    sl(&dir)
        .args(["issue", "cycles", "--spec", SPEC])
        .assert()
        .success()
        .stdout(predicate::str::contains("Related links"));
}

#[test]
fn delete_strips_references() {
    let dir = TempDir::new().unwrap();
    let a = create(&dir, "Old plan", &[]);
    let b = create(&dir, "Follow-up", &[]);
    sl(&dir).args(["issue", "link", &a, "blocks", &b]).assert().success();
    sl(&dir).args(["issue", "delete", &a]).assert().success();

    let shown = json_out(sl(&dir).args(["--json", "issue", "show", &b]));
    assert!(shown.get("blocked_by").is_none());
    sl(&dir).args(["issue", "show", &a]).assert().code(1).stderr(predicate::str::contains("issue not found"));
}

// ---------------------------------------------------------------------------
// sl issue repair / migrate
// ---------------------------------------------------------------------------

#[test]
fn repair_drops_bad_lines_and_keeps_backup() {
    let dir = TempDir::new().unwrap();
    let id = create(&dir, "Survivor", &[]);
    let file = dir.path().join("specledger").join(SPEC).join("issues.jsonl");
    let mut text = std::fs::read_to_string(&file).unwrap();
    text.push_str("{not json\n");
    std::fs::write(&file, &text).unwrap();

    let report = json_out(sl(&dir).args(["--json", "issue", "repair", "--spec", SPEC]));
    assert_eq!(report["valid_lines"], 1);
    assert_eq!(report["invalid_lines"], 1);
    assert_eq!(report["skipped_lines"][0]["line_num"], 2);
    assert_eq!(std::fs::read_to_string(file.with_extension("jsonl.bak")).unwrap(), text);
    sl(&dir).args(["issue", "show", &id]).assert().success();
}

#[test]
fn migrate_without_beads_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    sl(&dir)
        .args(["issue", "migrate", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to migrate"));
}

#[test]
fn migrate_dry_run_reports_distribution() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".beads")).unwrap();
    std::fs::write(
        dir.path().join(".beads/issues.jsonl"),
        concat!(
            r#"{"id":"sl-1","title":"Wire API","status":"open","priority":1,"issue_type":"task","labels":["spec:010-checkout"],"created_at":"2025-01-01T00:00:00Z","updated_at":"2025-01-01T00:00:00Z"}"#,
            "\n"
        ),
    )
    .unwrap();

    let report = json_out(sl(&dir).args(["--json", "issue", "migrate", "--dry-run"]));
    assert_eq!(report["total_issues"], 1);
    assert_eq!(report["dry_run"], true);
    assert!(dir.path().join(".beads/issues.jsonl").exists());
    assert!(!dir.path().join("specledger").join(SPEC).join("issues.jsonl").exists());
}

// ---------------------------------------------------------------------------
// sl init / new
// ---------------------------------------------------------------------------

#[test]
fn init_writes_metadata_and_hook() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("existing-project");
    std::fs::create_dir_all(&project).unwrap();

    sl(&dir)
        .env("SPECLEDGER_ROOT", &project)
        .args(["init", "--short-code", "EP"])
        .assert()
        .success();

    let meta: serde_yaml::Value = serde_yaml::from_str(
        &std::fs::read_to_string(project.join("specledger/specledger.yaml")).unwrap(),
    )
    .unwrap();
    assert_eq!(meta["project"]["name"], "existing-project");
    assert_eq!(meta["project"]["short_code"], "ep");
    assert_eq!(meta["playbook"]["name"], "specledger");
    assert!(project.join("AGENTS.md").exists());

    let settings: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(".claude/settings.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(settings["hooks"]["PostToolUse"][0]["hooks"][0]["command"], "sl session capture");

    sl(&dir)
        .env("SPECLEDGER_ROOT", &project)
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"))
        .stderr(predicate::str::contains("--force"));
    sl(&dir)
        .env("SPECLEDGER_ROOT", &project)
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn init_migrates_legacy_mod_file() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("specledger")).unwrap();
    std::fs::write(
        dir.path().join("specledger/specledger.mod"),
        "# Project: legacy-app\n# Short Code: la\n",
    )
    .unwrap();

    let v = json_out(sl(&dir).args(["--json", "init"]));
    assert_eq!(v["migrated"], true);
    assert_eq!(v["project"]["name"], "legacy-app");
    assert!(dir.path().join("specledger/specledger.yaml").exists());
}

#[test]
fn new_in_ci_mode() {
    let dir = TempDir::new().unwrap();
    sl(&dir)
        .args(["new", "--ci", "--no-git", "--project-name", "demo-app", "--short-code", "TPCIX"])
        .arg("--project-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Project created"));

    let project = dir.path().join("demo-app");
    let meta: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(project.join("specledger/specledger.yaml")).unwrap())
            .unwrap();
    assert_eq!(meta["project"]["short_code"], "tpci");
    assert!(!meta["playbook"]["structure"].as_sequence().unwrap().is_empty());
    assert!(project.join("scripts/new-feature.sh").exists());

    sl(&dir)
        .args(["new", "--ci", "--no-git", "--project-name", "demo-app", "--short-code", "dm"])
        .arg("--project-dir")
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn new_in_ci_mode_requires_flags() {
    let dir = TempDir::new().unwrap();
    sl(&dir)
        .args(["new", "--ci", "--short-code", "dm"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--project-name flag is required"));
}

// ---------------------------------------------------------------------------
// sl deps
// ---------------------------------------------------------------------------

#[test]
fn deps_add_list_remove() {
    let dir = TempDir::new().unwrap();
    sl(&dir).args(["init", "--short-code", "dp"]).assert().success();

    sl(&dir)
        .args(["deps", "add", "git@github.com:acme/platform-spec", "--path", "specs/api.md", "--alias", "platform"])
        .assert()
        .success();
    let manifest = std::fs::read_to_string(dir.path().join("spec.mod")).unwrap();
    assert!(manifest.starts_with("# SpecLedger Dependency Manifest v1.0.0\n"));
    assert!(manifest.contains("require git@github.com:acme/platform-spec #main specs/api.md --alias platform"));

    sl(&dir)
        .args(["deps", "add", "git@github.com:acme/other", "--alias", "platform"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("duplicate dependency"));
    sl(&dir)
        .args(["deps", "add", "not a url"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid repository url"));

    let listed = json_out(sl(&dir).args(["--json", "deps", "list"]));
    assert_eq!(listed["dependencies"][0]["alias"], "platform");
    assert!(listed["dependencies"][0]["locked_commit"].is_null());
    assert!(listed["id"].as_str().unwrap().starts_with("spec-"));

    let meta = std::fs::read_to_string(dir.path().join("specledger/specledger.yaml")).unwrap();
    assert!(meta.contains("@platform/specs/api.md"));

    sl(&dir).args(["deps", "remove", "platform"]).assert().success();
    let listed = json_out(sl(&dir).args(["--json", "deps", "list"]));
    assert_eq!(listed["dependencies"].as_array().unwrap().len(), 0);
    sl(&dir)
        .args(["deps", "remove", "platform"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dependency not found"));
}

#[test]
fn deps_add_accepts_host_and_repo_only_https_url() {
    let dir = TempDir::new().unwrap();
    sl(&dir).args(["init", "--short-code", "rr"]).assert().success();
    sl(&dir)
        .args(["deps", "add", "https://example.com/r.git", "--path", "specs/a.md"])
        .assert()
        .success();
    let manifest = std::fs::read_to_string(dir.path().join("spec.mod")).unwrap();
    assert!(manifest.contains("require https://example.com/r.git #main specs/a.md"));
    let listed = json_out(sl(&dir).args(["--json", "deps", "list"]));
    assert_eq!(listed["dependencies"][0]["repository_url"], "https://example.com/r.git");

    let meta = std::fs::read_to_string(dir.path().join("specledger/specledger.yaml")).unwrap();
    assert!(!meta.contains("example.com/r.git"));
    sl(&dir).args(["deps", "remove", "https://example.com/r.git"]).assert().success();
}

fn hand_edited_manifest(dir: &TempDir, body: &str) {
    sl(dir).args(["init", "--short-code", "he"]).assert().success();
    std::fs::write(
        dir.path().join("spec.mod"),
        format!("# SpecLedger Dependency Manifest v1.0.0\n\n{body}"),
    )
    .unwrap();
}

#[test]
fn deps_resolve_refuses_duplicate_declarations() {
    let dir = TempDir::new().unwrap();
    hand_edited_manifest(
        &dir,
        "require https://example.com/r.git #main specs/a.md\n\
         require https://example.com/r.git #main specs/a.md\n",
    );
    sl(&dir)
        .args(["deps", "resolve"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("spec.mod is invalid"))
        .stderr(predicate::str::contains("duplicate dependency"));
    assert!(!dir.path().join("spec.sum").exists());
    assert!(!dir.path().join("cache").exists());
}

#[test]
fn deps_resolve_refuses_escaping_paths_and_aliases() {
    let dir = TempDir::new().unwrap();
    hand_edited_manifest(&dir, "require https://example.com/r.git #main ../../secret.md\n");
    sl(&dir)
        .args(["deps", "resolve"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid spec path '../../secret.md'"));

    let dir = TempDir::new().unwrap();
    let keep = dir.path().join("repo/keep.txt");
    std::fs::create_dir_all(keep.parent().unwrap()).unwrap();
    std::fs::write(&keep, "keep").unwrap();
    hand_edited_manifest(&dir, "require https://example.com/r.git #main a.md --alias ..\n");
    sl(&dir)
        .args(["deps", "resolve"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid alias '..'"));
    assert!(keep.exists());
    assert!(!dir.path().join("spec.sum").exists());
}

#[test]
fn deps_resolve_writes_lockfile() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let upstream = dir.path().join("upstream");
    std::fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "--quiet"]);
    git(&upstream, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(upstream.join("spec.md"), "# Upstream spec\n").unwrap();
    git(&upstream, &["add", "spec.md"]);
    git(&upstream, &["commit", "--quiet", "-m", "spec"]);
    let commit = git(&upstream, &["rev-parse", "HEAD"]);

    let project = dir.path().join("app");
    std::fs::create_dir_all(&project).unwrap();
    let in_project = |args: &[&str]| {
        let mut c = sl(&dir);
        c.env("SPECLEDGER_ROOT", &project).args(args);
        c
    };
    in_project(&["init", "--short-code", "ap"]).assert().success();
    in_project(&["deps", "add", upstream.to_str().unwrap()]).assert().success();

    let v = json_out(&mut in_project(&["--json", "deps", "resolve"]));
    assert_eq!(v["resolved"][0]["commit_hash"], commit.as_str());
    assert_eq!(v["resolved"][0]["source"], "remote");
    assert_eq!(v["total_size"], 16);

    let lock: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(project.join("spec.sum")).unwrap()).unwrap();
    assert_eq!(lock["entries"][0]["commit_hash"], commit.as_str());
    assert_eq!(lock["entries"][0]["content_hash"].as_str().unwrap().len(), 64);
    assert_eq!(lock["entries"][0]["branch"], "main");

    let meta = std::fs::read_to_string(project.join("specledger/specledger.yaml")).unwrap();
    assert!(meta.contains(&commit));

    let v = json_out(&mut in_project(&["--json", "deps", "resolve"]));
    assert_eq!(v["resolved"][0]["source"], "cache");

    let listed = json_out(&mut in_project(&["--json", "deps", "list"]));
    assert_eq!(listed["dependencies"][0]["locked_commit"], commit.as_str());
}

// ---------------------------------------------------------------------------
// sl doctor
// ---------------------------------------------------------------------------

#[test]
fn doctor_json_shape() {
    let dir = TempDir::new().unwrap();
    let out = sl(&dir).args(["doctor", "--json"]).output().unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();

    let status = v["status"].as_str().unwrap();
    assert!(status == "pass" || status == "fail");
    assert_eq!(out.status.success(), status == "pass");

    let tools = v["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 5);
    for t in tools {
        assert!(t["name"].is_string());
        assert!(t["installed"].is_boolean());
        let cat = t["category"].as_str().unwrap();
        assert!(cat == "core" || cat == "framework");
    }
    assert!(v["missing"].is_array());
    assert!(v["install_instructions"].is_string());
}
