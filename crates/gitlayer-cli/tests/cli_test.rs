use std::path::Path;
use std::process::Command;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn gitlayer() -> assert_cmd::Command {
    cargo_bin_cmd!("gitlayer")
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

/// Project at `tmp` tracking a one-commit repository in `tmp/service`.
fn init_project(tmp: &Path) {
    let repo = tmp.join("service");
    std::fs::create_dir_all(repo.join("src")).unwrap();
    std::fs::write(repo.join("src/main.rs"), "fn main() {}\n").unwrap();

    git(&repo, &["init", "-q"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git(&repo, &["config", "user.email", "test@test.com"]);
    git(&repo, &["config", "user.name", "Test"]);
    git(&repo, &["config", "commit.gpgsign", "false"]);
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-q", "-m", "init"]);

    std::fs::write(
        tmp.join("gitlayer.toml"),
        "[[artifact]]\nrepo = \"service\"\nbranch = \"master\"\ntarget = \"/app\"\n",
    )
    .unwrap();
}

fn commit_change(tmp: &Path, content: &str) {
    let repo = tmp.join("service");
    std::fs::write(repo.join("src/main.rs"), content).unwrap();
    git(&repo, &["commit", "-q", "-am", "change"]);
}

// ── Help / Version ──

#[test]
fn shows_help() {
    gitlayer()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("incremental layers"));
}

#[test]
fn shows_version() {
    gitlayer()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gitlayer"));
}

// ── Init Command ──

#[test]
fn init_writes_template() {
    let tmp = TempDir::new().unwrap();

    gitlayer()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created gitlayer.toml"));

    let content = std::fs::read_to_string(tmp.path().join("gitlayer.toml")).unwrap();
    assert!(content.contains("[[artifact]]"));
    assert!(content.contains("target = \"/app\""));
    assert!(content.contains("applied with chown"));
}

#[test]
fn init_keeps_existing_config() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("gitlayer.toml"), "# mine\n").unwrap();

    gitlayer()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    let content = std::fs::read_to_string(tmp.path().join("gitlayer.toml")).unwrap();
    assert_eq!(content, "# mine\n");
}

// ── Materialize Command ──

#[test]
fn materialize_fails_without_artifacts() {
    let tmp = TempDir::new().unwrap();

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no [[artifact]] entries"));
}

#[test]
fn materialize_rejects_relative_target() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("gitlayer.toml"), "[[artifact]]\ntarget = \"app\"\n").unwrap();

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .failure()
        .stderr(predicate::str::contains("absolute"));
}

#[test]
fn materialize_fails_outside_git_repository() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("service")).unwrap();
    std::fs::write(
        tmp.path().join("gitlayer.toml"),
        "[[artifact]]\nrepo = \"service\"\ntarget = \"/app\"\n",
    )
    .unwrap();

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open git repository"));
}

#[test]
fn materialize_rejects_repository_reached_twice() {
    let tmp = TempDir::new().unwrap();
    init_project(tmp.path());
    // both paths resolve to the toplevel named `service`
    std::fs::write(
        tmp.path().join("gitlayer.toml"),
        "[[artifact]]\nrepo = \"service\"\ntarget = \"/app\"\n\n\
         [[artifact]]\nrepo = \"service/src\"\ntarget = \"/srv\"\n",
    )
    .unwrap();

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .failure()
        .stderr(predicate::str::contains("service.master"))
        .stderr(predicate::str::contains("configured more than once"));

    assert!(!tmp.path().join(".gitlayer/cache/service.master.tar.gz").exists());
}

#[test]
fn materialize_snapshot_then_patch() {
    let tmp = TempDir::new().unwrap();
    init_project(tmp.path());

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .success()
        .stdout(predicate::str::contains("service.master: snapshot at"));

    let context = tmp.path().join(".gitlayer/context");
    assert!(context.join("service.master.tar.gz").exists());
    let dockerfile = std::fs::read_to_string(context.join("Dockerfile")).unwrap();
    assert!(dockerfile.contains("FROM debian:bookworm-slim"));
    assert!(dockerfile.contains("ADD service.master.tar.gz /app"));

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .success()
        .stdout(predicate::str::contains("service.master: up to date"));

    commit_change(tmp.path(), "fn main() { println!(\"v2\"); }\n");

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .success()
        .stdout(predicate::str::contains("service.master: latest patch at"));

    let dockerfile = std::fs::read_to_string(context.join("Dockerfile")).unwrap();
    assert!(dockerfile.contains("# === Step: setup ==="));
    assert!(dockerfile.contains("git apply --whitespace=nowarn --directory=/app"));
    assert!(context.join("service.master_latest.patch.gz").exists());
}

// ── Status Command ──

#[test]
fn status_reports_empty_cache() {
    let tmp = TempDir::new().unwrap();
    init_project(tmp.path());

    gitlayer()
        .current_dir(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("service.master -> /app"))
        .stdout(predicate::str::contains("next materialize ships a snapshot"));
}

#[test]
fn status_json_lists_checkpoints() {
    let tmp = TempDir::new().unwrap();
    init_project(tmp.path());

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .success();

    let output = gitlayer()
        .current_dir(tmp.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let statuses: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let status = &statuses[0];
    assert_eq!(status["key"], "service.master");
    assert_eq!(status["config"], "current");
    assert_eq!(status["snapshot"]["record"], "snapshot");
    assert_eq!(status["snapshot"]["commit"].as_str().unwrap().len(), 40);
    assert!(status["layers"].as_array().unwrap().is_empty());
    assert!(status["latest"].is_null());
}

// ── Flush Command ──

#[test]
fn flush_drops_cached_payloads() {
    let tmp = TempDir::new().unwrap();
    init_project(tmp.path());

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .success();

    gitlayer()
        .current_dir(tmp.path())
        .args(["flush", "--artifact", "service.master"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Flushed service.master"));

    let cache = tmp.path().join(".gitlayer/cache");
    assert!(!cache.join("service.master.tar.gz").exists());
    assert!(!cache.join("service.master.commit").exists());
    assert!(cache.join("service.master.paramshash").exists());

    gitlayer()
        .current_dir(tmp.path())
        .arg("materialize")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot at"));
}

#[test]
fn flush_unknown_artifact_fails() {
    let tmp = TempDir::new().unwrap();
    init_project(tmp.path());

    gitlayer()
        .current_dir(tmp.path())
        .args(["flush", "--artifact", "other.master"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no artifact with key other.master"));
}
