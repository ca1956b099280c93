//! Integration tests for the codeweave binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct Project {
    src: TempDir,
    data: TempDir,
}

impl Project {
    fn new() -> Self {
        let project = Self {
            src: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        };
        project.write("a.py", "def foo():\n    return 1\n");
        project.write(
            "b.py",
            "from a import foo\n\nclass Bar:\n    def baz(self):\n        return foo()\n",
        );
        project
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.src.path().join(name), content).unwrap();
    }

    fn path(&self) -> &Path {
        self.src.path()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("codeweave").unwrap();
        cmd.env("CODEWEAVE_DATA_DIR", self.data.path())
            .env("CODEWEAVE_CONFIG", self.data.path().join("absent.yml"))
            .env_remove("RUST_LOG");
        cmd
    }

    fn index(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(["--format", "json", "index", "--offline"])
            .arg(self.path())
            .assert()
    }
}

#[test]
fn test_index_then_reindex_reuses_everything() {
    let project = Project::new();

    project
        .index()
        .success()
        .stdout(predicate::str::contains("\"files_changed\": 2"))
        .stdout(predicate::str::contains("\"snippets\": 5"));

    project
        .index()
        .success()
        .stdout(predicate::str::contains("\"files_changed\": 0"))
        .stdout(predicate::str::contains("\"files_reused\": 2"));
}

#[test]
fn test_offline_search_finds_method() {
    let project = Project::new();
    project.index().success();

    project
        .cmd()
        .args(["search", "--offline", "-n", "3"])
        .arg(project.path())
        .arg("baz")
        .assert()
        .success()
        .stdout(predicate::str::contains("baz (method) b.py:4-5"))
        .stdout(predicate::str::contains("in Bar (class)"));
}

#[test]
fn test_search_json_output() {
    let project = Project::new();
    project.index().success();

    let output = project
        .cmd()
        .args(["--format", "json", "search", "--offline"])
        .arg(project.path())
        .arg("foo")
        .output()
        .unwrap();
    assert!(output.status.success());

    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["status"], "ok");
    assert!(response["results"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["snippet"]["name"] == "foo"));
}

#[test]
fn test_search_before_index_fails() {
    let project = Project::new();

    project
        .cmd()
        .args(["search", "--offline"])
        .arg(project.path())
        .arg("foo")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not been indexed"));
}

#[test]
fn test_status_reports_counts() {
    let project = Project::new();
    project.index().success();

    project
        .cmd()
        .args(["--format", "json", "status"])
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fingerprinted_files\": 2"))
        .stdout(predicate::str::contains("\"fts_consistent\": true"));
}

#[test]
fn test_cleanup_removes_deleted_file() {
    let project = Project::new();
    project.index().success();
    fs::remove_file(project.path().join("b.py")).unwrap();

    project
        .cmd()
        .arg("cleanup")
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed b.py"));

    project
        .cmd()
        .arg("cleanup")
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean up"));
}

#[test]
fn test_index_rejects_missing_directory() {
    let project = Project::new();

    project
        .cmd()
        .args(["index", "--offline"])
        .arg(project.path().join("missing"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_locked_index_and_force_unlock() {
    let project = Project::new();
    project.index().success();

    let projects = project.data.path().join("projects");
    let project_dir = fs::read_dir(&projects).unwrap().next().unwrap().unwrap().path();
    fs::write(project_dir.join("index.lock"), "12345").unwrap();

    project
        .cmd()
        .args(["index", "--offline"])
        .arg(project.path())
        .assert()
        .code(4);

    project
        .cmd()
        .args(["index", "--offline", "--force-unlock"])
        .arg(project.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed stale index lock"));
}
