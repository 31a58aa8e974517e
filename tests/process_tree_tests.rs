//! End-to-end tracing of real process trees
//!
//! Every test runs traced processes, so they are serialised.

use predicates::prelude::*;
use serde_json::Value;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Compile a C helper, or `None` when no compiler is available.
fn compile_c(dir: &Path, name: &str, source: &str) -> Option<PathBuf> {
    let source_file = dir.join(format!("{}.c", name));
    let program = dir.join(name);
    fs::write(&source_file, source).unwrap();

    let status = std::process::Command::new("gcc")
        .arg(&source_file)
        .arg("-pthread")
        .arg("-o")
        .arg(&program)
        .status()
        .ok()?;

    if status.success() {
        Some(program)
    } else {
        eprintln!("skipping: failed to compile {}", name);
        None
    }
}

/// Trace `command` silently and parse the JSON tree.
fn trace_json(command: &[&str]) -> Value {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.arg("-s").arg("-f").arg("json").arg("--").args(command);

    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn arguments(node: &Value) -> Vec<&str> {
    node["arguments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|arg| arg.as_str().unwrap())
        .collect()
}

fn children(node: &Value) -> Vec<&Value> {
    node["children"]
        .as_array()
        .map(|children| children.iter().collect())
        .unwrap_or_default()
}

#[test]
#[serial]
fn test_chdir_then_exec_updates_root() {
    let tree = trace_json(&["sh", "-c", "cd /tmp && exec /bin/true"]);

    assert_eq!(tree["directory"], "/tmp");
    assert_eq!(arguments(&tree), vec!["/bin/true"]);
}

#[test]
#[serial]
fn test_root_records_spawn_directory_and_environment() {
    let tmp_dir = TempDir::new().unwrap();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.current_dir(tmp_dir.path())
        .env("LINEAGE_TEST_MARKER", "a=b")
        .arg("-f")
        .arg("json")
        .arg("true");

    let output = cmd.assert().success().get_output().stdout.clone();
    let tree: Value = serde_json::from_slice(&output).unwrap();

    let dir = fs::canonicalize(tmp_dir.path()).unwrap();
    assert_eq!(tree["directory"], dir.to_str().unwrap());
    assert_eq!(arguments(&tree), vec!["true"]);
    assert_eq!(tree["environment"]["LINEAGE_TEST_MARKER"], "a=b");
}

#[test]
#[serial]
fn test_no_env_drops_environment() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.arg("-n").arg("-f").arg("json").arg("true");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"environment\"").not());
}

#[test]
#[serial]
fn test_forked_children_listed_with_exec_arguments() {
    let tree = trace_json(&["sh", "-c", "/bin/true first; /bin/true second; exit 0"]);

    let kids = children(&tree);
    assert_eq!(kids.len(), 2, "{tree}");
    assert_eq!(arguments(kids[0]), vec!["/bin/true", "first"]);
    assert_eq!(arguments(kids[1]), vec!["/bin/true", "second"]);
    assert_ne!(kids[0]["tid"], kids[1]["tid"]);
}

#[test]
#[serial]
fn test_forked_child_chdir_leaves_parent() {
    let tmp_dir = TempDir::new().unwrap();
    let source = r#"
#include <unistd.h>
#include <sys/wait.h>

int main() {
    pid_t pid = fork();
    if (pid == 0) {
        chdir("/var");
        _exit(0);
    }
    waitpid(pid, NULL, 0);
    return 0;
}
"#;
    let Some(program) = compile_c(tmp_dir.path(), "fork_chdir", source) else {
        return;
    };

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.current_dir("/").arg("-f").arg("json").arg(&program);
    let output = cmd.assert().success().get_output().stdout.clone();
    let tree: Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(tree["directory"], "/");
    let kids = children(&tree);
    assert_eq!(kids.len(), 1);
    assert_eq!(kids[0]["directory"], "/var");
    // The child never exec'd.
    assert!(kids[0].get("arguments").is_none());
}

#[test]
#[serial]
fn test_thread_chdir_moves_parent() {
    let tmp_dir = TempDir::new().unwrap();
    let source = r#"
#include <pthread.h>
#include <unistd.h>

static void *worker(void *arg) {
    (void) arg;
    chdir("/var");
    return NULL;
}

int main() {
    pthread_t thread;
    pthread_create(&thread, NULL, worker, NULL);
    pthread_join(thread, NULL);
    return 0;
}
"#;
    let Some(program) = compile_c(tmp_dir.path(), "thread_chdir", source) else {
        return;
    };

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.current_dir("/").arg("-f").arg("json").arg(&program);
    let output = cmd.assert().success().get_output().stdout.clone();
    let tree: Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(tree["directory"], "/var");
    let kids = children(&tree);
    assert_eq!(kids.len(), 1);
    assert_eq!(kids[0]["directory"], "/var");
}

#[test]
#[serial]
fn test_exclude_drops_matching_subtree() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.arg("-s")
        .arg("-f")
        .arg("plain")
        .arg("-e")
        .arg("^skipped$")
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("/bin/true skipped; /bin/true kept; exit 0");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("/bin/true kept\n"))
        .stdout(predicate::str::contains("/bin/true skipped\n").not());
}

#[test]
#[serial]
fn test_tree_format_draws_branches() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.arg("-s")
        .arg("sh")
        .arg("-c")
        .arg("/bin/true one; /bin/true two; exit 0");

    cmd.assert().success().stdout(
        predicate::str::starts_with("sh -c /bin/true one; /bin/true two; exit 0\n")
            .and(predicate::str::contains("├───/bin/true one\n"))
            .and(predicate::str::contains("└───/bin/true two\n")),
    );
}

#[test]
#[serial]
fn test_redirect_sends_child_stdout_to_stderr() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.arg("-r")
        .arg("-f")
        .arg("plain")
        .arg("--")
        .arg("printf")
        .arg("marker-%s")
        .arg("out");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("marker-out").not())
        .stderr(predicate::str::contains("marker-out"));
}

#[test]
#[serial]
fn test_silent_discards_child_output() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.arg("-s")
        .arg("-f")
        .arg("plain")
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("printf marker-%s out; printf marker-%s err >&2");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("marker-out").not())
        .stderr(predicate::str::contains("marker-err").not());
}

#[test]
#[serial]
fn test_output_file() {
    let tmp_dir = TempDir::new().unwrap();
    let out = tmp_dir.path().join("tree.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("lineage");
    cmd.arg("-s")
        .arg("-f")
        .arg("json")
        .arg("-o")
        .arg(&out)
        .arg("true");

    cmd.assert().success().stdout("");

    let written = fs::read_to_string(&out).unwrap();
    assert!(written.ends_with("}\n"));
    let tree: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(arguments(&tree), vec!["true"]);
}
