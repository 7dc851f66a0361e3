use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A workspace with its own config, database and data directory.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = serde_json::json!({
            "storage": {
                "data_dir": dir.path().join("data"),
                "database_path": dir.path().join("invox.db"),
            },
            "crypto": { "iterations": 1000 }
        });
        std::fs::write(dir.path().join("config.json"), config.to_string()).unwrap();
        Self { dir }
    }

    fn invox(&self) -> Command {
        let mut cmd = Command::cargo_bin("invox").unwrap();
        cmd.arg("--config")
            .arg(self.dir.path().join("config.json"))
            .env_remove("INVOX_DATA_DIR")
            .env_remove("INVOX_DATABASE_PATH")
            .current_dir(self.dir.path());
        cmd
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[test]
fn config_get_reads_the_file() {
    let ws = Workspace::new();
    ws.invox()
        .args(["config", "get", "crypto.iterations"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1000"));

    ws.invox()
        .args(["config", "get", "llm.nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration key not found"));
}

#[test]
fn register_upload_list_delete() {
    let ws = Workspace::new();

    ws.invox()
        .args(["register", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered alice"));

    ws.invox()
        .args(["register", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already registered"));

    let scan = ws.path().join("bill.png");
    std::fs::write(&scan, b"pretend png").unwrap();
    let output = ws
        .invox()
        .args(["upload", "--user", "alice"])
        .arg(&scan)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let file_id = stdout
        .split_whitespace()
        .skip_while(|word| *word != "as")
        .nth(1)
        .unwrap()
        .to_string();

    ws.invox()
        .args(["list", "--user", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&file_id))
        .stdout(predicate::str::contains("pending"));

    ws.invox()
        .args(["show", "--user", "alice", &file_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"pending\""));

    ws.invox()
        .args(["delete", "--user", "alice", &file_id])
        .assert()
        .success();

    ws.invox()
        .args(["show", "--user", "alice", &file_id])
        .assert()
        .failure();
}

#[test]
fn unknown_user_gets_a_hint() {
    let ws = Workspace::new();
    ws.invox()
        .args(["list", "--user", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invox register nobody"));
}

#[test]
fn unsupported_upload_is_rejected() {
    let ws = Workspace::new();
    ws.invox().args(["register", "alice"]).assert().success();

    let notes = ws.path().join("notes.txt");
    std::fs::write(&notes, b"hello").unwrap();
    ws.invox()
        .args(["upload", "--user", "alice"])
        .arg(&notes)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported file type"));
}
