//! End-to-end runs of the machina binary.

use std::process::Command;

fn machina() -> Command {
    Command::new(env!("CARGO_BIN_EXE_machina"))
}

const TOPOLOGY: &str = "\
machina:
  machines:
    - name: web
    - name: db
";

#[test]
fn test_up_show_destroy_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("machina.yaml");
    std::fs::write(&path, TOPOLOGY).unwrap();

    let status = machina().args(["up", "-t"]).arg(&path).status().unwrap();
    assert!(status.success());
    assert!(dir.path().join("machina.state").exists());

    let out = machina().args(["show", "-t"]).arg(&path).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("web"));
    assert!(stdout.contains("db"));
    assert!(stdout.contains("running"));

    let status = machina()
        .args(["destroy", "-t"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(!dir.path().join("machina.state").exists());
}

#[test]
fn test_topology_file_is_guessed_from_cwd() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("machina.yaml"), TOPOLOGY).unwrap();

    let status = machina()
        .arg("up")
        .current_dir(dir.path())
        .status()
        .unwrap();
    assert!(status.success());
    assert!(dir.path().join("machina.state").exists());
}

#[test]
fn test_missing_topology_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let status = machina()
        .arg("up")
        .current_dir(dir.path())
        .status()
        .unwrap();
    assert!(!status.success());
}
