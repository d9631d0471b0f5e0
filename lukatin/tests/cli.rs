//! CLI tests for the `lukatin` binary.
//!
//! Spawns the binary and checks stdout and exit codes of the headless
//! subcommands.

use std::process::Command;

use lukatin::exit_codes;

fn lukatin(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lukatin"));
    cmd.current_dir(dir);
    cmd
}

#[cfg(unix)]
#[test]
fn bash_prints_json_result() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = lukatin(temp.path())
        .args(["bash", "echo hi"])
        .output()
        .expect("lukatin bash");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf-8");
    assert_eq!(stdout.trim(), r#"{"output":"hi","error":"","exit_code":0}"#);
}

#[test]
fn bash_without_command_text_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = lukatin(temp.path())
        .args(["bash", ""])
        .output()
        .expect("lukatin bash");

    assert_eq!(output.status.code(), Some(exit_codes::TOOL_FAILED));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["exit_code"], -1);
    assert_eq!(value["error"], "Command is required");
}

#[test]
fn tool_write_is_auto_approved() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("hello.rs");
    let call = serde_json::json!({
        "tool": "Write",
        "file_path": path.to_string_lossy(),
        "content": "fn hello() {}\n",
    });
    let status = lukatin(temp.path())
        .args(["tool", &call.to_string()])
        .status()
        .expect("lukatin tool");

    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "fn hello() {}\n");
}

#[test]
fn malformed_tool_call_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = lukatin(temp.path())
        .args(["tool", "not json"])
        .status()
        .expect("lukatin tool");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = lukatin(temp.path())
        .arg("init")
        .status()
        .expect("lukatin init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let written = temp.path().join(".lukatin").join("config.toml");
    let cfg = lukatin::io::config::load_config(&written).expect("load");
    assert_eq!(cfg, lukatin::io::config::LukatinConfig::default());
}

#[test]
fn invalid_config_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("bad.toml");
    std::fs::write(&config, "[shell]\ndefault_timeout_ms = 0\n").expect("write");
    let output = lukatin(temp.path())
        .args(["--config", &config.to_string_lossy(), "tool", "{}"])
        .output()
        .expect("lukatin tool");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("default_timeout_ms"), "{stderr}");
}
