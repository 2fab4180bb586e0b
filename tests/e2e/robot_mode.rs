//! Robot mode: every command emits parseable JSON.

use predicates::prelude::*;
use serde_json::Value;

use crate::common::fixtures::{
    ACTIVE_2_STATE_JSON, CUT_TO_2_YAML, SHOW_YAML, TestFiles, VALID_CONFIG_TOML,
};
use crate::vmx;

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn kinds(commands: &Value) -> Vec<&str> {
    commands
        .as_array()
        .expect("commands array")
        .iter()
        .map(|c| c["kind"].as_str().expect("kind"))
        .collect()
}

#[test]
fn test_quick_start_json() {
    let (mut cmd, _home) = vmx();
    let output = cmd.arg("--robot").output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["tool"], "vmx");
    assert!(json["commands"]["plan"].as_str().unwrap().contains("--robot"));
}

#[test]
fn test_version_formats() {
    let (mut cmd, _home) = vmx();
    let pretty = cmd.args(["--format", "json", "version"]).output().unwrap();
    let json = stdout_json(&pretty);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["git_dirty"].is_boolean());

    let (mut cmd, _home) = vmx();
    cmd.args(["--format", "json-compact", "version"])
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with("{\"version\"")
                .and(predicate::str::contains("\n").count(1)),
        );
}

#[test]
fn test_format_from_environment() {
    let (mut cmd, _home) = vmx();
    let output = cmd.env("VMX_FORMAT", "json").arg("version").output().unwrap();
    assert_eq!(stdout_json(&output)["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_plan_from_empty_mixer() {
    let files = TestFiles::new();
    let timeline = files.write("cut.yaml", CUT_TO_2_YAML);
    let config = files.write("config.toml", VALID_CONFIG_TOML);

    let (mut cmd, _home) = vmx();
    let output = cmd
        .arg("--robot")
        .arg("--config")
        .arg(&config)
        .arg("plan")
        .arg(&timeline)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["time"], 1000);
    assert_eq!(json["layers"], 1);
    assert_eq!(
        kinds(&json["commands"]),
        vec![
            "preview_input",
            "transition_effect",
            "transition_duration",
            "transition"
        ]
    );
    assert_eq!(json["commands"][3]["context"], "program");
    assert_eq!(json["state"]["active"], 2);
}

#[test]
fn test_plan_against_matching_state() {
    let files = TestFiles::new();
    let timeline = files.write("cut.yaml", CUT_TO_2_YAML);
    let state = files.write("state.json", ACTIVE_2_STATE_JSON);

    let (mut cmd, _home) = vmx();
    let output = cmd
        .arg("--robot")
        .arg("plan")
        .arg(&timeline)
        .arg("--previous")
        .arg(&state)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert!(json["commands"].as_array().unwrap().is_empty());
    assert!(json["previous"].as_str().unwrap().ends_with("state.json"));
}

#[test]
fn test_plan_missing_file_is_robot_error() {
    let files = TestFiles::new();
    let (mut cmd, _home) = vmx();
    let output = cmd
        .arg("--robot")
        .arg("plan")
        .arg(files.path("nope.yaml"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"], true);
    assert!(err["message"].is_string());
}

#[test]
fn test_simulate_show() {
    let files = TestFiles::new();
    let show = files.write("show.yaml", SHOW_YAML);

    let (mut cmd, _home) = vmx();
    let output = cmd.arg("--robot").arg("simulate").arg(&show).output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    let steps = json["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["time"], 1000);
    assert_eq!(steps[0]["delivered"], 4);
    assert_eq!(kinds(&steps[1]["planned"]), vec!["active_input"]);
    assert_eq!(json["sent"].as_array().unwrap().len(), 5);
    assert_eq!(json["final_state"]["active"], 3);
    assert_eq!(json["device"], "VMix-Send vmix0");
}

#[test]
fn test_simulate_with_rejected_kind() {
    let files = TestFiles::new();
    let show = files.write("show.yaml", SHOW_YAML);

    let (mut cmd, _home) = vmx();
    let output = cmd
        .args(["--robot", "simulate", "--fail", "transition"])
        .arg(&show)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["steps"][0]["failed"], 1);
    assert_eq!(json["steps"][0]["delivered"], 3);
    let events = json["events"].as_array().unwrap();
    assert!(events.iter().any(|e| e["type"] == "command_error"));
}

#[test]
fn test_simulate_unknown_kind_is_usage_error() {
    let (mut cmd, _home) = vmx();
    cmd.args(["simulate", "--fail", "explode", "show.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown command kind"));
}

#[test]
fn test_check_config_valid() {
    let files = TestFiles::new();
    let config = files.write("config.toml", VALID_CONFIG_TOML);

    let (mut cmd, _home) = vmx();
    let output = cmd
        .arg("--robot")
        .arg("check-config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["valid"], true);
    assert_eq!(json["device_id"], "vmix0");
    assert_eq!(json["summary"]["error_count"], 0);
    assert_eq!(json["summary"]["mapping_count"], 1);
}

#[test]
fn test_check_config_invalid() {
    let files = TestFiles::new();
    let config = files.write("config.yaml", "device_id: ''\n");

    let (mut cmd, _home) = vmx();
    let output = cmd
        .arg("--robot")
        .arg("check-config")
        .arg(&config)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let json = stdout_json(&output);
    assert_eq!(json["valid"], false);
    assert!(json["summary"]["error_count"].as_u64().unwrap() >= 1);

    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"], true);
    assert_eq!(err["recoverable"], true);
}
