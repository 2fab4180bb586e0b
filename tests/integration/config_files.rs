//! Integration tests for config and document files on disk.

use vmx::config::{load_config, load_document, save_config, DriverConfig};
use vmx::error::VmxError;
use vmx::scheduler::SendMode;
use vmx::simulate::load_timelines;
use vmx::state::{InputRef, MixerState};
use vmx::timeline::{Content, TimelineState};

use crate::common::fixtures::{
    ACTIVE_2_STATE_JSON, CUT_TO_2_YAML, SHOW_YAML, TestFiles, VALID_CONFIG_TOML,
};

#[test]
fn test_load_valid_toml() {
    let files = TestFiles::new();
    let path = files.write("config.toml", VALID_CONFIG_TOML);

    let config = load_config(&path).unwrap();
    assert_eq!(config.device_id, "vmix0");
    assert_eq!(config.send_mode, SendMode::InOrder);
    assert_eq!(config.history_retention_ms, Some(60_000));
    assert!(config.maps_layer("program"));
    assert!(!config.maps_layer("music"));
}

#[test]
fn test_unknown_extension_is_a_parse_error() {
    let files = TestFiles::new();
    let path = files.write("config.ini", "device_id = vmix0");
    assert!(matches!(load_config(&path), Err(VmxError::ConfigParse(_))));
}

#[test]
fn test_invalid_values_are_rejected() {
    let files = TestFiles::new();
    let path = files.write("config.yaml", "device_id: ''\n");
    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, VmxError::ConfigInvalid(_)));
    assert!(err.is_user_recoverable());
}

#[test]
fn test_save_then_load_with_make_ready() {
    let files = TestFiles::new();
    let yaml = r"
device_id: studio
send_mode: burst
make_ready_commands:
  - kind: stop_recording
  - kind: preview_input
    input: 1
";
    let config = load_config(files.write("in.yaml", yaml)).unwrap();
    assert_eq!(config.make_ready_commands.len(), 2);
    assert_eq!(config.make_ready_commands[1].input, Some(InputRef::Number(1)));

    let out = files.path("out/config.toml");
    save_config(&config, &out).unwrap();
    let reloaded: DriverConfig = load_config(&out).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_timeline_and_state_documents() {
    let files = TestFiles::new();
    let timeline: TimelineState = load_document(files.write("t.yaml", CUT_TO_2_YAML)).unwrap();
    assert_eq!(timeline.time, 1_000);
    assert!(matches!(
        timeline.layers["program"].content,
        Content::Input { .. }
    ));

    let state: MixerState = load_document(files.write("s.json", ACTIVE_2_STATE_JSON)).unwrap();
    assert_eq!(state.active, Some(InputRef::Number(2)));
    assert_eq!(state.transitions.len(), 1);
    assert!(!state.recording);
}

#[test]
fn test_show_file_expands_to_steps() {
    let files = TestFiles::new();
    let show = files.write("show.yaml", SHOW_YAML);
    let single = files.write("late.yaml", "time: 5000\n");

    let states = load_timelines(&[show, single]).unwrap();
    let times: Vec<_> = states.iter().map(|s| s.time).collect();
    assert_eq!(times, vec![1_000, 2_000, 5_000]);
}

#[test]
fn test_bad_document_reports_state_parse() {
    let files = TestFiles::new();
    let path = files.write("broken.yaml", "time: [1, 2");
    let result: Result<TimelineState, _> = load_document(&path);
    assert!(matches!(result, Err(VmxError::StateParse(_))));
}
