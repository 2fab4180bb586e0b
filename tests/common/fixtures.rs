//! Test fixture helpers for timelines, mixer states and config files.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use vmx::config::DriverConfig;
use vmx::device::mock::MockReceiver;
use vmx::device::MixerDevice;
use vmx::scheduler::TokioClock;
use vmx::state::{InputRef, TransitionEffect};
use vmx::timeline::{Content, TimelineObject, TimelineState, TransitionSpec};

/// Program selection through a transition on slot 1.
#[must_use]
pub fn program(input: u32, effect: TransitionEffect, duration: u32) -> TimelineObject {
    TimelineObject::new(
        format!("obj-program-{input}"),
        Content::Input {
            input: InputRef::Number(input),
            transition: Some(TransitionSpec {
                effect,
                duration,
                slot: 1,
            }),
        },
    )
}

#[must_use]
pub fn audio(input: u32, volume: u8) -> TimelineObject {
    TimelineObject::new(
        format!("obj-audio-{input}"),
        Content::Audio {
            input: InputRef::Number(input),
            volume,
        },
    )
}

/// A timeline with `program` cutting to `input` at `time`.
#[must_use]
pub fn cut_at(time: i64, input: u32) -> TimelineState {
    TimelineState::new(time).with_layer("program", program(input, TransitionEffect::Cut, 0))
}

/// A driver on paused tokio time backed by a recording receiver.
///
/// Must be called from a `start_paused` tokio test.
#[must_use]
pub fn paused_device(config: DriverConfig, start: i64) -> (MixerDevice, Arc<MockReceiver>) {
    let receiver = Arc::new(MockReceiver::new());
    let device = MixerDevice::new(
        config,
        Arc::new(TokioClock::starting_at(start)),
        receiver.clone(),
    )
    .expect("valid config");
    (device, receiver)
}

/// Files in a temporary directory with automatic cleanup.
pub struct TestFiles {
    pub dir: TempDir,
}

impl TestFiles {
    /// # Panics
    ///
    /// Panics if the temp directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `content` to `name` and return its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content)
            .unwrap_or_else(|e| panic!("Failed to write {}: {e}", path.display()));
        path
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Default for TestFiles {
    fn default() -> Self {
        Self::new()
    }
}

pub const CUT_TO_2_YAML: &str = r"
time: 1000
layers:
  program:
    id: obj-cam2
    content:
      type: input
      input: 2
      transition:
        effect: Cut
        duration: 0
        slot: 1
";

pub const SHOW_YAML: &str = r"
- time: 1000
  layers:
    program:
      id: obj-cam2
      content:
        type: input
        input: 2
        transition:
          effect: Cut
          duration: 0
          slot: 1
- time: 2000
  layers:
    program:
      id: obj-cam3
      content:
        type: input
        input: 3
        transition:
          effect: Cut
          duration: 0
          slot: 1
    music:
      id: obj-bed
      content:
        type: audio
        input: 5
        volume: 60
";

pub const ACTIVE_2_STATE_JSON: &str = r#"{
  "active": 2,
  "transitions": [{"number": 1, "effect": "Cut", "duration": 0}]
}"#;

pub const VALID_CONFIG_TOML: &str = r#"
device_id = "vmix0"
send_mode = "in_order"
history_retention_ms = 60000

[mappings]
program = "vmix0"
"#;
