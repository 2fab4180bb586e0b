//! Resolved timeline input handed in by the upstream resolver.
//!
//! A [`TimelineState`] is the flattened, per-instant output of the timeline
//! resolver: one object per layer. Each object carries a [`Content`]
//! variant with only the fields its kind needs.
//!
//! # Example YAML
//!
//! ```yaml
//! time: 1000
//! layers:
//!   program:
//!     id: obj-cam2
//!     content:
//!       type: input
//!       input: 2
//!       transition:
//!         effect: Fade
//!         duration: 500
//!         slot: 1
//!   music:
//!     id: obj-bed
//!     content:
//!       type: audio
//!       input: 5
//!       volume: 60
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, VmxError};
use crate::state::{InputRef, InputType, Transition, TransitionEffect};

/// Transition requested together with an input selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub effect: TransitionEffect,
    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: u32,
    /// Transition slot, 1-4.
    #[serde(alias = "button")]
    pub slot: u8,
}

impl TransitionSpec {
    /// The mixer transition this descriptor configures.
    #[must_use]
    pub fn to_transition(&self) -> Transition {
        Transition {
            number: self.slot,
            effect: self.effect,
            duration: self.duration,
        }
    }
}

/// Content of a timeline object, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Put an input on program, optionally through a transition.
    Input {
        input: InputRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transition: Option<TransitionSpec>,
    },
    Preview {
        input: InputRef,
    },
    Audio {
        input: InputRef,
        volume: u8,
    },
    Fader {
        position: u8,
    },
    StartRecording,
    StopRecording,
    StartStreaming,
    StopStreaming,
    FadeToBlack,
    AddInput {
        file_path: String,
        media_type: InputType,
    },
    PlayInput {
        input: InputRef,
    },
    PauseInput {
        input: InputRef,
    },
    RestartInput {
        input: InputRef,
    },
    SetPosition {
        input: InputRef,
        /// Position in milliseconds.
        position: i64,
    },
    SetInputName {
        input: InputRef,
        name: String,
    },
}

impl Content {
    /// Short kind name, matching the serialized tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
            Self::Preview { .. } => "preview",
            Self::Audio { .. } => "audio",
            Self::Fader { .. } => "fader",
            Self::StartRecording => "start_recording",
            Self::StopRecording => "stop_recording",
            Self::StartStreaming => "start_streaming",
            Self::StopStreaming => "stop_streaming",
            Self::FadeToBlack => "fade_to_black",
            Self::AddInput { .. } => "add_input",
            Self::PlayInput { .. } => "play_input",
            Self::PauseInput { .. } => "pause_input",
            Self::RestartInput { .. } => "restart_input",
            Self::SetPosition { .. } => "set_position",
            Self::SetInputName { .. } => "set_input_name",
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Input {
                transition: Some(t),
                ..
            } if !(1..=4).contains(&t.slot) => {
                Err(format!("transition slot {} out of range 1-4", t.slot))
            }
            Self::Audio { volume, .. } if *volume > 100 => {
                Err(format!("volume {volume} out of range 0-100"))
            }
            Self::Fader { position } if *position > 100 => {
                Err(format!("fader position {position} out of range 0-100"))
            }
            Self::SetPosition { position, .. } if *position < 0 => {
                Err(format!("position {position} must be >= 0"))
            }
            Self::AddInput { file_path, .. } if file_path.is_empty() => {
                Err("add_input requires a file path".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// A resolved timeline object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineObject {
    pub id: String,
    pub content: Content,
}

impl TimelineObject {
    #[must_use]
    pub fn new(id: impl Into<String>, content: Content) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }
}

/// Flattened timeline state at one instant: layer name to object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineState {
    /// Target time in milliseconds.
    pub time: i64,
    #[serde(default)]
    pub layers: HashMap<String, TimelineObject>,
}

impl TimelineState {
    #[must_use]
    pub fn new(time: i64) -> Self {
        Self {
            time,
            layers: HashMap::new(),
        }
    }

    /// Add an object on a layer.
    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<String>, object: TimelineObject) -> Self {
        self.layers.insert(layer.into(), object);
        self
    }

    /// Layers sorted by name, ascending.
    #[must_use]
    pub fn sorted_layers(&self) -> Vec<(&str, &TimelineObject)> {
        let mut layers: Vec<_> = self
            .layers
            .iter()
            .map(|(name, object)| (name.as_str(), object))
            .collect();
        layers.sort_unstable_by(|a, b| a.0.cmp(b.0));
        layers
    }

    /// Keep only the layers mapped to `device_id`.
    ///
    /// An empty mapping table maps every layer to the device.
    #[must_use]
    pub fn mapped_to(&self, device_id: &str, mappings: &Mappings) -> Self {
        if mappings.is_empty() {
            return self.clone();
        }
        let layers = self
            .layers
            .iter()
            .filter(|(layer, _)| mappings.get(*layer).is_some_and(|id| id == device_id))
            .map(|(layer, object)| (layer.clone(), object.clone()))
            .collect::<HashMap<_, _>>();
        trace!(
            kept = layers.len(),
            total = self.layers.len(),
            "Filtered unmapped layers"
        );
        Self {
            time: self.time,
            layers,
        }
    }

    /// Validate time and payload ranges.
    pub fn validate(&self) -> Result<()> {
        if self.time < 0 {
            return Err(VmxError::InvalidArgument(format!(
                "timeline time must be >= 0 ({})",
                self.time
            )));
        }
        for (layer, object) in &self.layers {
            object.content.validate().map_err(|e| {
                VmxError::InvalidArgument(format!("layer '{layer}' ({}): {e}", object.id))
            })?;
        }
        Ok(())
    }
}

/// Layer name to device id.
pub type Mappings = HashMap<String, String>;
