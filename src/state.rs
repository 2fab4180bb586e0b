//! Abstract mixer state.
//!
//! A [`MixerState`] is the full believed state of the vision mixer at one
//! instant. Snapshots are plain values: cloning one never aliases the
//! other, and every facet is always present (`None` marks "unset").

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Identifier of a mixer input: its number, or its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputRef {
    Number(u32),
    Key(String),
}

impl InputRef {
    /// Numeric form of this identifier, parsing string keys that are numbers.
    #[must_use]
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Key(k) => k.trim().parse().ok(),
        }
    }

    /// Canonical form: numeric strings collapse to `Number`.
    #[must_use]
    pub fn normalized(&self) -> Self {
        self.as_number().map_or_else(|| self.clone(), Self::Number)
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

impl From<u32> for InputRef {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for InputRef {
    fn from(k: &str) -> Self {
        Self::Key(k.to_string())
    }
}

/// Playback status of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Paused,
    Running,
    Completed,
}

/// Media type of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    Video,
    Image,
    Photos,
    Xaml,
    VideoList,
    Colour,
    AudioFile,
    Flash,
    PowerPoint,
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "Video",
            Self::Image => "Image",
            Self::Photos => "Photos",
            Self::Xaml => "Xaml",
            Self::VideoList => "VideoList",
            Self::Colour => "Colour",
            Self::AudioFile => "AudioFile",
            Self::Flash => "Flash",
            Self::PowerPoint => "PowerPoint",
        };
        f.write_str(name)
    }
}

/// Transition effects understood by the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionEffect {
    Cut,
    Fade,
    Zoom,
    Wipe,
    Slide,
    Fly,
    CrossZoom,
    FlyRotate,
    Cube,
    CubeZoom,
    VerticalWipe,
    VerticalSlide,
    Merge,
    WipeReverse,
    SlideReverse,
    VerticalWipeReverse,
    VerticalSlideReverse,
}

impl fmt::Display for TransitionEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serialized names are the variant names.
        write!(f, "{self:?}")
    }
}

/// One configured transition slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// Slot number, 1-4.
    pub number: u8,
    pub effect: TransitionEffect,
    /// Duration in milliseconds.
    pub duration: u32,
}

/// One input line-item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<InputType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PlaybackState>,
    /// Playback position in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    /// Volume, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<i32>,
}

impl Input {
    /// Create an input record identified by `id`.
    #[must_use]
    pub fn new(id: &InputRef) -> Self {
        match id.normalized() {
            InputRef::Number(n) => Self {
                number: Some(n),
                ..Self::default()
            },
            InputRef::Key(k) => Self {
                key: Some(k),
                ..Self::default()
            },
        }
    }

    /// The identifier of this record: number first, then key.
    #[must_use]
    pub fn identifier(&self) -> Option<InputRef> {
        self.number
            .map(InputRef::Number)
            .or_else(|| self.key.clone().map(InputRef::Key))
    }

    /// Check whether this record is the one `id` refers to.
    #[must_use]
    pub fn matches(&self, id: &InputRef) -> bool {
        match id {
            InputRef::Number(n) => self.number == Some(*n),
            InputRef::Key(k) => {
                self.key.as_deref() == Some(k.as_str())
                    || (id.as_number().is_some() && self.number == id.as_number())
            }
        }
    }

    fn apply(&mut self, update: InputUpdate) {
        match update {
            InputUpdate::Volume(volume) => self.volume = Some(volume),
            InputUpdate::State(state) => self.state = Some(state),
            InputUpdate::Position(position) => self.position = Some(position),
            InputUpdate::Name(name) => self.name = Some(name),
        }
    }
}

/// A targeted field update merged into an input record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputUpdate {
    Volume(u8),
    State(PlaybackState),
    Position(i64),
    Name(String),
}

/// Where a facet of the state came from: the layer and timeline object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub layer: String,
    pub timeline_id: String,
}

impl Origin {
    #[must_use]
    pub fn new(layer: impl Into<String>, timeline_id: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            timeline_id: timeline_id.into(),
        }
    }
}

/// A one-shot action that is emitted as a command but not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MomentaryAction {
    AddInput {
        file_path: String,
        media_type: InputType,
        #[serde(default)]
        origin: Origin,
    },
}

/// Full believed state of the mixer at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerState {
    pub version: String,
    pub edition: String,
    pub inputs: Vec<Input>,
    pub preview: Option<InputRef>,
    pub active: Option<InputRef>,
    pub fade_to_black: bool,
    /// Fader bar position, 0-100.
    pub fader_position: Option<u8>,
    pub transitions: Vec<Transition>,
    pub recording: bool,
    pub external: bool,
    pub streaming: bool,
    pub playlist: bool,
    pub multi_corder: bool,
    pub fullscreen: bool,
    pub momentary: Vec<MomentaryAction>,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            version: "unknown".to_string(),
            edition: "unknown".to_string(),
            inputs: Vec::new(),
            preview: None,
            active: None,
            fade_to_black: false,
            fader_position: None,
            transitions: Vec::new(),
            recording: false,
            external: false,
            streaming: false,
            playlist: false,
            multi_corder: false,
            fullscreen: false,
            momentary: Vec::new(),
        }
    }
}

impl MixerState {
    /// Create the default (empty) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an input by identifier.
    #[must_use]
    pub fn input(&self, id: &InputRef) -> Option<&Input> {
        self.inputs.iter().find(|input| input.matches(id))
    }

    /// Check whether an input with this identifier is known.
    #[must_use]
    pub fn has_input(&self, id: &InputRef) -> bool {
        self.input(id).is_some()
    }

    /// Merge `update` into the input identified by `id`, appending a new
    /// record if none exists.
    ///
    /// Returns the canonical identifier of the touched record.
    pub fn upsert_input(&mut self, id: &InputRef, update: InputUpdate) -> InputRef {
        let canonical = id.normalized();
        trace!(input = %canonical, ?update, "Upserting input");
        if let Some(existing) = self.inputs.iter_mut().find(|input| input.matches(id)) {
            existing.apply(update);
            return existing.identifier().unwrap_or(canonical);
        }
        let mut input = Input::new(id);
        input.apply(update);
        self.inputs.push(input);
        canonical
    }

    /// Check whether an input with a title contained in `file_path` and the
    /// same media type already exists.
    #[must_use]
    pub fn has_media(&self, file_path: &str, media_type: InputType) -> bool {
        self.inputs.iter().any(|input| {
            input.input_type == Some(media_type)
                && input
                    .title
                    .as_deref()
                    .is_some_and(|title| !title.is_empty() && file_path.contains(title))
        })
    }
}
